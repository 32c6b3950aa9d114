use rusqlite::{params, Connection, OptionalExtension};
use traj_core::{ErrorInfo, TrajError};

pub const SCHEMA_VERSION: i64 = 1;

pub(crate) fn storage_error(code: &str, err: impl ToString) -> TrajError {
    TrajError::Storage(ErrorInfo::new(code, err.to_string()))
}

pub fn init_schema(conn: &Connection) -> Result<(), TrajError> {
    conn.execute_batch(
        "BEGIN;
        CREATE TABLE IF NOT EXISTS meta(version INTEGER NOT NULL);
        CREATE TABLE IF NOT EXISTS trajectories(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            comment TEXT NOT NULL DEFAULT ''
        );
        CREATE TABLE IF NOT EXISTS nodes(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            trajectory_id INTEGER NOT NULL,
            path TEXT NOT NULL,
            kind TEXT NOT NULL,
            comment TEXT NOT NULL DEFAULT '',
            annotations TEXT NOT NULL DEFAULT '{}',
            UNIQUE(trajectory_id, path),
            FOREIGN KEY(trajectory_id) REFERENCES trajectories(id)
        );
        CREATE TABLE IF NOT EXISTS payloads(
            trajectory_id INTEGER NOT NULL,
            path TEXT NOT NULL,
            data BLOB NOT NULL,
            digest TEXT NOT NULL,
            PRIMARY KEY(trajectory_id, path),
            FOREIGN KEY(trajectory_id) REFERENCES trajectories(id)
        );
        CREATE TABLE IF NOT EXISTS ranges(
            trajectory_id INTEGER NOT NULL,
            path TEXT NOT NULL,
            position INTEGER NOT NULL,
            data BLOB NOT NULL,
            PRIMARY KEY(trajectory_id, path, position),
            FOREIGN KEY(trajectory_id) REFERENCES trajectories(id)
        );
        CREATE TABLE IF NOT EXISTS runs(
            trajectory_id INTEGER NOT NULL,
            idx INTEGER NOT NULL,
            name TEXT NOT NULL,
            completed INTEGER NOT NULL DEFAULT 0,
            failed INTEGER NOT NULL DEFAULT 0,
            failure TEXT,
            digest TEXT,
            PRIMARY KEY(trajectory_id, idx),
            FOREIGN KEY(trajectory_id) REFERENCES trajectories(id)
        );
        COMMIT;",
    )
    .map_err(|err| storage_error("traj_store.schema", err))?;
    set_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

fn set_version(conn: &Connection, version: i64) -> Result<(), TrajError> {
    let existing: Option<i64> = conn
        .query_row("SELECT version FROM meta LIMIT 1", [], |row| row.get(0))
        .optional()
        .map_err(|err| storage_error("traj_store.schema", err))?;
    match existing {
        Some(current) if current == version => Ok(()),
        Some(current) => Err(TrajError::Storage(
            ErrorInfo::new(
                "traj_store.schema_version",
                format!("store schema {current} incompatible with expected {version}"),
            )
            .with_hint("open the file with a matching release"),
        )),
        None => {
            conn.execute("INSERT INTO meta(version) VALUES (?)", params![version])
                .map_err(|err| storage_error("traj_store.schema", err))?;
            Ok(())
        }
    }
}
