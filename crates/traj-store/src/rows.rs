//! Row level reads and writes shared by the storage operations.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use traj_core::{from_json_slice, to_canonical_json_bytes, CodecRegistry, ErrorInfo, TrajError, Value};
use traj_exp::{namespace, RunDescriptor, Trajectory};
use traj_tree::{Leaf, NodeKind, NodeRecord, NodeSpec, ParameterLeaf, ResultLeaf};

use crate::schema::storage_error;

pub(crate) fn sql(code: &'static str) -> impl Fn(rusqlite::Error) -> TrajError {
    move |err| storage_error(code, err)
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, TrajError> {
    bincode::serialize(value)
        .map_err(|err| TrajError::Serde(ErrorInfo::new("traj_store.encode", err.to_string())))
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, TrajError> {
    bincode::deserialize(bytes)
        .map_err(|err| TrajError::Serde(ErrorInfo::new("traj_store.decode", err.to_string())))
}

fn conflict(code: &str, message: &str, path: &str) -> TrajError {
    TrajError::PersistenceConflict(
        ErrorInfo::new(code, message)
            .with_context("path", path)
            .with_hint("committed content is never overwritten"),
    )
}

pub(crate) fn trajectory_id(conn: &Connection, name: &str) -> Result<Option<i64>, TrajError> {
    conn.query_row(
        "SELECT id FROM trajectories WHERE name = ?",
        params![name],
        |row| row.get(0),
    )
    .optional()
    .map_err(sql("traj_store.query"))
}

pub(crate) fn ensure_trajectory(conn: &Connection, name: &str, comment: &str) -> Result<i64, TrajError> {
    if let Some(id) = trajectory_id(conn, name)? {
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO trajectories(name, created_at, comment) VALUES (?, ?, ?)",
        params![name, Utc::now().to_rfc3339(), comment],
    )
    .map_err(sql("traj_store.insert_trajectory"))?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn ensure_runs(conn: &Connection, trajectory: i64, runs: &[RunDescriptor]) -> Result<(), TrajError> {
    let mut stmt = conn
        .prepare("INSERT OR IGNORE INTO runs(trajectory_id, idx, name) VALUES (?, ?, ?)")
        .map_err(sql("traj_store.insert_run"))?;
    for run in runs {
        stmt.execute(params![trajectory, run.index() as i64, run.name()])
            .map_err(sql("traj_store.insert_run"))?;
    }
    Ok(())
}

/// Drops stored ranges and surplus runs while no run has completed.
///
/// Only parameters loaded in `current` lose their ranges; they are written
/// again right after.
pub(crate) fn prune_exploration(conn: &Connection, trajectory: i64, current: &Trajectory) -> Result<(), TrajError> {
    let completed: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM runs WHERE trajectory_id = ? AND completed = 1",
            params![trajectory],
            |row| row.get(0),
        )
        .map_err(sql("traj_store.query"))?;
    if completed > 0 {
        return Ok(());
    }
    for record in current.records() {
        if matches!(&record.node.leaf, Some(Leaf::Parameter(param)) if param.is_loaded()) {
            conn.execute(
                "DELETE FROM ranges WHERE trajectory_id = ? AND path = ?",
                params![trajectory, record.path],
            )
            .map_err(sql("traj_store.delete"))?;
        }
    }
    conn.execute(
        "DELETE FROM runs WHERE trajectory_id = ? AND idx >= ?",
        params![trajectory, current.run_count() as i64],
    )
    .map_err(sql("traj_store.delete"))?;
    Ok(())
}

fn annotations_json(spec: &NodeSpec) -> Result<String, TrajError> {
    let bytes = to_canonical_json_bytes(&spec.annotations)?;
    String::from_utf8(bytes)
        .map_err(|err| TrajError::Serde(ErrorInfo::new("traj_store.annotations", err.to_string())))
}

fn ensure_ancestors(conn: &Connection, trajectory: i64, path: &str) -> Result<(), TrajError> {
    let mut prefix = String::new();
    let segments: Vec<&str> = path.split('.').collect();
    for segment in &segments[..segments.len().saturating_sub(1)] {
        if !prefix.is_empty() {
            prefix.push('.');
        }
        prefix.push_str(segment);
        conn.execute(
            "INSERT OR IGNORE INTO nodes(trajectory_id, path, kind) VALUES (?, ?, 'group')",
            params![trajectory, prefix],
        )
        .map_err(sql("traj_store.insert_node"))?;
    }
    Ok(())
}

/// Inserts a node row, or checks an existing one for agreement.
pub(crate) fn upsert_node(
    conn: &Connection,
    trajectory: i64,
    path: &str,
    spec: &NodeSpec,
) -> Result<(), TrajError> {
    ensure_ancestors(conn, trajectory, path)?;
    let annotations = annotations_json(spec)?;
    let kind = spec.kind();
    let existing: Option<(String, String, String)> = conn
        .query_row(
            "SELECT kind, comment, annotations FROM nodes WHERE trajectory_id = ? AND path = ?",
            params![trajectory, path],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()
        .map_err(sql("traj_store.query"))?;
    match existing {
        None => {
            conn.execute(
                "INSERT INTO nodes(trajectory_id, path, kind, comment, annotations) VALUES (?, ?, ?, ?, ?)",
                params![trajectory, path, kind.as_str(), spec.comment, annotations],
            )
            .map_err(sql("traj_store.insert_node"))?;
        }
        Some((stored_kind, _, _)) if stored_kind != kind.as_str() => {
            return Err(conflict("node-kind", "stored node has another kind", path));
        }
        Some((_, comment, stored_annotations)) if kind == NodeKind::Group => {
            if !comment.is_empty() && !spec.comment.is_empty() && comment != spec.comment {
                return Err(conflict("group-comment", "stored group comment differs", path));
            }
            if comment.is_empty() && !spec.comment.is_empty() {
                conn.execute(
                    "UPDATE nodes SET comment = ? WHERE trajectory_id = ? AND path = ?",
                    params![spec.comment, trajectory, path],
                )
                .map_err(sql("traj_store.update_node"))?;
            }
            let mut merged: BTreeMap<String, Value> = from_json_slice(stored_annotations.as_bytes())?;
            let mut grown = false;
            for (key, value) in &spec.annotations {
                match merged.get(key) {
                    Some(current) if current != value => {
                        return Err(TrajError::PersistenceConflict(
                            ErrorInfo::new("group-annotation", "stored group annotation differs")
                                .with_context("path", path)
                                .with_context("key", key.clone()),
                        ));
                    }
                    Some(_) => {}
                    None => {
                        merged.insert(key.clone(), value.clone());
                        grown = true;
                    }
                }
            }
            if grown {
                let bytes = to_canonical_json_bytes(&merged)?;
                let merged = String::from_utf8(bytes).map_err(|err| {
                    TrajError::Serde(ErrorInfo::new("traj_store.annotations", err.to_string()))
                })?;
                conn.execute(
                    "UPDATE nodes SET annotations = ? WHERE trajectory_id = ? AND path = ?",
                    params![merged, trajectory, path],
                )
                .map_err(sql("traj_store.update_node"))?;
            }
        }
        Some((_, comment, stored_annotations)) => {
            if comment != spec.comment || stored_annotations != annotations {
                return Err(conflict("node-metadata", "stored leaf metadata differs", path));
            }
        }
    }
    Ok(())
}

fn validate_leaf(codecs: &CodecRegistry, spec: &NodeSpec) -> Result<(), TrajError> {
    for value in spec.annotations.values() {
        codecs.validate(value)?;
    }
    match &spec.leaf {
        Some(Leaf::Parameter(param)) if param.is_loaded() => {
            codecs.validate(param.default_value()?)?;
            for value in param.range().unwrap_or(&[]) {
                codecs.validate(value)?;
            }
        }
        Some(Leaf::Result(result)) if result.is_loaded() => {
            for value in result.items()?.values() {
                codecs.validate(value)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Payload bytes as stored; parameters lose their range.
fn payload_bytes(leaf: &Leaf) -> Result<(Vec<u8>, String), TrajError> {
    let stripped = match leaf {
        Leaf::Parameter(param) => Leaf::Parameter(ParameterLeaf::new(param.default_value()?.clone())),
        Leaf::Result(result) => Leaf::Result(result.clone()),
    };
    let data = encode(&stripped)?;
    let digest = hex::encode(Sha256::digest(&data));
    Ok((data, digest))
}

fn stored_payload(conn: &Connection, trajectory: i64, path: &str) -> Result<Option<(Vec<u8>, String)>, TrajError> {
    conn.query_row(
        "SELECT data, digest FROM payloads WHERE trajectory_id = ? AND path = ?",
        params![trajectory, path],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
    .map_err(sql("traj_store.query"))
}

fn stored_result(path: &str, data: &[u8]) -> Result<ResultLeaf, TrajError> {
    match decode::<Leaf>(data)? {
        Leaf::Result(result) => Ok(result),
        Leaf::Parameter(_) => Err(conflict("node-kind", "stored payload is a parameter", path)),
    }
}

/// Writes a leaf payload.
///
/// Results under `runs.run_ALL` are merged item by item: new items are
/// added, an item stored with another value is a conflict. Every other
/// payload must match the stored one exactly.
fn put_payload(conn: &Connection, trajectory: i64, path: &str, leaf: &Leaf) -> Result<(), TrajError> {
    let (data, digest) = payload_bytes(leaf)?;
    let Some((stored, stored_digest)) = stored_payload(conn, trajectory, path)? else {
        conn.execute(
            "INSERT INTO payloads(trajectory_id, path, data, digest) VALUES (?, ?, ?, ?)",
            params![trajectory, path, data, digest],
        )
        .map_err(sql("traj_store.insert_payload"))?;
        return Ok(());
    };
    if stored_digest == digest {
        return Ok(());
    }
    let Leaf::Result(incoming) = leaf else {
        return Err(conflict("payload-differs", "stored payload differs", path));
    };
    if !namespace::is_run_independent(path) {
        return Err(conflict("payload-differs", "stored payload differs", path));
    }
    let mut merged = stored_result(path, &stored)?;
    let items = incoming.items()?;
    if let Some(item) = merged.disagreement(items) {
        return Err(TrajError::PersistenceConflict(
            ErrorInfo::new("shared-item-differs", "stored shared result item holds another value")
                .with_context("path", path)
                .with_context("item", item),
        ));
    }
    merged.add_items(items.clone())?;
    let (data, digest) = payload_bytes(&Leaf::Result(merged))?;
    conn.execute(
        "UPDATE payloads SET data = ?, digest = ? WHERE trajectory_id = ? AND path = ?",
        params![data, digest, trajectory, path],
    )
    .map_err(sql("traj_store.update_payload"))?;
    Ok(())
}

/// Whether the store already holds everything `record` carries.
///
/// Results only need their items present with equal values; other leaves
/// must match exactly.
pub(crate) fn holds_record(conn: &Connection, trajectory: i64, record: &NodeRecord) -> Result<bool, TrajError> {
    let stored: Option<(String, String, String)> = conn
        .query_row(
            "SELECT kind, comment, annotations FROM nodes WHERE trajectory_id = ? AND path = ?",
            params![trajectory, record.path],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()
        .map_err(sql("traj_store.query"))?;
    let Some((kind, comment, annotations)) = stored else {
        return Ok(false);
    };
    let spec = &record.node;
    if kind != spec.kind().as_str() {
        return Ok(false);
    }
    if spec.kind() == NodeKind::Group {
        let stored: BTreeMap<String, Value> = from_json_slice(annotations.as_bytes())?;
        let agrees = (spec.comment.is_empty() || spec.comment == comment)
            && spec.annotations.iter().all(|(key, value)| stored.get(key) == Some(value));
        return Ok(agrees);
    }
    if comment != spec.comment || annotations != annotations_json(spec)? {
        return Ok(false);
    }
    let leaf = match &spec.leaf {
        Some(leaf) if leaf.is_loaded() => leaf,
        _ => return Ok(true),
    };
    let Some((data, digest)) = stored_payload(conn, trajectory, &record.path)? else {
        return Ok(false);
    };
    match leaf {
        Leaf::Result(result) => {
            let stored = stored_result(&record.path, &data)?;
            Ok(result
                .items()?
                .iter()
                .all(|(name, value)| stored.get(name) == Some(value)))
        }
        Leaf::Parameter(_) => Ok(payload_bytes(leaf)?.1 == digest),
    }
}

fn put_range(conn: &Connection, trajectory: i64, path: &str, values: &[Value]) -> Result<(), TrajError> {
    for (position, value) in values.iter().enumerate() {
        let data = encode(value)?;
        let stored: Option<Vec<u8>> = conn
            .query_row(
                "SELECT data FROM ranges WHERE trajectory_id = ? AND path = ? AND position = ?",
                params![trajectory, path, position as i64],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql("traj_store.query"))?;
        match stored {
            None => {
                conn.execute(
                    "INSERT INTO ranges(trajectory_id, path, position, data) VALUES (?, ?, ?, ?)",
                    params![trajectory, path, position as i64, data],
                )
                .map_err(sql("traj_store.insert_range"))?;
            }
            Some(existing) if existing == data => {}
            Some(_) => {
                return Err(TrajError::PersistenceConflict(
                    ErrorInfo::new("range-differs", "stored range value differs")
                        .with_context("path", path)
                        .with_context("position", position.to_string())
                        .with_hint("stored exploration is fixed once a run has completed"),
                ))
            }
        }
    }
    Ok(())
}

/// Persists one record: node row, then payload and range when loaded.
pub(crate) fn write_record(
    conn: &Connection,
    codecs: &CodecRegistry,
    trajectory: i64,
    record: &NodeRecord,
    with_payload: bool,
) -> Result<(), TrajError> {
    if with_payload {
        validate_leaf(codecs, &record.node)?;
    }
    upsert_node(conn, trajectory, &record.path, &record.node)?;
    if !with_payload {
        return Ok(());
    }
    match &record.node.leaf {
        Some(leaf) if leaf.is_loaded() => {
            put_payload(conn, trajectory, &record.path, leaf)?;
            if let Leaf::Parameter(param) = leaf {
                if let Some(range) = param.range() {
                    put_range(conn, trajectory, &record.path, range)?;
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Removes every row stored for `path`.
pub(crate) fn clear_path(conn: &Connection, trajectory: i64, path: &str) -> Result<(), TrajError> {
    for statement in [
        "DELETE FROM nodes WHERE trajectory_id = ? AND path = ?",
        "DELETE FROM payloads WHERE trajectory_id = ? AND path = ?",
        "DELETE FROM ranges WHERE trajectory_id = ? AND path = ?",
    ] {
        conn.execute(statement, params![trajectory, path])
            .map_err(sql("traj_store.delete"))?;
    }
    Ok(())
}
