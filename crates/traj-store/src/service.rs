use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use traj_core::{from_json_slice, stable_hash_string, Codec, CodecRegistry, ErrorInfo, TrajError, Value};
use traj_exp::{
    merge_trajectories, namespace, MergeOutcome, RunDescriptor, RunFragment, RunScope, RunState,
    Trajectory,
};
use traj_tree::{Leaf, NodeKind, NodeRecord, NodeSpec, ParameterLeaf, ResultLeaf, Tree};

use crate::config::StorageConfig;
use crate::rows::{
    clear_path, decode, ensure_runs, ensure_trajectory, holds_record, prune_exploration, sql,
    trajectory_id, write_record,
};
use crate::schema::init_schema;

/// How much of a stored trajectory [`StorageService::load`] materialises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Fidelity {
    /// Names, kinds, comments and annotations only.
    Skeleton,
    /// Skeleton plus parameter values and exploration ranges.
    SkeletonWithRanges,
    /// Everything, result payloads included.
    Full,
}

/// Catalog lookup by name or by position (negative counts from the newest).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrajectorySelector {
    Name(String),
    Index(i64),
}

impl From<&str> for TrajectorySelector {
    fn from(name: &str) -> Self {
        TrajectorySelector::Name(name.to_string())
    }
}

impl From<String> for TrajectorySelector {
    fn from(name: String) -> Self {
        TrajectorySelector::Name(name)
    }
}

impl From<i64> for TrajectorySelector {
    fn from(index: i64) -> Self {
        TrajectorySelector::Index(index)
    }
}

impl fmt::Display for TrajectorySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrajectorySelector::Name(name) => f.write_str(name),
            TrajectorySelector::Index(index) => write!(f, "#{index}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: i64,
    pub name: String,
    pub created_at: String,
    pub comment: String,
    pub runs: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStatus {
    Committed,
    /// The run was already stored with identical content; nothing was written.
    AlreadyCommitted,
}

/// Work left for a resumed trajectory.
#[derive(Debug, Clone)]
pub struct ResumePlan {
    pub trajectory: Trajectory,
    pub pending: Vec<usize>,
    pub completed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub name: String,
    pub runs: usize,
    pub renamed: BTreeMap<String, String>,
}

/// The only writer of the backing file.
pub struct StorageService {
    conn: Connection,
    path: PathBuf,
    config: StorageConfig,
    codecs: CodecRegistry,
}

impl fmt::Debug for StorageService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageService")
            .field("path", &self.path)
            .field("config", &self.config)
            .field("codecs", &self.codecs)
            .finish()
    }
}

impl StorageService {
    pub fn open(path: impl AsRef<Path>, config: StorageConfig) -> Result<Self, TrajError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(|err| {
            TrajError::Storage(
                ErrorInfo::new("traj_store.open", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .map_err(sql("traj_store.open"))?;
        init_schema(&conn)?;
        debug!(target: "traj::store", path = %path.display(), "store opened");
        Ok(Self {
            conn,
            path,
            config,
            codecs: CodecRegistry::new(),
        })
    }

    pub fn with_codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = codecs;
        self
    }

    pub fn register_codec(&mut self, codec: Arc<dyn Codec>) -> Result<(), TrajError> {
        self.codecs.register(codec)
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Trajectories in creation order.
    pub fn catalog(&self) -> Result<Vec<CatalogEntry>, TrajError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT t.id, t.name, t.created_at, t.comment,
                    (SELECT COUNT(*) FROM runs r WHERE r.trajectory_id = t.id),
                    (SELECT COUNT(*) FROM runs r WHERE r.trajectory_id = t.id AND r.completed = 1),
                    (SELECT COUNT(*) FROM runs r WHERE r.trajectory_id = t.id AND r.failed = 1 AND r.completed = 0)
                FROM trajectories t ORDER BY t.id",
            )
            .map_err(sql("traj_store.catalog"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CatalogEntry {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: row.get(2)?,
                    comment: row.get(3)?,
                    runs: row.get::<_, i64>(4)? as usize,
                    completed: row.get::<_, i64>(5)? as usize,
                    failed: row.get::<_, i64>(6)? as usize,
                })
            })
            .map_err(sql("traj_store.catalog"))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(sql("traj_store.catalog"))
    }

    pub fn entry(&self, selector: &TrajectorySelector) -> Result<CatalogEntry, TrajError> {
        let catalog = self.catalog()?;
        match selector {
            TrajectorySelector::Name(name) => catalog
                .into_iter()
                .find(|entry| &entry.name == name)
                .ok_or_else(|| missing(name)),
            TrajectorySelector::Index(index) => {
                let len = catalog.len() as i64;
                let position = if *index < 0 { len + index } else { *index };
                if position < 0 || position >= len {
                    return Err(TrajError::Index(
                        ErrorInfo::new("catalog-index", "catalog index out of range")
                            .with_context("index", index.to_string())
                            .with_context("trajectories", len.to_string()),
                    ));
                }
                Ok(catalog[position as usize].clone())
            }
        }
    }

    /// Persists structure and run list without payloads.
    pub fn commit_tree_skeleton(&mut self, trajectory: &Trajectory) -> Result<(), TrajError> {
        let tx = self.conn.transaction().map_err(sql("traj_store.transaction"))?;
        write_structure(&tx, &self.codecs, trajectory, false)?;
        tx.commit().map_err(sql("traj_store.commit"))?;
        debug!(target: "traj::store", trajectory = %trajectory.name(), "skeleton committed");
        Ok(())
    }

    /// Persists structure, parameter values, ranges and every leaf outside
    /// per-run namespaces. Run subtrees go through [`Self::commit_run`].
    pub fn store_trajectory(&mut self, trajectory: &Trajectory) -> Result<(), TrajError> {
        let tx = self.conn.transaction().map_err(sql("traj_store.transaction"))?;
        write_structure(&tx, &self.codecs, trajectory, true)?;
        tx.commit().map_err(sql("traj_store.commit"))?;
        info!(
            target: "traj::store",
            trajectory = %trajectory.name(),
            runs = trajectory.run_count(),
            "trajectory stored"
        );
        Ok(())
    }

    /// Commits the subtree of one run taken from an in-memory trajectory.
    pub fn commit_run(
        &mut self,
        trajectory: &Trajectory,
        run_index: usize,
    ) -> Result<CommitStatus, TrajError> {
        if trajectory_id(&self.conn, trajectory.name())?.is_none() {
            self.store_trajectory(trajectory)?;
        }
        let run = trajectory.run(run_index)?;
        let records = trajectory
            .records()
            .into_iter()
            .filter(|record| {
                matches!(
                    namespace::scope_of(&record.path, run.name()),
                    RunScope::Own | RunScope::Shared
                )
            })
            .collect();
        self.commit_fragment(&RunFragment {
            trajectory: trajectory.name().to_string(),
            run_index,
            run_name: run.name().to_string(),
            records,
        })
    }

    /// Commits a harvested fragment in a single transaction.
    ///
    /// Re-committing a completed run with the same content is a no-op that
    /// writes nothing; different content is a [`TrajError::PersistenceConflict`].
    /// Records naming another run, or leaves outside both the run's namespace
    /// and `runs.run_ALL`, are refused with [`TrajError::Access`].
    pub fn commit_fragment(&mut self, fragment: &RunFragment) -> Result<CommitStatus, TrajError> {
        let tx = self.conn.transaction().map_err(sql("traj_store.transaction"))?;
        let trajectory = trajectory_id(&tx, &fragment.trajectory)?.ok_or_else(|| {
            TrajError::NotFound(
                ErrorInfo::new("trajectory-missing", "fragment targets an unknown trajectory")
                    .with_context("name", fragment.trajectory.clone())
                    .with_hint("store the trajectory before committing runs"),
            )
        })?;
        let status = write_fragment(&tx, &self.codecs, trajectory, fragment)?;
        if status == CommitStatus::Committed {
            tx.commit().map_err(sql("traj_store.commit"))?;
            info!(
                target: "traj::store",
                trajectory = %fragment.trajectory,
                run = %fragment.run_name,
                records = fragment.records.len(),
                "run committed"
            );
        } else {
            debug!(
                target: "traj::store",
                trajectory = %fragment.trajectory,
                run = %fragment.run_name,
                "run already committed with identical content"
            );
        }
        Ok(status)
    }

    /// Records a failed run. Nothing of its subtree is stored.
    pub fn mark_failed(
        &mut self,
        trajectory: &str,
        run_index: usize,
        failure: &str,
    ) -> Result<(), TrajError> {
        let id = trajectory_id(&self.conn, trajectory)?.ok_or_else(|| missing(trajectory))?;
        let completed = run_row(&self.conn, id, run_index)?.1;
        if completed {
            return Err(TrajError::PersistenceConflict(
                ErrorInfo::new("run-committed", "cannot mark a committed run as failed")
                    .with_context("trajectory", trajectory)
                    .with_context("run", run_index.to_string()),
            ));
        }
        self.conn
            .execute(
                "UPDATE runs SET failed = 1, failure = ? WHERE trajectory_id = ? AND idx = ?",
                params![failure, id, run_index as i64],
            )
            .map_err(sql("traj_store.update_run"))?;
        warn!(target: "traj::store", trajectory, run = run_index, failure, "run marked failed");
        Ok(())
    }

    pub fn load(
        &self,
        selector: impl Into<TrajectorySelector>,
        fidelity: Fidelity,
    ) -> Result<Trajectory, TrajError> {
        self.load_with(selector.into(), fidelity, false)
    }

    /// Like [`Self::load`]; `shared_results` also materialises the results
    /// under `runs.run_ALL` below full fidelity.
    fn load_with(
        &self,
        selector: TrajectorySelector,
        fidelity: Fidelity,
        shared_results: bool,
    ) -> Result<Trajectory, TrajError> {
        let entry = self.entry(&selector)?;
        let nodes = self.node_rows(entry.id)?;
        let payloads = if fidelity == Fidelity::Skeleton {
            BTreeMap::new()
        } else {
            self.payload_rows(entry.id)?
        };
        let ranges = if fidelity == Fidelity::Skeleton {
            BTreeMap::new()
        } else {
            self.range_rows(entry.id)?
        };

        let mut records = Vec::with_capacity(nodes.len());
        for (path, kind, comment, annotations) in nodes {
            let kind = NodeKind::parse(&kind).ok_or_else(|| {
                TrajError::Storage(
                    ErrorInfo::new("traj_store.node_kind", "unknown node kind")
                        .with_context("path", path.clone())
                        .with_context("kind", kind.clone()),
                )
            })?;
            let annotations: BTreeMap<String, Value> = from_json_slice(annotations.as_bytes())?;
            let leaf = match kind {
                NodeKind::Group => None,
                NodeKind::Parameter => {
                    let mut param = match payloads.get(&path) {
                        Some(bytes) => match decode::<Leaf>(bytes)? {
                            Leaf::Parameter(param) => param,
                            Leaf::Result(_) => return Err(payload_kind(&path)),
                        },
                        None => ParameterLeaf::stub(),
                    };
                    if let Some(range) = ranges.get(&path) {
                        if param.is_loaded() {
                            param.set_range(range.clone(), None)?;
                        }
                    }
                    Some(Leaf::Parameter(param))
                }
                NodeKind::Result => {
                    let result = match payloads.get(&path) {
                        Some(bytes)
                            if fidelity == Fidelity::Full
                                || (shared_results && namespace::is_run_independent(&path)) =>
                        {
                            match decode::<Leaf>(bytes)? {
                                Leaf::Result(result) => result,
                                Leaf::Parameter(_) => return Err(payload_kind(&path)),
                            }
                        }
                        _ => ResultLeaf::stub(),
                    };
                    Some(Leaf::Result(result))
                }
            };
            records.push(NodeRecord::new(
                path,
                NodeSpec {
                    comment,
                    annotations,
                    leaf,
                },
            ));
        }

        let runs = self.run_rows(entry.id)?;
        let tree = Tree::from_records(records)?;
        debug!(target: "traj::store", trajectory = %entry.name, ?fidelity, "trajectory loaded");
        Trajectory::from_parts(entry.name, entry.comment, tree, runs)
    }

    /// Indices still to execute, against the stored exploration.
    ///
    /// The trajectory comes back with ranges and the `runs.run_ALL` results,
    /// so resumed runs can keep adding items to them.
    pub fn resume(&self, selector: impl Into<TrajectorySelector>) -> Result<ResumePlan, TrajError> {
        let trajectory = self.load_with(selector.into(), Fidelity::SkeletonWithRanges, true)?;
        let runs = trajectory.run_count();
        if runs > 1 {
            let explored = trajectory.explored_paths();
            if explored.is_empty() {
                return Err(TrajError::Exploration(
                    ErrorInfo::new("ranges-missing", "stored trajectory has no exploration ranges")
                        .with_context("trajectory", trajectory.name())
                        .with_hint("store the trajectory before dispatching runs"),
                ));
            }
            for path in explored {
                let len = trajectory.parameter(&path)?.range().map_or(0, <[Value]>::len);
                if len != runs {
                    return Err(TrajError::Exploration(
                        ErrorInfo::new("ranges-incomplete", "stored range is shorter than the run list")
                            .with_context("path", path)
                            .with_context("expected", runs.to_string())
                            .with_context("actual", len.to_string()),
                    ));
                }
            }
        }
        let pending = trajectory.pending_indices();
        let completed = trajectory.completed_count();
        info!(
            target: "traj::store",
            trajectory = %trajectory.name(),
            skipped = completed,
            remaining = pending.len(),
            "resume plan ready"
        );
        Ok(ResumePlan {
            trajectory,
            pending,
            completed,
        })
    }

    /// Merges two stored trajectories into a new one named `into`.
    pub fn merge(
        &mut self,
        first: impl Into<TrajectorySelector>,
        second: impl Into<TrajectorySelector>,
        into: &str,
    ) -> Result<MergeReport, TrajError> {
        let first = self.load(first, Fidelity::Full)?;
        let second = self.load(second, Fidelity::Full)?;
        if trajectory_id(&self.conn, into)?.is_some() {
            return Err(TrajError::MergeConflict(
                ErrorInfo::new("merge-target-exists", "a trajectory with the target name exists")
                    .with_context("name", into),
            ));
        }
        let MergeOutcome {
            mut merged,
            renamed,
        } = merge_trajectories(&first, &second)?;
        merged.rename(into)?;

        let tx = self.conn.transaction().map_err(sql("traj_store.transaction"))?;
        let id = write_structure(&tx, &self.codecs, &merged, true)?;
        for run in merged.runs() {
            match run.state() {
                RunState::Completed => {
                    let fragment = run_fragment(&merged, run);
                    write_fragment(&tx, &self.codecs, id, &fragment)?;
                }
                RunState::Failed => {
                    tx.execute(
                        "UPDATE runs SET failed = 1, failure = ? WHERE trajectory_id = ? AND idx = ?",
                        params![run.failure(), id, run.index() as i64],
                    )
                    .map_err(sql("traj_store.update_run"))?;
                }
                RunState::Pending | RunState::Running => {}
            }
        }
        tx.commit().map_err(sql("traj_store.commit"))?;
        info!(
            target: "traj::store",
            first = %first.name(),
            second = %second.name(),
            merged = %into,
            runs = merged.run_count(),
            "trajectories merged"
        );
        Ok(MergeReport {
            name: into.to_string(),
            runs: merged.run_count(),
            renamed,
        })
    }

    pub fn delete_trajectory(&mut self, selector: impl Into<TrajectorySelector>) -> Result<(), TrajError> {
        let entry = self.entry(&selector.into())?;
        let tx = self.conn.transaction().map_err(sql("traj_store.transaction"))?;
        for statement in [
            "DELETE FROM ranges WHERE trajectory_id = ?",
            "DELETE FROM payloads WHERE trajectory_id = ?",
            "DELETE FROM nodes WHERE trajectory_id = ?",
            "DELETE FROM runs WHERE trajectory_id = ?",
            "DELETE FROM trajectories WHERE id = ?",
        ] {
            tx.execute(statement, params![entry.id])
                .map_err(sql("traj_store.delete"))?;
        }
        tx.commit().map_err(sql("traj_store.commit"))?;
        info!(target: "traj::store", trajectory = %entry.name, "trajectory deleted");
        Ok(())
    }

    fn node_rows(&self, id: i64) -> Result<Vec<(String, String, String, String)>, TrajError> {
        let mut stmt = self
            .conn
            .prepare("SELECT path, kind, comment, annotations FROM nodes WHERE trajectory_id = ? ORDER BY id")
            .map_err(sql("traj_store.query"))?;
        let rows = stmt
            .query_map([id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))
            .map_err(sql("traj_store.query"))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(sql("traj_store.query"))
    }

    fn payload_rows(&self, id: i64) -> Result<BTreeMap<String, Vec<u8>>, TrajError> {
        let mut stmt = self
            .conn
            .prepare("SELECT path, data FROM payloads WHERE trajectory_id = ?")
            .map_err(sql("traj_store.query"))?;
        let rows = stmt
            .query_map([id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?)))
            .map_err(sql("traj_store.query"))?;
        rows.collect::<Result<BTreeMap<_, _>, _>>().map_err(sql("traj_store.query"))
    }

    fn range_rows(&self, id: i64) -> Result<BTreeMap<String, Vec<Value>>, TrajError> {
        let mut stmt = self
            .conn
            .prepare("SELECT path, data FROM ranges WHERE trajectory_id = ? ORDER BY path, position")
            .map_err(sql("traj_store.query"))?;
        let rows = stmt
            .query_map([id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?)))
            .map_err(sql("traj_store.query"))?;
        let mut ranges: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        for row in rows {
            let (path, data) = row.map_err(sql("traj_store.query"))?;
            ranges.entry(path).or_default().push(decode(&data)?);
        }
        Ok(ranges)
    }

    fn run_rows(&self, id: i64) -> Result<Vec<RunDescriptor>, TrajError> {
        let mut stmt = self
            .conn
            .prepare("SELECT idx, completed, failed, failure FROM runs WHERE trajectory_id = ? ORDER BY idx")
            .map_err(sql("traj_store.query"))?;
        let rows = stmt
            .query_map([id], |row| {
                let index: i64 = row.get(0)?;
                let completed: bool = row.get(1)?;
                let failed: bool = row.get(2)?;
                let failure: Option<String> = row.get(3)?;
                let state = match (completed, failed) {
                    (true, _) => RunState::Completed,
                    (false, true) => RunState::Failed,
                    (false, false) => RunState::Pending,
                };
                Ok(RunDescriptor::restored(index as usize, state, failure))
            })
            .map_err(sql("traj_store.query"))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(sql("traj_store.query"))
    }
}

fn missing(name: &str) -> TrajError {
    TrajError::NotFound(
        ErrorInfo::new("trajectory-missing", "no trajectory with this name").with_context("name", name),
    )
}

fn payload_kind(path: &str) -> TrajError {
    TrajError::Storage(
        ErrorInfo::new("traj_store.payload_kind", "payload kind disagrees with node kind")
            .with_context("path", path),
    )
}

fn run_row(conn: &Connection, trajectory: i64, run_index: usize) -> Result<(String, bool, Option<String>), TrajError> {
    conn.query_row(
        "SELECT name, completed, digest FROM runs WHERE trajectory_id = ? AND idx = ?",
        params![trajectory, run_index as i64],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )
    .optional()
    .map_err(sql("traj_store.query"))?
    .ok_or_else(|| {
        TrajError::Index(
            ErrorInfo::new("run-unknown", "run is not part of the stored run list")
                .with_context("run", run_index.to_string()),
        )
    })
}

/// Trajectory row, non-run nodes and the run list.
///
/// Until a run completes, a stored exploration is replaced by the one in
/// memory; afterwards it is fixed.
fn write_structure(
    conn: &Connection,
    codecs: &CodecRegistry,
    trajectory: &Trajectory,
    with_payload: bool,
) -> Result<i64, TrajError> {
    let id = ensure_trajectory(conn, trajectory.name(), trajectory.comment())?;
    if with_payload {
        prune_exploration(conn, id, trajectory)?;
    }
    for record in trajectory.records() {
        if namespace::run_of_path(&record.path).is_some() {
            continue;
        }
        write_record(conn, codecs, id, &record, with_payload)?;
    }
    ensure_runs(conn, id, trajectory.runs())?;
    Ok(id)
}

fn run_fragment(trajectory: &Trajectory, run: &RunDescriptor) -> RunFragment {
    let records = trajectory
        .records()
        .into_iter()
        .filter(|record| namespace::run_of_path(&record.path) == Some(run.name()))
        .collect();
    RunFragment {
        trajectory: trajectory.name().to_string(),
        run_index: run.index(),
        run_name: run.name().to_string(),
        records,
    }
}

/// Writes a fragment unless the run is already completed.
///
/// The digest covers the records inside the run's own namespace. Shared
/// records merge into `runs.run_ALL`; on a re-commit they must already be
/// held by the store.
fn write_fragment(
    conn: &Connection,
    codecs: &CodecRegistry,
    trajectory: i64,
    fragment: &RunFragment,
) -> Result<CommitStatus, TrajError> {
    let scoped = fragment.scoped()?;
    let digest = stable_hash_string(&scoped.own)?;
    let (name, completed, stored) = run_row(conn, trajectory, fragment.run_index)?;
    if name != fragment.run_name {
        return Err(TrajError::Index(
            ErrorInfo::new("run-name", "stored run has another name")
                .with_context("stored", name)
                .with_context("fragment", fragment.run_name.clone()),
        ));
    }
    if completed {
        if stored.as_deref() != Some(digest.as_str()) {
            return Err(committed_elsewhere(fragment, None));
        }
        for record in &scoped.shared {
            if !holds_record(conn, trajectory, record)? {
                return Err(committed_elsewhere(fragment, Some(record.path.as_str())));
            }
        }
        return Ok(CommitStatus::AlreadyCommitted);
    }
    for record in scoped.structure.iter().chain(&scoped.shared) {
        write_record(conn, codecs, trajectory, record, true)?;
    }
    for record in &scoped.own {
        clear_path(conn, trajectory, &record.path)?;
    }
    for record in &scoped.own {
        write_record(conn, codecs, trajectory, record, true)?;
    }
    conn.execute(
        "UPDATE runs SET completed = 1, failed = 0, failure = NULL, digest = ? WHERE trajectory_id = ? AND idx = ?",
        params![digest, trajectory, fragment.run_index as i64],
    )
    .map_err(sql("traj_store.update_run"))?;
    Ok(CommitStatus::Committed)
}

fn committed_elsewhere(fragment: &RunFragment, shared: Option<&str>) -> TrajError {
    let mut info = ErrorInfo::new("run-committed", "run already committed with other content")
        .with_context("trajectory", fragment.trajectory.clone())
        .with_context("run", fragment.run_name.clone())
        .with_hint("completed runs are never overwritten");
    if let Some(path) = shared {
        info = info.with_context("shared", path);
    }
    TrajError::PersistenceConflict(info)
}
