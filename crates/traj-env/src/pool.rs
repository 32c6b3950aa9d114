//! Worker pool execution under the three coordination modes.
//!
//! Run indices are handed out in order. A worker asks the calling thread for
//! the view of its run just before executing it, so every view reflects the
//! runs merged so far. The calling thread is the only one touching the
//! trajectory.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, error};
use traj_core::{from_message_bytes, to_message_bytes, CodecRegistry, ErrorInfo, TrajError};
use traj_exp::{run_name, Trajectory};
use traj_store::{StorageConfig, StorageService, StoreLock};

use crate::commit::commit_report;
use crate::config::Coordination;
use crate::drain::DrainHandle;
use crate::environment::settle;
use crate::report::RunReport;
use crate::simulation::Simulation;
use crate::worker::{execute, Delivery, Job, Message, WorkerReport};

pub(crate) struct PoolSettings {
    pub workers: usize,
    pub coordination: Coordination,
    pub master_seed: u64,
    pub continue_on_failure: bool,
    pub intermediate: Option<PathBuf>,
    pub storage: StorageConfig,
}

/// State shared by the workers of one dispatch.
struct Shared<'a> {
    pending: &'a [usize],
    next: AtomicUsize,
    drain: &'a DrainHandle,
    halt: DrainHandle,
    commit_lock: Mutex<()>,
    settings: &'a PoolSettings,
    trajectory: &'a str,
    store_path: &'a Path,
    codecs: &'a CodecRegistry,
}

impl Shared<'_> {
    fn stopping(&self) -> bool {
        self.drain.is_raised() || self.halt.is_raised()
    }

    fn next_index(&self) -> Option<usize> {
        self.pending.get(self.next.fetch_add(1, Ordering::SeqCst)).copied()
    }

    fn intermediate(&self) -> Option<&Path> {
        self.settings.intermediate.as_deref()
    }
}

pub(crate) fn run_pool<S: Simulation>(
    store: &mut StorageService,
    drain: &DrainHandle,
    settings: &PoolSettings,
    trajectory: &mut Trajectory,
    simulation: &S,
    pending: &[usize],
    report: &mut RunReport,
) -> Result<(), TrajError> {
    if pending.is_empty() {
        return Ok(());
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(settings.workers)
        .thread_name(|index| format!("traj-worker-{index}"))
        .build()
        .map_err(|err| TrajError::Config(ErrorInfo::new("thread-pool", err.to_string())))?;

    let name = trajectory.name().to_string();
    let store_path = store.path().to_path_buf();
    let codecs = store.codecs().clone();
    let shared = Shared {
        pending,
        next: AtomicUsize::new(0),
        drain,
        halt: DrainHandle::new(),
        commit_lock: Mutex::new(()),
        settings,
        trajectory: &name,
        store_path: &store_path,
        codecs: &codecs,
    };
    let shared = &shared;
    let workers = settings.workers.min(pending.len());
    let mut fatal: Option<TrajError> = None;

    thread::scope(|scope| {
        let (tx, rx) = mpsc::channel::<Message>();
        let (mut local_store, queue) = match settings.coordination {
            Coordination::Queue => {
                let (queue_tx, queue_rx) = mpsc::channel::<Delivery>();
                let results = tx.clone();
                scope.spawn(move || write_queue(store, shared, queue_rx, results));
                (None, Some(queue_tx))
            }
            Coordination::Local | Coordination::Lock => (Some(store), None),
        };
        scope.spawn(move || {
            pool.scope(move |pool_scope| {
                for _ in 0..workers {
                    let main = tx.clone();
                    let queue = queue.clone();
                    pool_scope.spawn(move |_| work(shared, simulation, main, queue));
                }
            });
        });

        for message in rx {
            let delivery = match message {
                Message::View { index, reply } => {
                    let view = serve_view(trajectory, index, settings.master_seed);
                    if let Err(err) = &view {
                        error!(target: "traj::env", index, error = %err, "view not built");
                    }
                    // A worker that went away no longer needs the view.
                    let _ = reply.send(view);
                    continue;
                }
                Message::Delivered(delivery) => delivery,
            };
            let index = delivery.index;
            match receive(delivery, local_store.as_deref_mut(), trajectory, shared, report) {
                Ok(failed) => {
                    if failed && !settings.continue_on_failure {
                        shared.halt.raise();
                    }
                }
                Err(err) => {
                    error!(target: "traj::env", index, error = %err, "dispatch aborted");
                    shared.halt.raise();
                    fatal.get_or_insert(err);
                }
            }
        }
    });

    match fatal {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Marks the run as started and encodes its view from the current trajectory.
fn serve_view(trajectory: &mut Trajectory, index: usize, master_seed: u64) -> Result<Vec<u8>, TrajError> {
    trajectory.mark_running(index)?;
    to_message_bytes(&trajectory.view(index, master_seed)?)
}

/// Asks the calling thread for a view; `None` once it stopped listening.
fn request_view(main: &Sender<Message>, index: usize) -> Option<Result<Vec<u8>, TrajError>> {
    let (reply, answer) = mpsc::channel();
    main.send(Message::View { index, reply }).ok()?;
    answer.recv().ok()
}

fn work<S: Simulation + ?Sized>(
    shared: &Shared<'_>,
    simulation: &S,
    main: Sender<Message>,
    queue: Option<Sender<Delivery>>,
) {
    let mut own_store: Option<StorageService> = None;
    while let Some(index) = shared.next_index() {
        let name = run_name(index);
        let worker = if shared.stopping() {
            WorkerReport::drained(index, name)
        } else {
            match request_view(&main, index) {
                None => break,
                Some(Ok(view)) => {
                    debug!(target: "traj::env", run = %name, index, "run started");
                    execute(simulation, &Job { index, name, view })
                }
                Some(Err(err)) => WorkerReport::failed(index, name, err.to_string()),
            }
        };
        let (report, committed) = match shared.settings.coordination {
            Coordination::Lock => (
                commit_locked(shared, &mut own_store, worker).and_then(|worker| to_message_bytes(&worker)),
                true,
            ),
            Coordination::Local | Coordination::Queue => (to_message_bytes(&worker), false),
        };
        let delivery = Delivery {
            index,
            report,
            committed,
        };
        let sent = match &queue {
            Some(queue) => queue.send(delivery).is_ok(),
            None => main.send(Message::Delivered(delivery)).is_ok(),
        };
        if !sent {
            break;
        }
    }
}

/// Commits from a worker while holding both the in-process and the file lock.
///
/// The worker's own store handle is opened under the locks on first use.
fn commit_locked(
    shared: &Shared<'_>,
    slot: &mut Option<StorageService>,
    worker: WorkerReport,
) -> Result<WorkerReport, TrajError> {
    let _guard = shared.commit_lock.lock();
    let _file = StoreLock::acquire(shared.store_path, &shared.settings.storage.lock_file_suffix)?;
    let store = match slot {
        Some(store) => store,
        None => slot.insert(
            StorageService::open(shared.store_path, shared.settings.storage.clone())?
                .with_codecs(shared.codecs.clone()),
        ),
    };
    commit_report(store, shared.trajectory, worker, shared.intermediate())
}

/// Dedicated writer: the only thread using the store in queue mode.
fn write_queue(
    store: &mut StorageService,
    shared: &Shared<'_>,
    queue: Receiver<Delivery>,
    results: Sender<Message>,
) {
    for delivery in queue {
        let index = delivery.index;
        let report = delivery
            .report
            .and_then(|bytes| from_message_bytes::<WorkerReport>(&bytes))
            .and_then(|worker| commit_report(store, shared.trajectory, worker, shared.intermediate()))
            .and_then(|worker| to_message_bytes(&worker));
        let delivery = Delivery {
            index,
            report,
            committed: true,
        };
        if results.send(Message::Delivered(delivery)).is_err() {
            break;
        }
    }
}

fn receive(
    delivery: Delivery,
    store: Option<&mut StorageService>,
    trajectory: &mut Trajectory,
    shared: &Shared<'_>,
    report: &mut RunReport,
) -> Result<bool, TrajError> {
    let mut worker: WorkerReport = from_message_bytes(&delivery.report?)?;
    if !delivery.committed {
        if let Some(store) = store {
            worker = commit_report(store, shared.trajectory, worker, shared.intermediate())?;
        }
    }
    settle(trajectory, worker, report)
}
