//! Bounded pool of background workers.
//!
//! Tree installs, root teardowns, and the housekeeping sweeps all make
//! blocking syscalls, so they run here instead of on the pump thread. The
//! pool is a fixed set of threads draining one shared task channel; dispatch
//! is non-blocking and the caller only learns whether the task was accepted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use inotify::Watches;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::ClientError;
use crate::housekeeping;
use crate::index::WatchIndex;
use crate::kernel;
use crate::persist::Persist;
use crate::registry::{Root, RootRegistry};
use crate::tree;

/// Pause before walking a directory the pump just saw appear, giving the
/// filesystem a moment to settle.
const SETTLE_DELAY: Duration = Duration::from_millis(1);

/// Work items the pool understands.
pub enum Task {
    /// Install watches for `root`'s tree starting at `path`.
    Install {
        root: Arc<Root>,
        path: String,
        /// Set when the path was freshly created; the walk is delayed by
        /// `SETTLE_DELAY`.
        settle: bool,
    },
    /// Tear down a root flagged for destruction.
    Teardown { root: Arc<Root> },
    /// One memclean pass over the watch index.
    Memclean,
    /// One rewatch sweep over every active root.
    Sweep,
}

/// Everything a worker needs to execute tasks.
#[derive(Clone)]
pub struct WorkerContext {
    pub watches: Watches,
    pub index: Arc<WatchIndex>,
    pub registry: Arc<RootRegistry>,
    pub persist: Arc<Persist>,
    pub sweep_in_progress: Arc<AtomicBool>,
    pub memclean_in_progress: Arc<AtomicBool>,
}

pub struct WorkerPool {
    tx: mpsc::Sender<Task>,
}

impl WorkerPool {
    /// Spawn `size` workers. Thread-creation failure here is fatal; the
    /// daemon cannot run without its background workers.
    pub fn start(size: usize, ctx: WorkerContext) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<Task>();
        let rx = Arc::new(Mutex::new(rx));

        for i in 0..size {
            let rx = Arc::clone(&rx);
            let ctx = ctx.clone();
            thread::Builder::new()
                .name(format!("worker-{i}"))
                .spawn(move || worker_loop(rx, ctx))?;
        }

        Ok(Self { tx })
    }

    /// Hand a task to the pool. Never blocks.
    pub fn submit(&self, task: Task) -> Result<(), ClientError> {
        self.tx.send(task).map_err(|_| ClientError::ThreadCreateFailed)
    }
}

fn worker_loop(rx: Arc<Mutex<mpsc::Receiver<Task>>>, mut ctx: WorkerContext) {
    loop {
        // Receive with a timeout so the receiver mutex is released
        // periodically and idle workers take turns waiting; holding it
        // across a blocking recv would serialize the whole pool.
        let task = {
            let rx = rx.lock();
            rx.recv_timeout(Duration::from_millis(50))
        };
        let task = match task {
            Ok(task) => task,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            // Pool dropped, daemon is shutting down.
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        };

        match task {
            Task::Install { root, path, settle } => {
                if settle {
                    thread::sleep(SETTLE_DELAY);
                }
                if !root.is_destroying() {
                    tree::install_tree(&mut ctx.watches, &ctx.index, &root, &path, false);
                }
            }
            Task::Teardown { root } => teardown_root(&mut ctx, &root),
            Task::Memclean => {
                // Skip if the previous pass is still running on another
                // worker.
                if !ctx.memclean_in_progress.swap(true, Ordering::SeqCst) {
                    housekeeping::memclean(&mut ctx);
                    ctx.memclean_in_progress.store(false, Ordering::SeqCst);
                }
            }
            Task::Sweep => {
                if !ctx.sweep_in_progress.swap(true, Ordering::SeqCst) {
                    housekeeping::rewatch_sweep(&mut ctx);
                    ctx.sweep_in_progress.store(false, Ordering::SeqCst);
                }
            }
        }
    }
}

/// Second phase of unwatch: drop the queue, remove every kernel watch and
/// index entry inside the root, then delete the registry entry and persist
/// the shrunken set.
fn teardown_root(ctx: &mut WorkerContext, root: &Root) {
    info!(root = %root.path, "un-watching tree");

    root.clear_queue();

    let mut removed = 0usize;
    let mut paths = ctx.index.keys_with_prefix(&root.path);
    paths.push(root.path.clone());
    for path in paths {
        if let Some(watch) = ctx.index.remove_by_path(&path) {
            kernel::remove_watch(&mut ctx.watches, watch.wd.clone(), &path);
            removed += 1;
        }
    }

    ctx.registry.remove(&root.path);
    if let Err(e) = ctx.persist.save(&ctx.registry) {
        debug!("failed to persist root set after unwatch: {e}");
    }

    debug!(root = %root.path, removed, "teardown complete");
}
