//! Wiring facade over the core: registry, watch index, worker pool and
//! persistence, plus the root-lifecycle orchestration the request handlers
//! call into.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use inotify::Watches;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::ClientError;
use crate::event::Event;
use crate::index::WatchIndex;
use crate::kernel;
use crate::persist::Persist;
use crate::registry::{normalize_path, RootRegistry};
use crate::workers::{Task, WorkerContext, WorkerPool};

/// Fixed pool size; a burst of directory creation queues installs instead of
/// spawning threads.
const WORKER_COUNT: usize = 4;

pub struct Service {
    pub registry: Arc<RootRegistry>,
    pub index: Arc<WatchIndex>,
    pub workers: WorkerPool,
    pub persist: Arc<Persist>,
    pub config: Arc<RwLock<Config>>,
    started: Instant,
}

impl Service {
    /// Wire up the shared state and start the worker pool. `watches` is a
    /// handle from the daemon's kernel watcher; workers clone it freely.
    pub fn new(watches: Watches, config: Config) -> std::io::Result<Self> {
        let registry = Arc::new(RootRegistry::new());
        let index = Arc::new(WatchIndex::new());
        let persist = Arc::new(Persist::new(config.persist_file.clone()));

        let ctx = WorkerContext {
            watches,
            index: Arc::clone(&index),
            registry: Arc::clone(&registry),
            persist: Arc::clone(&persist),
            sweep_in_progress: Arc::new(AtomicBool::new(false)),
            memclean_in_progress: Arc::new(AtomicBool::new(false)),
        };
        let workers = WorkerPool::start(WORKER_COUNT, ctx)?;

        Ok(Self {
            registry,
            index,
            workers,
            persist,
            config: Arc::new(RwLock::new(config)),
            started: Instant::now(),
        })
    }

    /// Declare a new root and kick off the recursive watch installation.
    /// `mask` 0 picks the default mask, `max_events` 0 the configured bound.
    pub fn watch(
        &self,
        path: &str,
        mask: u32,
        max_events: usize,
        rewatch: bool,
    ) -> Result<(), ClientError> {
        let path = normalize_path(path);
        if !path.starts_with('/') {
            warn!(path = %path, "watch request for non-absolute path");
            return Err(ClientError::NotAbsolutePath);
        }

        let mask = if mask == 0 { kernel::default_mask() } else { mask };
        let max_events = if max_events == 0 {
            self.config.read().max_events
        } else {
            max_events
        };

        let root = self.registry.add(&path, mask, max_events, rewatch)?;
        info!(path = %root.path, mask, max_events, rewatch, "watching new root");

        self.persist_now();

        self.workers.submit(Task::Install {
            path: root.path.clone(),
            root,
            settle: false,
        })
    }

    /// Flag a root for destruction and hand the teardown to a worker. By the
    /// time this returns, no further events will be enqueued for the root.
    pub fn unwatch(&self, path: &str) -> Result<(), ClientError> {
        let path = normalize_path(path);
        let root = self.registry.begin_destroy(&path)?;
        info!(path = %root.path, "unwatch requested");
        self.workers.submit(Task::Teardown { root })
    }

    pub fn pause(&self, path: &str) -> Result<(), ClientError> {
        let path = normalize_path(path);
        self.registry.set_paused(&path, true)?;
        debug!(path = %path, "root paused");
        Ok(())
    }

    pub fn unpause(&self, path: &str) -> Result<(), ClientError> {
        let path = normalize_path(path);
        self.registry.set_paused(&path, false)?;
        debug!(path = %path, "root unpaused");
        Ok(())
    }

    pub fn queue_size(&self, path: &str) -> Result<usize, ClientError> {
        let path = normalize_path(path);
        let root = self.registry.get(&path).ok_or(ClientError::NotWatched)?;
        if root.is_destroying() {
            return Ok(0);
        }
        Ok(root.queue_len())
    }

    /// Dequeue up to `count` events (0 means all) in arrival order.
    pub fn events(&self, path: &str, count: usize) -> Result<Vec<Event>, ClientError> {
        let path = normalize_path(path);
        let root = self.registry.get(&path).ok_or(ClientError::NotWatched)?;
        Ok(root.dequeue(count))
    }

    pub fn roots(&self) -> Vec<String> {
        self.registry.paths()
    }

    /// Total directory watches and formatted uptime for `status`.
    pub fn status(&self) -> (usize, String) {
        (self.index.len(), format_uptime(self.started.elapsed().as_secs()))
    }

    /// Restore the persisted rewatch set. Roots whose directories vanished
    /// while the daemon was down are logged and dropped from the set.
    pub fn restore_persisted(&self) {
        let persisted = self.persist.load();
        if persisted.is_empty() {
            return;
        }
        info!(count = persisted.len(), "restoring persisted roots");
        for entry in persisted {
            if let Err(e) = self.watch(&entry.path, entry.mask, entry.max_events, true) {
                warn!(path = %entry.path, "failed to restore persisted root: {e}");
            }
        }
    }

    /// Write the rewatch set out, logging rather than propagating failures;
    /// persistence must never take the daemon down.
    pub fn persist_now(&self) {
        if let Err(e) = self.persist.save(&self.registry) {
            warn!("failed to persist root set: {e}");
        }
    }
}

fn format_uptime(total_secs: u64) -> String {
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3_600;
    let mins = (total_secs % 3_600) / 60;
    let secs = total_secs % 60;
    format!("{days}d {hours}h {mins}m {secs}s")
}
