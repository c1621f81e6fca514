//! Periodic self-healing.
//!
//! Every tick (nominally 10 s) the daemon persists the root set, reloads the
//! config file if it changed on disk, and, on their own cadences, schedules
//! the two repair jobs:
//!
//! - **memclean** drops watch-index entries whose directories no longer
//!   exist on disk;
//! - **rewatch sweep** re-walks every active root and installs watches for
//!   directories the index is missing.
//!
//! Both jobs snapshot under the lock, then do their syscalls with the lock
//! released and re-validate before mutating.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::kernel;
use crate::logging::LogHandle;
use crate::service::Service;
use crate::workers::{Task, WorkerContext};

const TICK_INTERVAL: Duration = Duration::from_secs(10);

/// Tick state owned by the main loop.
pub struct Housekeeper {
    config_path: PathBuf,
    config_mtime: Option<SystemTime>,
    log_handle: Option<LogHandle>,
    last_tick: Instant,
    last_memclean: Instant,
    last_sweep: Instant,
}

impl Housekeeper {
    pub fn new(config_path: PathBuf, log_handle: Option<LogHandle>) -> Self {
        let now = Instant::now();
        Self {
            config_mtime: Config::mtime(&config_path),
            config_path,
            log_handle,
            last_tick: now,
            last_memclean: now,
            last_sweep: now,
        }
    }

    /// Called once per main-loop turn; runs the tick work when it is due.
    pub fn maybe_tick(&mut self, service: &Service) {
        if self.last_tick.elapsed() < TICK_INTERVAL {
            return;
        }
        self.last_tick = Instant::now();

        service.persist_now();
        self.maybe_reload_config(service);

        let (memclean_every, sweep_every) = {
            let config = service.config.read();
            (
                Duration::from_secs(config.memclean_interval_secs),
                Duration::from_secs(config.rewatch_interval_secs),
            )
        };

        if self.last_memclean.elapsed() >= memclean_every {
            self.last_memclean = Instant::now();
            let _ = service.workers.submit(Task::Memclean);
        }
        if self.last_sweep.elapsed() >= sweep_every {
            self.last_sweep = Instant::now();
            let _ = service.workers.submit(Task::Sweep);
        }
    }

    /// Re-read the config file when its mtime advances. Only the fields that
    /// can sensibly change at runtime are applied.
    fn maybe_reload_config(&mut self, service: &Service) {
        let mtime = Config::mtime(&self.config_path);
        if mtime.is_none() || mtime == self.config_mtime {
            return;
        }
        self.config_mtime = mtime;

        let fresh = Config::load(&self.config_path);
        info!(file = %self.config_path.display(), "configuration file changed, reloading");

        if let Some(handle) = &self.log_handle {
            handle.set_level(fresh.filter_directive());
        }

        let mut config = service.config.write();
        config.log_level = fresh.log_level.clone();
        config.max_events = fresh.max_events;
        config.memclean_interval_secs = fresh.memclean_interval_secs;
        config.rewatch_interval_secs = fresh.rewatch_interval_secs;
    }
}

/// Remove index entries whose directories are gone from disk.
pub fn memclean(ctx: &mut WorkerContext) {
    let snapshot = ctx.index.paths();
    let checked = snapshot.len();
    let mut removed = 0usize;

    for path in snapshot {
        if !path.starts_with('/') {
            // Nothing non-absolute should ever be indexed; leave it for a
            // human to investigate rather than stat a relative path.
            warn!(path = %path, "non-absolute path found in watch index");
            continue;
        }
        if fs::symlink_metadata(&path).is_ok() {
            continue;
        }
        // Gone on disk. Re-check under the lock in case a teardown or a
        // delete event beat us to it.
        if let Some(watch) = ctx.index.remove_by_path(&path) {
            kernel::remove_watch(&mut ctx.watches, watch.wd.clone(), &path);
            removed += 1;
        }
    }

    if removed > 0 {
        info!(checked, removed, "memclean removed stale watch entries");
    } else {
        debug!(checked, "memclean found nothing to repair");
    }
}

/// Re-walk every active root, adding watches for directories missing from
/// the index.
pub fn rewatch_sweep(ctx: &mut WorkerContext) {
    let roots = ctx.registry.roots();
    for root in roots {
        if root.is_destroying() {
            continue;
        }
        let start = root.path.clone();
        crate::tree::install_tree(&mut ctx.watches, &ctx.index, &root, &start, true);
    }
}
