//! The event pump: sole consumer of the kernel notification descriptor.
//!
//! Each raw event is filtered, resolved to its watch and owning root,
//! mirrored into the watch index when it changes directory topology, and
//! finally queued on the root if its mask asks for it. Per-root ordering is
//! kernel arrival order; nothing here reorders.

use inotify::EventMask;
use tracing::{debug, error, trace, warn};

use crate::event::{join_path, Event};
use crate::kernel::{self, KernelWatcher, RawEvent};
use crate::service::Service;
use crate::tree::TRANSIENT_DIR_SUFFIX;
use crate::workers::Task;

pub struct EventPump {
    kernel: KernelWatcher,
    watches: inotify::Watches,
}

impl EventPump {
    pub fn new(kernel: KernelWatcher) -> Self {
        let watches = kernel.watches();
        Self { kernel, watches }
    }

    /// Drain everything the kernel has queued. Returns the number of raw
    /// events consumed; zero is normal (spurious wakeups, quiet periods).
    pub fn drain(&mut self, service: &Service) -> usize {
        let mut consumed = 0;
        loop {
            let batch = match self.kernel.read_batch() {
                Ok(batch) => batch,
                Err(e) => {
                    error!("inotify read error: {e}");
                    return consumed;
                }
            };
            if batch.is_empty() {
                return consumed;
            }
            for raw in batch {
                consumed += 1;
                self.handle(service, raw);
            }
        }
    }

    fn handle(&mut self, service: &Service, raw: RawEvent) {
        // The kernel's own overflow marker: events were lost before we ever
        // saw them. Nothing to salvage here.
        if raw.mask.contains(EventMask::Q_OVERFLOW) {
            error!(
                "kernel event queue overflowed; raise fs.inotify.max_queued_events \
                 if this keeps happening"
            );
            return;
        }
        // Trailing acknowledgement of a remove_watch we issued.
        if raw.mask.contains(EventMask::IGNORED) {
            return;
        }
        let name = match &raw.name {
            Some(name) => name.clone(),
            // Events about the watched directory itself (and other
            // degenerate shapes) carry no name; drop them.
            None => return,
        };
        // Adding a watch and shell tab completion both fire spurious
        // read-only closes on directories.
        if raw.mask.contains(EventMask::ISDIR) && raw.mask.contains(EventMask::CLOSE_NOWRITE) {
            return;
        }
        if name.ends_with(TRANSIENT_DIR_SUFFIX) {
            return;
        }

        // Resolve the parent directory. A miss is expected under rapid
        // create/delete churn, where events outlive their watches.
        let watch = match service.index.lookup_by_wd(&raw.wd) {
            Some(watch) => watch,
            None => {
                trace!(
                    wd = kernel::wd_id(&raw.wd),
                    name = %name,
                    "no watch for event descriptor, skipping"
                );
                return;
            }
        };

        let root = match service.registry.find_root_for(&watch.path) {
            Some(root) => root,
            None => return,
        };
        if root.is_destroying() {
            return;
        }

        let abs_path = join_path(&watch.path, &name);
        trace!(path = %abs_path, mask = raw.mask.bits(), "got event");

        // Keep the watch set congruent with directory topology. This runs
        // even for paused roots; pause only gates delivery.
        if raw.mask.contains(EventMask::ISDIR) {
            if raw.mask.intersects(EventMask::CREATE | EventMask::MOVED_TO) {
                debug!(path = %abs_path, "new directory found");
                let submitted = service.workers.submit(Task::Install {
                    root: root.clone(),
                    path: abs_path.clone(),
                    settle: true,
                });
                if submitted.is_err() {
                    warn!(path = %abs_path, "failed to dispatch tree install");
                }
            } else if raw.mask.intersects(EventMask::DELETE | EventMask::MOVED_FROM) {
                debug!(path = %abs_path, "watched directory removed");
                self.forget_directory(service, &abs_path);
                if raw.mask.contains(EventMask::MOVED_FROM) {
                    // The kernel does not cascade on move-out; every watch
                    // under the old path is now orphaned.
                    for orphan in service.index.keys_with_prefix(&abs_path) {
                        self.forget_directory(service, &orphan);
                    }
                }
            }
        }

        if root.is_paused() {
            return;
        }

        if raw.mask.bits() & root.mask != 0 {
            let event = Event {
                wd: kernel::wd_id(&raw.wd),
                mask: raw.mask.bits(),
                cookie: raw.cookie,
                name,
                path: watch.path.clone(),
            };
            // Full queues drop loudly inside enqueue; the client sees the
            // bound, not an error.
            let _ = root.enqueue(event);
        }
    }

    fn forget_directory(&mut self, service: &Service, path: &str) {
        match service.index.remove_by_path(path) {
            Some(watch) => {
                kernel::remove_watch(&mut self.watches, watch.wd.clone(), path);
            }
            None => {
                warn!(path, "removed directory was not in the watch index");
            }
        }
    }
}
