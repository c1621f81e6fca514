//! Thin adapter over the kernel's inotify primitive.
//!
//! Owns the notification file descriptor and exposes the three operations
//! the rest of the daemon needs: add a watch, remove a watch, pull a batch
//! of raw events. Watch handles (`Watches`) are cheap clones that background
//! workers use while the pump thread keeps the descriptor for reading.

use std::io;
use std::os::unix::io::AsRawFd;

use inotify::{EventMask, Inotify, WatchDescriptor, WatchMask, Watches};
use tracing::{trace, warn};

/// Mask applied when a watch request does not specify one: attribute change,
/// move-from, move-to, create, close-after-write, delete, unmount, and never
/// follow symlinks.
pub fn default_mask() -> u32 {
    WatchMask::ATTRIB.bits()
        | WatchMask::MOVED_FROM.bits()
        | WatchMask::MOVED_TO.bits()
        | WatchMask::CREATE.bits()
        | WatchMask::CLOSE_WRITE.bits()
        | WatchMask::DELETE.bits()
        | EventMask::UNMOUNT.bits()
        | WatchMask::DONT_FOLLOW.bits()
}

/// One raw kernel notification, copied out of the read buffer.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub wd: WatchDescriptor,
    pub mask: EventMask,
    pub cookie: u32,
    /// Name of the affected entry inside the watched directory. `None` for
    /// events about the watched directory itself.
    pub name: Option<String>,
}

/// The daemon's single inotify instance.
pub struct KernelWatcher {
    inotify: Inotify,
    buffer: [u8; 4096],
}

impl KernelWatcher {
    /// Initialize the inotify descriptor. Failure here is fatal to the
    /// daemon; everything downstream assumes a working descriptor.
    pub fn init() -> io::Result<Self> {
        let inotify = Inotify::init()?;

        // Make sure reads never block: the main loop drains this descriptor
        // opportunistically between requests.
        let fd = inotify.as_raw_fd();
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFL);
            libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
        }

        Ok(Self {
            inotify,
            buffer: [0; 4096],
        })
    }

    /// Handle for adding/removing watches from other threads.
    pub fn watches(&self) -> Watches {
        self.inotify.watches()
    }

    /// Pull the next batch of raw events. Returns an empty batch when the
    /// kernel has nothing for us (spurious wakeups included).
    pub fn read_batch(&mut self) -> io::Result<Vec<RawEvent>> {
        match self.inotify.read_events(&mut self.buffer) {
            Ok(events) => Ok(events
                .map(|event| RawEvent {
                    wd: event.wd,
                    mask: event.mask,
                    cookie: event.cookie,
                    name: event
                        .name
                        .map(|n| n.to_string_lossy().into_owned())
                        .filter(|n| !n.is_empty()),
                })
                .collect()),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

/// Install a watch on a single directory. The kernel is idempotent here:
/// re-adding the same path returns the same descriptor with an updated mask.
pub fn add_watch(watches: &mut Watches, path: &str, mask: u32) -> io::Result<WatchDescriptor> {
    let mask = WatchMask::from_bits_retain(mask | WatchMask::DONT_FOLLOW.bits());
    let wd = watches.add(path, mask)?;
    trace!(wd = wd_id(&wd), path, "watching");
    Ok(wd)
}

/// Ask the kernel to drop a watch. A trailing IGNORED event may still be
/// delivered and is filtered by the pump. Failures are warnings only; the
/// descriptor may already be gone.
pub fn remove_watch(watches: &mut Watches, wd: WatchDescriptor, path: &str) {
    let id = wd_id(&wd);
    if let Err(e) = watches.remove(wd) {
        warn!(wd = id, path, "failed to remove kernel watch: {e}");
    } else {
        trace!(wd = id, path, "unwatched");
    }
}

/// Raw integer id behind a watch descriptor, for logging and event records.
pub fn wd_id(wd: &WatchDescriptor) -> i32 {
    wd.get_watch_descriptor_id()
}
