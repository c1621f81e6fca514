//! Queued filesystem events.

use inotify::EventMask;

/// A single queued event: the raw kernel notification plus the absolute path
/// of the directory that contained the affected entry.
///
/// `mask` stays a raw bitset rather than an enum because the kernel combines
/// flags freely in one event (`ISDIR|CREATE` and friends); the predicates
/// below cover the combinations the daemon cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub wd: i32,
    pub mask: u32,
    pub cookie: u32,
    /// Entry name, relative to `path`.
    pub name: String,
    /// Absolute path of the directory containing `name`.
    pub path: String,
}

impl Event {
    fn has(&self, flag: EventMask) -> bool {
        EventMask::from_bits_retain(self.mask).contains(flag)
    }

    pub fn is_dir(&self) -> bool {
        self.has(EventMask::ISDIR)
    }

    pub fn is_create(&self) -> bool {
        self.has(EventMask::CREATE)
    }

    pub fn is_delete(&self) -> bool {
        self.has(EventMask::DELETE)
    }

    pub fn is_moved_from(&self) -> bool {
        self.has(EventMask::MOVED_FROM)
    }

    pub fn is_moved_to(&self) -> bool {
        self.has(EventMask::MOVED_TO)
    }

    pub fn is_close_write(&self) -> bool {
        self.has(EventMask::CLOSE_WRITE)
    }

    pub fn is_attrib(&self) -> bool {
        self.has(EventMask::ATTRIB)
    }

    /// Absolute path of the affected entry itself.
    pub fn absolute_path(&self) -> String {
        join_path(&self.path, &self.name)
    }
}

/// Join a watched directory and an entry name into an absolute path.
/// The root directory is special-cased so `/` + `foo` is `/foo`.
pub fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_path_root_has_no_double_slash() {
        assert_eq!(join_path("/", "etc"), "/etc");
        assert_eq!(join_path("/tmp/t", "a.txt"), "/tmp/t/a.txt");
    }

    #[test]
    fn predicates_follow_mask_bits() {
        let ev = Event {
            wd: 1,
            mask: (EventMask::ISDIR | EventMask::CREATE).bits(),
            cookie: 0,
            name: "sub".into(),
            path: "/tmp/t".into(),
        };
        assert!(ev.is_dir());
        assert!(ev.is_create());
        assert!(!ev.is_delete());
        assert_eq!(ev.absolute_path(), "/tmp/t/sub");
    }
}
