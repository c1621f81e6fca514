//! The watch index: a bidirectional map between kernel watch descriptors and
//! the absolute directory paths they cover.
//!
//! inotify only reports a descriptor and an entry name; reconstructing the
//! absolute path of an event requires the wd-to-path direction, and tearing
//! watches down by path requires the reverse. Both directions live under one
//! mutex and are updated together so they stay mutual inverses.
//!
//! Holders of the lock must not perform blocking I/O; callers snapshot what
//! they need, release, and re-validate after reacquiring.

use std::collections::HashMap;
use std::sync::Arc;

use inotify::WatchDescriptor;
use parking_lot::Mutex;

use crate::kernel;

/// One kernel-level watch on a single directory.
#[derive(Debug)]
pub struct Watch {
    pub wd: WatchDescriptor,
    pub path: String,
}

impl Watch {
    pub fn id(&self) -> i32 {
        kernel::wd_id(&self.wd)
    }
}

#[derive(Default)]
struct Maps {
    by_wd: HashMap<WatchDescriptor, Arc<Watch>>,
    by_path: HashMap<String, Arc<Watch>>,
}

/// Bidirectional `wd ↔ path` index.
#[derive(Default)]
pub struct WatchIndex {
    maps: Mutex<Maps>,
}

impl WatchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a watch, replacing any prior entry under either key. Both
    /// directions (and the mirrors of any displaced entries) are updated
    /// under the same lock acquisition.
    pub fn insert(&self, wd: WatchDescriptor, path: &str) -> Arc<Watch> {
        let watch = Arc::new(Watch {
            wd: wd.clone(),
            path: path.to_string(),
        });
        let mut maps = self.maps.lock();
        if let Some(old) = maps.by_wd.insert(wd, Arc::clone(&watch)) {
            maps.by_path.remove(&old.path);
        }
        if let Some(old) = maps.by_path.insert(path.to_string(), Arc::clone(&watch)) {
            maps.by_wd.remove(&old.wd);
        }
        watch
    }

    pub fn contains_wd(&self, wd: &WatchDescriptor) -> bool {
        self.maps.lock().by_wd.contains_key(wd)
    }

    pub fn lookup_by_wd(&self, wd: &WatchDescriptor) -> Option<Arc<Watch>> {
        self.maps.lock().by_wd.get(wd).cloned()
    }

    pub fn lookup_by_path(&self, path: &str) -> Option<Arc<Watch>> {
        self.maps.lock().by_path.get(path).cloned()
    }

    pub fn remove_by_wd(&self, wd: &WatchDescriptor) -> Option<Arc<Watch>> {
        let mut maps = self.maps.lock();
        let watch = maps.by_wd.remove(wd)?;
        maps.by_path.remove(&watch.path);
        Some(watch)
    }

    pub fn remove_by_path(&self, path: &str) -> Option<Arc<Watch>> {
        let mut maps = self.maps.lock();
        let watch = maps.by_path.remove(path)?;
        maps.by_wd.remove(&watch.wd);
        Some(watch)
    }

    /// All indexed paths strictly inside `prefix` (i.e. beginning with
    /// `prefix + "/"`). Used for subtree teardown after unwatch or move-out.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let needle = if prefix == "/" {
            "/".to_string()
        } else {
            format!("{prefix}/")
        };
        self.maps
            .lock()
            .by_path
            .keys()
            .filter(|p| p.as_str() != prefix && p.starts_with(&needle))
            .cloned()
            .collect()
    }

    /// Snapshot of every indexed path.
    pub fn paths(&self) -> Vec<String> {
        self.maps.lock().by_path.keys().cloned().collect()
    }

    /// Number of watched directories.
    pub fn len(&self) -> usize {
        self.maps.lock().by_wd.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inotify::{Inotify, WatchMask};
    use tempfile::tempdir;

    // Real descriptors from a scratch inotify instance; WatchDescriptor has
    // no public constructor.
    fn descriptors(n: usize) -> (Inotify, Vec<WatchDescriptor>, tempfile::TempDir) {
        let inotify = Inotify::init().unwrap();
        let dir = tempdir().unwrap();
        let mut wds = Vec::new();
        for i in 0..n {
            let sub = dir.path().join(format!("d{i}"));
            std::fs::create_dir(&sub).unwrap();
            wds.push(inotify.watches().add(&sub, WatchMask::CREATE).unwrap());
        }
        (inotify, wds, dir)
    }

    #[test]
    fn insert_and_lookup_both_directions() {
        let (_ino, wds, _dir) = descriptors(1);
        let index = WatchIndex::new();
        index.insert(wds[0].clone(), "/a/b");

        let by_wd = index.lookup_by_wd(&wds[0]).unwrap();
        assert_eq!(by_wd.path, "/a/b");
        let by_path = index.lookup_by_path("/a/b").unwrap();
        assert_eq!(by_path.wd, wds[0]);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn remove_clears_the_mirror() {
        let (_ino, wds, _dir) = descriptors(2);
        let index = WatchIndex::new();
        index.insert(wds[0].clone(), "/a");
        index.insert(wds[1].clone(), "/b");

        index.remove_by_wd(&wds[0]).unwrap();
        assert!(index.lookup_by_path("/a").is_none());

        index.remove_by_path("/b").unwrap();
        assert!(index.lookup_by_wd(&wds[1]).is_none());
        assert!(index.is_empty());
    }

    #[test]
    fn reinsert_same_path_displaces_old_entry() {
        let (_ino, wds, _dir) = descriptors(2);
        let index = WatchIndex::new();
        index.insert(wds[0].clone(), "/a");
        index.insert(wds[1].clone(), "/a");

        assert_eq!(index.len(), 1);
        assert_eq!(index.lookup_by_path("/a").unwrap().wd, wds[1]);
        assert!(index.lookup_by_wd(&wds[0]).is_none());
    }

    #[test]
    fn prefix_keys_exclude_the_prefix_itself_and_siblings() {
        let (_ino, wds, _dir) = descriptors(4);
        let index = WatchIndex::new();
        index.insert(wds[0].clone(), "/data");
        index.insert(wds[1].clone(), "/data/sub");
        index.insert(wds[2].clone(), "/data/sub/deep");
        index.insert(wds[3].clone(), "/database");

        let mut keys = index.keys_with_prefix("/data");
        keys.sort();
        assert_eq!(keys, vec!["/data/sub", "/data/sub/deep"]);
    }

    #[test]
    fn prefix_keys_under_filesystem_root() {
        let (_ino, wds, _dir) = descriptors(2);
        let index = WatchIndex::new();
        index.insert(wds[0].clone(), "/");
        index.insert(wds[1].clone(), "/etc");

        assert_eq!(index.keys_with_prefix("/"), vec!["/etc"]);
    }
}
