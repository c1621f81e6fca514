//! Recursive tree installer.
//!
//! Walks a directory tree and puts every directory in it under kernel watch,
//! wiring each one into the watch index. Runs on background workers; the
//! walk re-checks the owning root's destroy flag between recursion levels so
//! an unwatch aborts it promptly.
//!
//! The same walker implements the rewatch sweep: in sweep mode it leaves
//! already-indexed directories alone and only repairs the ones the index
//! lost track of (missed creation races, kernel hiccups).

use std::fs;
use std::sync::Arc;

use inotify::Watches;
use tracing::{debug, info, trace, warn};

use crate::event::join_path;
use crate::index::WatchIndex;
use crate::kernel;
use crate::registry::Root;

/// Tool-generated scratch directories churn too fast to be worth watching;
/// they are always removed moments after they appear.
pub const TRANSIENT_DIR_SUFFIX: &str = ".~tmp~";

/// Recursively install watches for `root`'s tree starting at `start`.
/// With `sweep` set, only directories missing from the index are added.
/// Returns the number of watches installed.
pub fn install_tree(
    watches: &mut Watches,
    index: &WatchIndex,
    root: &Arc<Root>,
    start: &str,
    sweep: bool,
) -> usize {
    let mut installed = 0;
    walk(watches, index, root, start, sweep, &mut installed);
    if sweep && installed > 0 {
        info!(
            root = %root.path,
            start,
            repaired = installed,
            "rewatch sweep repaired orphan directories"
        );
    }
    installed
}

fn walk(
    watches: &mut Watches,
    index: &WatchIndex,
    root: &Arc<Root>,
    path: &str,
    sweep: bool,
    installed: &mut usize,
) {
    if root.is_destroying() {
        trace!(root = %root.path, "root is being destroyed, aborting tree walk");
        return;
    }
    if path.ends_with(TRANSIENT_DIR_SUFFIX) {
        return;
    }

    // Open first: a directory that vanished between discovery and descent is
    // routine, not an error worth surfacing.
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(path, "failed to open directory during tree walk: {e}");
            return;
        }
    };

    if sweep && index.lookup_by_path(path).is_some() {
        // Already watched; nothing to repair here, but children may still
        // have gaps.
    } else {
        let wd = match kernel::add_watch(watches, path, root.mask) {
            Ok(wd) => wd,
            Err(e) => {
                // NotFound, PermissionDenied, or the kernel watch limit.
                // All are skip-and-continue; none abort the root.
                warn!(path, "failed to set up kernel watch: {e}");
                return;
            }
        };
        if index.contains_wd(&wd) {
            // Another installer won the race for this directory (rapid
            // creation spawns overlapping walks). Its walk covers the rest.
            return;
        }
        index.insert(wd, path);
        *installed += 1;
    }

    for entry in entries.flatten() {
        if root.is_destroying() {
            return;
        }
        // file_type() does not follow symlinks, and falls back to lstat on
        // filesystems that do not fill in the entry type.
        let is_dir = entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false);
        if !is_dir {
            continue;
        }
        let child = join_path(path, &entry.file_name().to_string_lossy());
        walk(watches, index, root, &child, sweep, installed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::KernelWatcher;
    use crate::registry::RootRegistry;
    use std::os::unix::fs::symlink;
    use tempfile::tempdir;

    fn setup(base: &std::path::Path) -> (KernelWatcher, WatchIndex, Arc<Root>) {
        let kernel = KernelWatcher::init().unwrap();
        let index = WatchIndex::new();
        let registry = RootRegistry::new();
        let root = registry
            .add(base.to_str().unwrap(), kernel::default_mask(), 100, false)
            .unwrap();
        (kernel, index, root)
    }

    #[test]
    fn walks_nested_directories() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
        fs::write(dir.path().join("a/file.txt"), b"x").unwrap();

        let (kernel, index, root) = setup(dir.path());
        let installed = install_tree(&mut kernel.watches(), &index, &root, &root.path, false);

        assert_eq!(installed, 4); // root, a, a/b, a/b/c
        assert!(index.lookup_by_path(&root.path).is_some());
        assert!(index
            .lookup_by_path(&format!("{}/a/b/c", root.path))
            .is_some());
    }

    #[test]
    fn skips_symlinks_and_transient_directories() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("real")).unwrap();
        fs::create_dir(dir.path().join("scratch.~tmp~")).unwrap();
        symlink(dir.path().join("real"), dir.path().join("link")).unwrap();

        let (kernel, index, root) = setup(dir.path());
        install_tree(&mut kernel.watches(), &index, &root, &root.path, false);

        assert!(index.lookup_by_path(&format!("{}/real", root.path)).is_some());
        assert!(index.lookup_by_path(&format!("{}/link", root.path)).is_none());
        assert!(index
            .lookup_by_path(&format!("{}/scratch.~tmp~", root.path))
            .is_none());
    }

    #[test]
    fn sweep_only_counts_missing_directories() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();

        let (kernel, index, root) = setup(dir.path());
        let mut watches = kernel.watches();
        assert_eq!(install_tree(&mut watches, &index, &root, &root.path, false), 3);

        // Nothing missing: sweep repairs nothing.
        assert_eq!(install_tree(&mut watches, &index, &root, &root.path, true), 0);

        // Lose one entry; sweep restores exactly it.
        let lost = format!("{}/a/b", root.path);
        index.remove_by_path(&lost).unwrap();
        assert_eq!(install_tree(&mut watches, &index, &root, &root.path, true), 1);
        assert!(index.lookup_by_path(&lost).is_some());
    }

    #[test]
    fn aborts_when_root_is_destroyed() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();

        let kernel = KernelWatcher::init().unwrap();
        let index = WatchIndex::new();
        let registry = RootRegistry::new();
        let root = registry
            .add(dir.path().to_str().unwrap(), 1, 100, false)
            .unwrap();
        registry.begin_destroy(&root.path).unwrap();

        let installed = install_tree(&mut kernel.watches(), &index, &root, &root.path, false);
        assert_eq!(installed, 0);
        assert!(index.is_empty());
    }
}
