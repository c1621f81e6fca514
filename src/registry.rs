//! The root registry: one entry per user-declared watched tree.
//!
//! Roots are handed out as `Arc`s so the event pump can keep observing the
//! `pause`/`destroy` flags of a root that is concurrently being torn down.
//! The registry mutex serializes membership changes and flag writes; each
//! root's queue has its own lock so enqueue/dequeue never hold the registry.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::error::ClientError;
use crate::event::Event;

/// Metadata for the root of one watched tree.
#[derive(Debug)]
pub struct Root {
    pub path: String,
    /// Raw event mask; delivery is gated on intersection with this.
    pub mask: u32,
    /// Queue bound. Events past this are dropped, loudly.
    pub max_events: usize,
    /// Whether this root is written to the restart file.
    pub rewatch: bool,
    queue: Mutex<VecDeque<Event>>,
    pause: AtomicBool,
    destroy: AtomicBool,
}

impl Root {
    fn new(path: String, mask: u32, max_events: usize, rewatch: bool) -> Self {
        Self {
            path,
            mask,
            max_events,
            rewatch,
            queue: Mutex::new(VecDeque::new()),
            pause: AtomicBool::new(false),
            destroy: AtomicBool::new(false),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.pause.load(Ordering::Relaxed)
    }

    /// Once set this never clears; the root is unreachable for new work and
    /// a background teardown owns the rest of its lifetime.
    pub fn is_destroying(&self) -> bool {
        self.destroy.load(Ordering::Relaxed)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Append an event, unless the queue is at its bound.
    pub fn enqueue(&self, event: Event) -> Result<(), ClientError> {
        let mut queue = self.queue.lock();
        if queue.len() >= self.max_events {
            warn!(
                root = %self.path,
                max_events = self.max_events,
                "Queue full. Dropping event!"
            );
            return Err(ClientError::QueueFull);
        }
        trace!(
            root = %self.path,
            path = %event.path,
            name = %event.name,
            "queuing event"
        );
        queue.push_back(event);
        Ok(())
    }

    /// Pop up to `count` events from the head, oldest first. A count of zero
    /// means the whole queue.
    pub fn dequeue(&self, count: usize) -> Vec<Event> {
        let mut queue = self.queue.lock();
        let take = if count == 0 || count > queue.len() {
            queue.len()
        } else {
            count
        };
        queue.drain(..take).collect()
    }

    pub fn clear_queue(&self) {
        self.queue.lock().clear();
    }
}

/// True when `path` equals `ancestor` or lies somewhere beneath it.
/// The filesystem root is an ancestor of everything.
fn is_tree_prefix(ancestor: &str, path: &str) -> bool {
    if ancestor == path {
        return true;
    }
    if ancestor == "/" {
        return path.starts_with('/');
    }
    path.starts_with(ancestor) && path.as_bytes().get(ancestor.len()) == Some(&b'/')
}

/// Reject a root request that collides with the current root set: equal to
/// an existing root (live or mid-destruction), inside one, or above one.
fn validate_against(
    roots: &HashMap<String, Arc<Root>>,
    path: &str,
) -> Result<(), ClientError> {
    if let Some(existing) = roots.get(path) {
        return Err(if existing.is_destroying() {
            ClientError::BeingDestroyed
        } else {
            ClientError::AlreadyWatched
        });
    }
    for existing in roots.keys() {
        if is_tree_prefix(existing, path) {
            warn!(path, root = %existing, "requested root is inside a watched tree");
            return Err(ClientError::ChildOfRoot);
        }
        if is_tree_prefix(path, existing) {
            warn!(path, root = %existing, "requested root is the parent of a watched tree");
            return Err(ClientError::ParentOfRoot);
        }
    }
    Ok(())
}

/// Strip trailing slashes, keeping a lone `/` intact.
pub fn normalize_path(path: &str) -> String {
    if path.len() > 1 {
        path.trim_end_matches('/').to_string()
    } else {
        path.to_string()
    }
}

/// All currently declared roots, keyed by normalized absolute path.
#[derive(Default)]
pub struct RootRegistry {
    roots: Mutex<HashMap<String, Arc<Root>>>,
}

impl RootRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and record a new root. The path must already be normalized.
    /// Does not install any watches; the caller dispatches the tree walk.
    pub fn add(
        &self,
        path: &str,
        mask: u32,
        max_events: usize,
        rewatch: bool,
    ) -> Result<Arc<Root>, ClientError> {
        if !path.starts_with('/') {
            return Err(ClientError::NotAbsolutePath);
        }

        {
            let roots = self.roots.lock();
            validate_against(&roots, path)?;
        }

        // Probe the directory with the lock released; opendir must not run
        // under it. The root set can change during the probe, so the checks
        // run again below.
        if fs::read_dir(path).is_err() {
            warn!(path, "cannot open directory for new root");
            return Err(ClientError::DoesNotExist);
        }

        let mut roots = self.roots.lock();
        validate_against(&roots, path)?;

        let root = Arc::new(Root::new(path.to_string(), mask, max_events, rewatch));
        roots.insert(path.to_string(), Arc::clone(&root));
        Ok(root)
    }

    /// First phase of unwatch: flag the root so the pump stops feeding it.
    /// The entry stays in the registry until teardown removes it.
    pub fn begin_destroy(&self, path: &str) -> Result<Arc<Root>, ClientError> {
        let roots = self.roots.lock();
        let root = roots.get(path).ok_or(ClientError::NotWatched)?;
        if root.destroy.swap(true, Ordering::Relaxed) {
            return Err(ClientError::BeingDestroyed);
        }
        Ok(Arc::clone(root))
    }

    /// Final phase of unwatch, called by the teardown worker.
    pub fn remove(&self, path: &str) {
        self.roots.lock().remove(path);
        debug!(path, "root removed");
    }

    pub fn set_paused(&self, path: &str, paused: bool) -> Result<Arc<Root>, ClientError> {
        let roots = self.roots.lock();
        let root = roots.get(path).ok_or(ClientError::NotWatched)?;
        root.pause.store(paused, Ordering::Relaxed);
        Ok(Arc::clone(root))
    }

    pub fn get(&self, path: &str) -> Option<Arc<Root>> {
        self.roots.lock().get(path).cloned()
    }

    /// The unique root whose tree contains `path`, if any. Recomputed by
    /// prefix search; watches hold no back-reference to their root.
    pub fn find_root_for(&self, path: &str) -> Option<Arc<Root>> {
        let roots = self.roots.lock();
        roots
            .iter()
            .find(|(root_path, _)| is_tree_prefix(root_path, path))
            .map(|(_, root)| Arc::clone(root))
    }

    /// Snapshot of the current root set.
    pub fn roots(&self) -> Vec<Arc<Root>> {
        self.roots.lock().values().cloned().collect()
    }

    pub fn paths(&self) -> Vec<String> {
        self.roots.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.roots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn event(name: &str, path: &str) -> Event {
        Event {
            wd: 1,
            mask: 256,
            cookie: 0,
            name: name.into(),
            path: path.into(),
        }
    }

    #[test]
    fn normalize_strips_trailing_slashes() {
        assert_eq!(normalize_path("/tmp/t/"), "/tmp/t");
        assert_eq!(normalize_path("/tmp/t//"), "/tmp/t");
        assert_eq!(normalize_path("/tmp/t"), "/tmp/t");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn tree_prefix_matches_whole_components_only() {
        assert!(is_tree_prefix("/data", "/data"));
        assert!(is_tree_prefix("/data", "/data/sub"));
        assert!(!is_tree_prefix("/data", "/database"));
        assert!(is_tree_prefix("/", "/anything"));
    }

    #[test]
    fn add_rejects_relative_and_missing_paths() {
        let registry = RootRegistry::new();
        assert_eq!(
            registry.add("tmp/t", 1, 10, false).unwrap_err(),
            ClientError::NotAbsolutePath
        );
        assert_eq!(
            registry
                .add("/nonexistent/fswatchd-test", 1, 10, false)
                .unwrap_err(),
            ClientError::DoesNotExist
        );
    }

    #[test]
    fn add_rejects_overlapping_roots() {
        let dir = tempdir().unwrap();
        let base = dir.path().to_str().unwrap().to_string();
        let sub = format!("{base}/sub");
        fs::create_dir(&sub).unwrap();

        let registry = RootRegistry::new();
        registry.add(&base, 1, 10, false).unwrap();

        assert_eq!(
            registry.add(&base, 1, 10, false).unwrap_err(),
            ClientError::AlreadyWatched
        );
        assert_eq!(
            registry.add(&sub, 1, 10, false).unwrap_err(),
            ClientError::ChildOfRoot
        );

        let registry = RootRegistry::new();
        registry.add(&sub, 1, 10, false).unwrap();
        assert_eq!(
            registry.add(&base, 1, 10, false).unwrap_err(),
            ClientError::ParentOfRoot
        );
    }

    #[test]
    fn destroy_is_two_phase_and_monotonic() {
        let dir = tempdir().unwrap();
        let base = dir.path().to_str().unwrap().to_string();
        let registry = RootRegistry::new();
        registry.add(&base, 1, 10, false).unwrap();

        let root = registry.begin_destroy(&base).unwrap();
        assert!(root.is_destroying());
        // Still reachable until teardown removes it.
        assert!(registry.get(&base).is_some());
        assert_eq!(
            registry.begin_destroy(&base).unwrap_err(),
            ClientError::BeingDestroyed
        );
        assert_eq!(
            registry.add(&base, 1, 10, false).unwrap_err(),
            ClientError::BeingDestroyed
        );

        registry.remove(&base);
        assert!(registry.get(&base).is_none());
        assert_eq!(
            registry.begin_destroy(&base).unwrap_err(),
            ClientError::NotWatched
        );
    }

    #[test]
    fn queue_respects_bound_and_order() {
        let dir = tempdir().unwrap();
        let base = dir.path().to_str().unwrap().to_string();
        let registry = RootRegistry::new();
        let root = registry.add(&base, 1, 2, false).unwrap();

        root.enqueue(event("a", &base)).unwrap();
        root.enqueue(event("b", &base)).unwrap();
        assert_eq!(
            root.enqueue(event("c", &base)).unwrap_err(),
            ClientError::QueueFull
        );
        assert_eq!(root.queue_len(), 2);

        let first = root.dequeue(1);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].name, "a");

        // Zero means drain everything.
        let rest = root.dequeue(0);
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].name, "b");
        assert_eq!(root.queue_len(), 0);

        // Empty queue is not an error.
        assert!(root.dequeue(0).is_empty());
    }

    #[test]
    fn find_root_for_uses_prefix_search() {
        let dir = tempdir().unwrap();
        let base = dir.path().to_str().unwrap().to_string();
        let registry = RootRegistry::new();
        registry.add(&base, 1, 10, false).unwrap();

        let inner = format!("{base}/a/b");
        assert_eq!(registry.find_root_for(&inner).unwrap().path, base);
        assert_eq!(registry.find_root_for(&base).unwrap().path, base);
        assert!(registry.find_root_for("/elsewhere").is_none());
    }

    #[test]
    fn pause_flag_flips() {
        let dir = tempdir().unwrap();
        let base = dir.path().to_str().unwrap().to_string();
        let registry = RootRegistry::new();
        registry.add(&base, 1, 10, false).unwrap();

        assert!(!registry.get(&base).unwrap().is_paused());
        registry.set_paused(&base, true).unwrap();
        assert!(registry.get(&base).unwrap().is_paused());
        registry.set_paused(&base, false).unwrap();
        assert!(!registry.get(&base).unwrap().is_paused());
        assert_eq!(
            registry.set_paused("/none", true).unwrap_err(),
            ClientError::NotWatched
        );
    }
}
