//! Restart persistence for the root set.
//!
//! One plain-text line per rewatch-eligible root: `path,mask,max_events`.
//! The file is rewritten on every registry mutation and on shutdown, and
//! read back at startup to restore watches. Writes go through a temp file
//! and rename so a crash never leaves a half-written set.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::registry::RootRegistry;

/// A root as read back from the persistence file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedRoot {
    pub path: String,
    pub mask: u32,
    pub max_events: usize,
}

pub struct Persist {
    path: PathBuf,
}

impl Persist {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current rewatch set. Roots mid-destruction are excluded;
    /// they will not exist after the teardown finishes.
    pub fn save(&self, registry: &RootRegistry) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut contents = String::new();
        for root in registry.roots() {
            if root.rewatch && !root.is_destroying() {
                contents.push_str(&format!(
                    "{},{},{}\n",
                    root.path, root.mask, root.max_events
                ));
            }
        }

        let temp = self.path.with_extension("tmp");
        let mut file = fs::File::create(&temp)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        fs::rename(&temp, &self.path)?;

        debug!(file = %self.path.display(), "persisted root set");
        Ok(())
    }

    /// Read the persisted set back. A missing file is a fresh install, not
    /// an error. Corrupt lines are skipped with a warning.
    pub fn load(&self) -> Vec<PersistedRoot> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(file = %self.path.display(), "failed to read persisted roots: {e}");
                return Vec::new();
            }
        };

        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match parse_line(line) {
                Some(root) => Some(root),
                None => {
                    warn!(line, "skipping corrupt persisted-root line");
                    None
                }
            })
            .collect()
    }
}

fn parse_line(line: &str) -> Option<PersistedRoot> {
    let mut fields = line.split(',');
    let path = fields.next()?.to_string();
    let mask = fields.next()?.parse().ok()?;
    let max_events = fields.next()?.parse().ok()?;
    if fields.next().is_some() || path.is_empty() {
        return None;
    }
    Some(PersistedRoot {
        path,
        mask,
        max_events,
    })
}
