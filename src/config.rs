//! Daemon configuration.
//!
//! A single JSON file, every field optional. The daemon is designed to run
//! with the config file missing or broken: defaults cover everything, and a
//! parse failure only costs a warning. Housekeeping re-reads the file when
//! its modification time advances.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Deserialize;

/// Default location probed when `-c/--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "/etc/fswatchd.conf";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Control-socket port on 127.0.0.1.
    pub port: u16,
    /// Log file; stderr when unset.
    pub log_file: Option<PathBuf>,
    /// One of `trace`, `debug`, `notice`, `warn`, `error`.
    pub log_level: String,
    /// Per-root queue bound applied when a watch request passes 0.
    pub max_events: usize,
    /// Where the rewatch-eligible root set is persisted across restarts.
    pub persist_file: PathBuf,
    /// Suppress the startup banner on stderr.
    pub silent: bool,
    /// Seconds between memclean passes over the watch index.
    pub memclean_interval_secs: u64,
    /// Seconds between rewatch sweeps over the active roots.
    pub rewatch_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5559,
            log_file: None,
            log_level: "notice".to_string(),
            max_events: 65536,
            persist_file: PathBuf::from("/var/lib/fswatchd/roots"),
            silent: false,
            memclean_interval_secs: 30,
            rewatch_interval_secs: 60,
        }
    }
}

impl Config {
    /// Read the config file, falling back to defaults on any problem.
    /// Warnings go to stderr because this runs before the logger is up.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Config>(&contents) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!(
                        "WARNING: config file '{}' is invalid ({e}); using defaults",
                        path.display()
                    );
                    Config::default()
                }
            },
            Err(e) => {
                eprintln!(
                    "WARNING: failed to read config file '{}' ({e}); using defaults",
                    path.display()
                );
                Config::default()
            }
        }
    }

    /// Modification time of the config file, if it exists. Used by
    /// housekeeping to decide whether a reload is due.
    pub fn mtime(path: &Path) -> Option<SystemTime> {
        fs::metadata(path).and_then(|m| m.modified()).ok()
    }

    /// Translate the configured level into a `tracing` filter directive.
    /// `notice` is the historical name for what tracing calls `info`.
    pub fn filter_directive(&self) -> &'static str {
        match self.log_level.as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "notice" | "info" => "info",
            "warn" => "warn",
            "error" => "error",
            other => {
                eprintln!("WARNING: unknown log_level '{other}'; using 'info'");
                "info"
            }
        }
    }

    /// Startup banner listing the effective values, printed to stderr unless
    /// silent mode is on.
    pub fn print_banner(&self) {
        eprintln!("Using configuration values:");
        eprintln!(" - port              : {}", self.port);
        eprintln!(
            " - log_file          : {}",
            self.log_file
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(stderr)".to_string())
        );
        eprintln!(" - log_level         : {}", self.log_level);
        eprintln!(" - max_events        : {}", self.max_events);
        eprintln!(" - persist_file      : {}", self.persist_file.display());
        eprintln!(" - memclean interval : {}s", self.memclean_interval_secs);
        eprintln!(" - rewatch interval  : {}s", self.rewatch_interval_secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.port, 5559);
        assert_eq!(config.max_events, 65536);
        assert_eq!(config.log_level, "notice");
        assert!(!config.silent);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope.conf"));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.conf");
        fs::write(&path, "{not json").unwrap();
        assert_eq!(Config::load(&path), Config::default());
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fswatchd.conf");
        let mut f = fs::File::create(&path).unwrap();
        write!(f, r#"{{"port": 7001, "log_level": "debug"}}"#).unwrap();

        let config = Config::load(&path);
        assert_eq!(config.port, 7001);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.max_events, Config::default().max_events);
    }

    #[test]
    fn notice_maps_to_info() {
        let mut config = Config::default();
        assert_eq!(config.filter_directive(), "info");
        config.log_level = "trace".into();
        assert_eq!(config.filter_directive(), "trace");
    }
}
