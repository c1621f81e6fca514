//! Log setup.
//!
//! `tracing` with an env-filter: level comes from the config file, `RUST_LOG`
//! wins when set. Output goes to stderr or, when configured, an append-only
//! log file. The filter can be swapped at runtime when housekeeping reloads
//! the config.

use std::fs::OpenOptions;
use std::io;
use std::sync::Arc;

use tracing::warn;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, Registry};

use crate::config::Config;

/// Handle for changing the log level after startup.
#[derive(Clone)]
pub struct LogHandle {
    handle: reload::Handle<EnvFilter, Registry>,
}

impl LogHandle {
    pub fn set_level(&self, directive: &str) {
        if let Err(e) = self.handle.reload(EnvFilter::new(directive)) {
            warn!("failed to update log level: {e}");
        }
    }
}

/// Install the global subscriber. Called once at startup.
pub fn init(config: &Config) -> io::Result<LogHandle> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directive()));
    let (filter, handle) = reload::Layer::new(filter);
    let base = tracing_subscriber::registry().with(filter);

    match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            base.with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
            .init();
        }
        None => {
            base.with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
                .init();
        }
    }

    Ok(LogHandle { handle })
}
