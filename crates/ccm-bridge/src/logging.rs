//! Tracing setup.
//!
//! The worker's stderr is the sentinel channel, so log lines go to a file or
//! nowhere.

use std::fs::OpenOptions;
use std::io;
use std::sync::Mutex;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogConfig, LogFormat};

/// Filter directives for a config: explicit directives win, otherwise the
/// base level applies to this crate only.
pub fn filter_directives(config: &LogConfig) -> String {
    match &config.directives {
        Some(directives) => directives.clone(),
        None => format!("ccm_bridge={}", config.level),
    }
}

/// Install the global subscriber. Returns `false` when logging is disabled.
///
/// Must run after descriptor cleanup, since it opens the log file.
pub fn init_tracing(config: &LogConfig) -> io::Result<bool> {
    let Some(path) = &config.file else {
        return Ok(false);
    };

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let writer = Mutex::new(file);
    let filter = EnvFilter::new(filter_directives(config));

    match config.format {
        LogFormat::Json => {
            let subscriber = tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(writer));
            let _ = subscriber.try_init();
        }
        LogFormat::Text => {
            let subscriber = tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_ansi(false).with_writer(writer));
            let _ = subscriber.try_init();
        }
    }

    Ok(true)
}
