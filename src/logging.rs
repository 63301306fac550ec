// SPDX-License-Identifier: GPL-3.0-only

//! Tracing setup: console plus a per-run log file

use crate::constants::LOG_FILE_NAME;
use std::fs::File;
use std::path::Path;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "camera_server=info,warn";

fn env_filter() -> EnvFilter {
    // Set RUST_LOG to override, e.g. RUST_LOG=camera_server=debug
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Console-only subscriber for the window before the log file may be opened
///
/// Install it with [`tracing::subscriber::with_default`].
pub fn console_subscriber() -> impl Subscriber + Send + Sync {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(true).with_level(true))
}

/// Install the global subscriber
///
/// With `logs_dir`, events are also written to `<logs_dir>/camera_server.log`,
/// which is truncated first. Only call this while holding the singleton
/// lock, since the file may belong to a running instance. Keep the returned
/// guard alive until exit or buffered lines are lost.
pub fn init(logs_dir: Option<&Path>) -> std::io::Result<Option<WorkerGuard>> {
    let filter = env_filter();
    let console_layer = fmt::layer().with_target(true).with_level(true);

    let (file_layer, guard) = match logs_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file = File::create(dir.join(LOG_FILE_NAME))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    // A subscriber may already be installed (tests, embedding); keep it
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    Ok(guard)
}
