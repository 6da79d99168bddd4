//! Structured logging setup.
//!
//! The library itself only emits `tracing` events; binaries embedding it call
//! [`init_logging`] once at startup to install a subscriber.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::LoggingConfig;
use crate::error::{ProtocolError, Result};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install a global subscriber built from `config`.
///
/// `RUST_LOG` overrides the configured level. Calling this again after a
/// subscriber is installed leaves the first one in place and returns `Ok`.
///
/// # Errors
/// Returns `ProtocolError::ConfigError` if the log file cannot be opened.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(config.log_level).into())
        .from_env_lossy();

    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.log_to_console {
        layers.push(console_layer(config.json_format));
    }

    if config.log_to_file {
        let path = config.log_file_path.as_deref().ok_or_else(|| {
            ProtocolError::ConfigError("log_file_path must be set to log to a file".into())
        })?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open log file: {e}")))?;
        layers.push(file_layer(file, config.json_format));
    }

    layers.push(Box::new(filter));

    match Registry::default().with(layers).try_init() {
        Ok(()) => {
            tracing::info!(
                app = %config.app_name,
                level = %config.log_level,
                "Logging initialized"
            );
        }
        Err(_) => {
            tracing::debug!("Global subscriber already installed, keeping it");
        }
    }

    Ok(())
}

fn console_layer(json: bool) -> BoxedLayer {
    if json {
        Box::new(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_current_span(true),
        )
    } else {
        Box::new(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
    }
}

fn file_layer(file: std::fs::File, json: bool) -> BoxedLayer {
    let writer = Mutex::new(file);
    if json {
        Box::new(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_current_span(true),
        )
    } else {
        Box::new(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        )
    }
}
