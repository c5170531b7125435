//! Installs the process-wide `tracing` subscriber.
//!
//! Directives come from `RUST_LOG` (falling back to [`LayerConfig::default_directive`]
//! when unset), matching the env-filter convention every reth-style binary
//! uses. `coordinator-node` calls [`init`] exactly once, at the top of
//! `main`, before constructing any other component.

#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Human-readable, single-line output vs. newline-delimited JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Compact, human-readable lines. The default for local development.
    #[default]
    Compact,
    /// One JSON object per line, for log aggregation in production.
    Json,
}

/// Where log output is written.
#[derive(Debug, Clone, Default)]
pub enum LogTarget {
    /// Standard error (the default).
    #[default]
    Stderr,
    /// A rotating file under the given directory.
    Directory(PathBuf),
}

/// Subscriber installation options.
#[derive(Debug, Clone)]
pub struct LayerConfig {
    /// Compact or JSON output.
    pub format: LogFormat,
    /// Directive used when `RUST_LOG` is unset.
    pub default_directive: String,
    /// Where to write output.
    pub target: LogTarget,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self { format: LogFormat::default(), default_directive: "coordinator=info,warn".to_owned(), target: LogTarget::default() }
    }
}

/// A handle that must be kept alive for the lifetime of the process when
/// logging to a file; dropping it stops the background flush worker.
#[derive(Debug)]
#[must_use = "dropping this guard stops file logging"]
pub struct TracingGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Installs the global subscriber described by `config`. Must be called
/// exactly once; a second call panics, matching `tracing`'s own contract for
/// `set_global_default`.
pub fn init(config: &LayerConfig) -> TracingGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_directive));

    let (writer, file_guard) = match &config.target {
        LogTarget::Stderr => (tracing_appender::non_blocking(std::io::stderr()).0, None),
        LogTarget::Directory(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "coordinator.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (writer, Some(guard))
        }
    };

    let fmt_layer = match config.format {
        LogFormat::Compact => tracing_subscriber::fmt::layer().with_writer(writer).boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().json().with_writer(writer).boxed(),
    };

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
    TracingGuard { _file_guard: file_guard }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layer_config_uses_compact_stderr_output() {
        let config = LayerConfig::default();
        assert_eq!(config.format, LogFormat::Compact);
        assert!(matches!(config.target, LogTarget::Stderr));
        assert_eq!(config.default_directive, "coordinator=info,warn");
    }
}
