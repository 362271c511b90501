//! Structured logging setup.
//!
//! Installs `tracing-subscriber` fmt layers according to [`LoggingConfig`]:
//! one for the console, one for the log file, or both. `RUST_LOG` takes
//! precedence over the configured level when set.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;
use crate::error::{ProtocolError, Result};

type Base = Layered<EnvFilter, Registry>;
type OutputLayer = Box<dyn Layer<Base> + Send + Sync>;

/// Build the filter: `RUST_LOG` if present, otherwise the configured level.
fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str().to_lowercase()))
}

fn output<W>(writer: W, json: bool, ansi: bool) -> OutputLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_target(true)
        .with_ansi(ansi)
        .with_writer(writer);
    if json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

/// Install the global subscriber.
///
/// # Errors
/// Returns `ProtocolError::ConfigError` if the log file cannot be opened or a
/// global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let mut outputs: Vec<OutputLayer> = Vec::with_capacity(2);

    if config.log_to_console {
        outputs.push(output(std::io::stdout, config.json_format, true));
    }

    if config.log_to_file {
        let path = config.log_file_path.as_deref().ok_or_else(|| {
            ProtocolError::ConfigError("log_file_path must be specified when log_to_file is set".into())
        })?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open log file: {e}")))?;
        outputs.push(output(Mutex::new(file), config.json_format, false));
    }

    tracing_subscriber::registry()
        .with(build_filter(config))
        .with(outputs)
        .try_init()
        .map_err(|e| ProtocolError::ConfigError(format!("Failed to install logger: {e}")))?;

    tracing::info!(app = %config.app_name, level = %config.log_level, "Logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;

    #[test]
    fn test_console_and_file_both_installed() {
        let path = std::env::temp_dir().join(format!("v2x-beacon-log-{}.log", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let config = LoggingConfig {
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: true,
            log_file_path: Some(path.to_string_lossy().into_owned()),
            ..LoggingConfig::default()
        };

        init_logging(&config).unwrap();
        tracing::warn!("file output check");

        let written = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(written.contains("Logging initialized"));
        assert!(written.contains("file output check"));

        // Only one global subscriber per process.
        assert!(matches!(init_logging(&config), Err(ProtocolError::ConfigError(_))));
    }
}
