use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Used when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVES: &str = "hunt=info";
const VERBOSE_DIRECTIVES: &str = "hunt=debug";

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub verbose: bool,
    /// Plain-text copy of every event, appended across runs.
    pub log_file: Option<PathBuf>,
}

pub fn build_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            VERBOSE_DIRECTIVES
        } else {
            DEFAULT_DIRECTIVES
        })
    })
}

/// Installs the global subscriber: stderr always, plus the log file when configured.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let file_layer = match &config.log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).context("Failed to create log directory")?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_target(false)
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(build_filter(config.verbose))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_layer_creates_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("ingest.log");
        let config = LogConfig {
            verbose: true,
            log_file: Some(path.clone()),
        };

        init_logging(&config).unwrap();
        tracing::info!(partition = "Registry", "hello from the test");
        assert!(path.exists());
    }
}
