// src/logging.rs
use crate::config::{LogFormat, LoggingConfig};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Keeps the file writers flushing; drop only at process exit.
pub struct LogGuards(Vec<WorkerGuard>);

/// Install the global subscriber: console output in the configured format,
/// plus JSON log files when `logging.directory` is set.
pub fn init(logging: &LoggingConfig) -> Result<LogGuards> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))?
        .add_directive("hyper=info".parse()?)
        .add_directive("tungstenite=info".parse()?);

    let console = match logging.format {
        LogFormat::Json => fmt::layer().json().boxed(),
        LogFormat::Text => fmt::layer().boxed(),
    };

    let (files, guards) = match &logging.directory {
        Some(dir) => {
            let (layer, guards) = file_layer(dir)?;
            (Some(layer), guards)
        }
        None => (None, Vec::new()),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(files)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LogGuards(guards))
}

/// JSON layers writing everything to `combined.log` and errors to `error.log`.
pub fn file_layer<S>(dir: &Path) -> Result<(Box<dyn Layer<S> + Send + Sync>, Vec<WorkerGuard>)>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let (combined, combined_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, "combined.log"));
    let (errors, errors_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, "error.log"));

    let layer = fmt::layer()
        .json()
        .with_ansi(false)
        .with_writer(combined)
        .and_then(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(errors)
                .with_filter(LevelFilter::ERROR),
        )
        .boxed();

    Ok((layer, vec![combined_guard, errors_guard]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{error, info};
    use uuid::Uuid;

    #[test]
    fn test_file_layer_splits_errors() {
        let dir = std::env::temp_dir().join(format!("monitor-logs-{}", Uuid::new_v4()));
        let (layer, guards) = file_layer(&dir).unwrap();
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            info!("probe cycle finished");
            error!("target unreachable");
        });
        // Dropping the guards flushes the background writers.
        drop(guards);

        let combined = std::fs::read_to_string(dir.join("combined.log")).unwrap();
        let errors = std::fs::read_to_string(dir.join("error.log")).unwrap();
        assert!(combined.contains("probe cycle finished"));
        assert!(combined.contains("target unreachable"));
        assert!(errors.contains("target unreachable"));
        assert!(!errors.contains("probe cycle finished"));

        let line: serde_json::Value =
            serde_json::from_str(errors.lines().next().unwrap()).unwrap();
        assert_eq!(line["level"], "ERROR");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
