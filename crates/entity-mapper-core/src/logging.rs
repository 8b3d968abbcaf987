//! Builds the tracing dispatcher for a run: human-readable console output on
//! stderr plus an optional JSON copy in a log file.

use std::fs;
use std::io;
use std::path::PathBuf;

use tracing::Dispatch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Default)]
pub struct LogSettings {
    pub verbose: bool,
    pub log_file: Option<PathBuf>,
    pub console: bool,
}

/// Owns the dispatcher and the file writer's flush guard. Dropping it
/// flushes any buffered file output.
pub struct LoggingHandle {
    dispatch: Dispatch,
    _guard: Option<WorkerGuard>,
}

impl LoggingHandle {
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }
}

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug,sqlx=info")
        } else {
            EnvFilter::new("info")
        }
    })
}

pub fn build_logging(settings: &LogSettings) -> io::Result<LoggingHandle> {
    let (file_layer, guard) = match &settings.log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let file_name = path.file_name().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("log file path {} has no file name", path.display()),
                )
            })?;
            fs::create_dir_all(&directory)?;

            let appender = tracing_appender::rolling::never(&directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let console_layer = settings
        .console
        .then(|| fmt::layer().with_target(false).with_writer(io::stderr));

    let subscriber = tracing_subscriber::registry()
        .with(env_filter(settings.verbose))
        .with(file_layer)
        .with(console_layer);

    Ok(LoggingHandle {
        dispatch: Dispatch::new(subscriber),
        _guard: guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_layer_receives_events() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log_path = dir.path().join("logs").join("entity_mapper.log");

        let handle = build_logging(&LogSettings {
            verbose: false,
            log_file: Some(log_path.clone()),
            console: false,
        })
        .expect("logging");

        tracing::dispatcher::with_default(handle.dispatch(), || {
            tracing::info!(rows = 3, "merged datasets onto input rows");
        });
        drop(handle);

        let contents = fs::read_to_string(&log_path).expect("log file");
        assert!(contents.contains("merged datasets onto input rows"));
    }

    #[test]
    fn silent_handle_builds_without_outputs() {
        let handle = build_logging(&LogSettings::default()).expect("logging");
        tracing::dispatcher::with_default(handle.dispatch(), || {
            tracing::info!("nowhere to go");
        });
    }
}
