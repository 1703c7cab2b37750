use std::path::Path;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

const LOG_FILE_PREFIX: &str = "strategy-vault.log";

/// Preflight a log directory: `tracing_appender::rolling::daily` aborts the
/// process if it cannot create its first file.
fn writable_log_dir(dir: &str) -> bool {
    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!(
            "Warning: Could not create log directory {} ({}), file logging disabled",
            dir, e
        );
        return false;
    }

    let marker = Path::new(dir).join(".strategy_vault_write_test");
    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&marker)
    {
        Ok(_) => {
            let _ = std::fs::remove_file(&marker);
            true
        }
        Err(e) => {
            eprintln!(
                "Warning: Could not write to log directory {} ({}), file logging disabled",
                dir, e
            );
            false
        }
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `logging.level`. Calling this twice is a no-op.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("warn,strategy_vault={}", config.level.to_ascii_lowercase()))
    });

    let console_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed()
    };

    let file_layer = config
        .dir
        .as_deref()
        .filter(|dir| writable_log_dir(dir))
        .map(|dir| {
            let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // Keep the guard alive for the life of the process
            Box::leak(Box::new(guard));

            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
        });

    let file_logging_enabled = file_layer.is_some();
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed && file_logging_enabled {
        if let Some(dir) = &config.dir {
            eprintln!("Logging to: {}/{}", dir, LOG_FILE_PREFIX);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwritable_dir_disables_file_logging() {
        assert!(!writable_log_dir("/proc/strategy-vault-cannot-exist"));
    }

    #[test]
    fn test_writable_dir() {
        let dir = std::env::temp_dir().join(format!("strategy-vault-log-{}", uuid::Uuid::new_v4()));
        let dir = dir.to_string_lossy().to_string();
        assert!(writable_log_dir(&dir));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_init_twice_is_noop() {
        let config = LoggingConfig::default();
        init_logging(&config);
        init_logging(&config);
    }
}
