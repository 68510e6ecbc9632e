//! Subscriber setup for binaries and demos built on `dagexec`.
//!
//! The library itself only emits `tracing` events. Level priority:
//! 1. the level passed to [`init_logging`]
//! 2. the `DAGEXEC_LOG` environment variable (an `EnvFilter` directive)
//! 3. `info`
//!
//! Output goes to stderr so stdout stays free for task output.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

pub const LOG_ENV: &str = "DAGEXEC_LOG";

/// Installs the global subscriber. Returns `false` if one was already set.
pub fn init_logging(level: Option<tracing::Level>) -> bool {
    let filter = match level {
        Some(level) => EnvFilter::new(level.as_str().to_lowercase()),
        None => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info")),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_refused() {
        // the only test in this binary that installs a subscriber
        assert!(init_logging(Some(tracing::Level::DEBUG)));
        assert!(!init_logging(None));
    }
}
