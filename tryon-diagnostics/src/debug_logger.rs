//! Structured logging setup

use tracing_subscriber::EnvFilter;
use tryon_core::{TryOnError, TryOnResult};

/// Directive used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Installs the process-wide `tracing` subscriber
#[derive(Debug, Default)]
pub struct DebugLogger;

impl DebugLogger {
    /// Initialize logging
    ///
    /// `RUST_LOG` wins over `default_filter`. Fails with
    /// [`TryOnError::Initialization`] if a global subscriber is already set.
    pub fn init_logging(default_filter: &str) -> TryOnResult<()> {
        let filter = Self::filter(default_filter)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .map_err(|e| TryOnError::Initialization {
                reason: format!("logging already initialized: {}", e),
            })?;

        tracing::debug!("Logging initialized (default filter: {})", default_filter);
        Ok(())
    }

    /// Build the filter `init_logging` would install
    pub fn filter(default_filter: &str) -> TryOnResult<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(default_filter).map_err(|e| {
                TryOnError::InvalidConfiguration {
                    message: format!("invalid log filter '{}': {}", default_filter, e),
                }
            }),
        }
    }
}
