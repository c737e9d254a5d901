//! Logging setup with a reloadable filter.

use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt,
    layer::SubscriberExt,
    reload::{self, Handle},
    util::SubscriberInitExt,
};

use crate::{Error, Result};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "notification_sync=info";

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Type alias for the reload handle.
pub type FilterHandle = Handle<EnvFilter, Registry>;

/// Handle returned by [`init_logging`] for runtime filter changes.
pub struct LoggingHandle {
    handle: FilterHandle,
}

impl LoggingHandle {
    /// Get the current filter directive string.
    pub fn get_filter(&self) -> String {
        self.handle
            .with_current(|filter| filter.to_string())
            .unwrap_or_default()
    }

    /// Set a new filter directive (e.g. `"notification_sync=debug"`).
    pub fn set_filter(&self, directive: &str) -> Result<()> {
        let new_filter = build_filter(directive)?;

        self.handle
            .reload(new_filter)
            .map_err(|e| Error::Other(format!("Failed to reload filter: {}", e)))?;

        info!(directive = %directive, "Log filter updated");
        Ok(())
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter`. Fails instead of
/// panicking when a global subscriber is already installed.
pub fn init_logging(default_filter: &str, format: LogFormat) -> Result<LoggingHandle> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| build_filter(default_filter))?;
    let (filter_layer, handle) = reload::Layer::new(filter);

    let fmt_layer = match format {
        LogFormat::Pretty => fmt::layer().with_target(true).boxed(),
        LogFormat::Json => fmt::layer().json().with_current_span(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| Error::Other(format!("Failed to install subscriber: {}", e)))?;

    Ok(LoggingHandle { handle })
}

fn build_filter(directive: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directive)
        .map_err(|e| Error::config(format!("Invalid filter directive: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_rejects_garbage() {
        assert!(build_filter(DEFAULT_LOG_FILTER).is_ok());
        assert!(build_filter("notification_sync=loud").is_err());
    }
}
