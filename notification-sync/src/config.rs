//! Runtime configuration for the synchronization engine.
//!
//! Defaults can be overridden from the process environment (optionally
//! seeded from a `.env` file).

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default cache TTL (5 minutes).
pub const DEFAULT_CACHE_TTL_MS: u64 = 300_000;

/// Default debounce window for batched mutations.
pub const DEFAULT_DEBOUNCE_MS: u64 = 1_000;

/// Default page size for paginated loads.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Default capacity of the push event channel.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

const ENV_CACHE_TTL_MS: &str = "NOTIFICATION_CACHE_TTL_MS";
const ENV_DEBOUNCE_MS: &str = "NOTIFICATION_DEBOUNCE_MS";
const ENV_BATCHING: &str = "NOTIFICATION_BATCHING";
const ENV_AUTO_REFRESH_MS: &str = "NOTIFICATION_AUTO_REFRESH_MS";
const ENV_PAGE_SIZE: &str = "NOTIFICATION_PAGE_SIZE";
const ENV_EVENT_CAPACITY: &str = "NOTIFICATION_EVENT_CAPACITY";

/// Configuration for the notification synchronization engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Maximum age of a cached notification list or preference record.
    pub cache_ttl_ms: u64,
    /// Quiet period after the last enqueue before a batch is flushed.
    pub debounce_window_ms: u64,
    /// Whether read/delete mutations are coalesced into debounced batches.
    pub batching_enabled: bool,
    /// Interval of the background refresh task, if any.
    pub auto_refresh_interval_ms: Option<u64>,
    /// Default page size used by the paginated loader.
    pub page_size: u32,
    /// Capacity of the push event channel.
    pub event_channel_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: DEFAULT_CACHE_TTL_MS,
            debounce_window_ms: DEFAULT_DEBOUNCE_MS,
            batching_enabled: true,
            auto_refresh_interval_ms: None,
            page_size: DEFAULT_PAGE_SIZE,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl SyncConfig {
    /// Build a configuration from the environment.
    ///
    /// A `.env` file in the working directory is loaded first when present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ttl) = parse_var::<u64, _>(&lookup, ENV_CACHE_TTL_MS)? {
            config.cache_ttl_ms = ttl;
        }
        if let Some(window) = parse_var::<u64, _>(&lookup, ENV_DEBOUNCE_MS)? {
            config.debounce_window_ms = window;
        }
        if let Some(raw) = lookup(ENV_BATCHING) {
            config.batching_enabled = parse_bool(ENV_BATCHING, &raw)?;
        }
        if let Some(interval) = parse_var::<u64, _>(&lookup, ENV_AUTO_REFRESH_MS)? {
            config.auto_refresh_interval_ms = (interval > 0).then_some(interval);
        }
        if let Some(size) = parse_var::<u32, _>(&lookup, ENV_PAGE_SIZE)? {
            config.page_size = size;
        }
        if let Some(capacity) = parse_var::<usize, _>(&lookup, ENV_EVENT_CAPACITY)? {
            config.event_channel_capacity = capacity;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the engine misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.cache_ttl_ms == 0 {
            return Err(Error::config("cache TTL must be greater than zero"));
        }
        if self.debounce_window_ms == 0 {
            return Err(Error::config("debounce window must be greater than zero"));
        }
        if self.page_size == 0 {
            return Err(Error::config("page size must be greater than zero"));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::config("event channel capacity must be greater than zero"));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }

    pub fn auto_refresh_interval(&self) -> Option<Duration> {
        self.auto_refresh_interval_ms.map(Duration::from_millis)
    }

    pub fn with_batching(mut self, enabled: bool) -> Self {
        self.batching_enabled = enabled;
        self
    }

    pub fn with_auto_refresh(mut self, interval: Duration) -> Self {
        self.auto_refresh_interval_ms = Some(interval.as_millis() as u64);
        self
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|e| Error::config(format!("{key}: invalid value {raw:?}: {e}")))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::config(format!("{key}: invalid boolean {raw:?}"))),
    }
}
