//! Client-side notification synchronization and caching engine.
//!
//! Keeps a per-profile view of notifications and preferences consistent
//! with a host process that owns the data. Reads are served from TTL caches,
//! bursts of read/delete actions are coalesced into debounced batches with
//! optimistic local updates, and push events for newly created
//! notifications are merged without duplication.
//!
//! [`NotificationCenter`] is the entry point; [`bridge::HostBridge`] is the
//! contract a host implementation must fulfil.

pub mod batch;
pub mod bridge;
pub mod cache;
pub mod center;
pub mod config;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod loader;
pub mod logging;
pub mod status;
pub mod wire;

pub use center::NotificationCenter;
pub use config::SyncConfig;
pub use error::{Error, MappingError, Result};
