//! Push event ingestion.

mod ingestor;
mod registry;

pub use ingestor::{EventIngestor, IngestOutcome, IngestStats};
pub use registry::{Subscription, SubscriptionRegistry};
