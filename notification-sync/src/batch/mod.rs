//! Debounced mutation batching.

mod batcher;
mod queue;
mod scheduler;

pub use batcher::{FlushReport, MutationBatcher};
pub use queue::BatchQueue;
pub use scheduler::DebounceTimer;
