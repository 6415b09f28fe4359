//! Embedding materialization: chunking, batching, checkpointing, and
//! cleanup of deleted units (spec.md §4.2).

mod checkpoint;
mod importance;
mod indexer;

pub use checkpoint::Checkpoint;
pub use importance::compute_importance;
pub use indexer::{IndexReport, Indexer};
