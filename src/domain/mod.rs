//! # Domain Layer
//!
//! Core business logic and domain types for the retrieval engine.
//!
//! - [`error`] - the engine's single error taxonomy
//! - [`ports`] - port traits (interfaces) for dependency injection
//! - [`types`] - core domain types: `ExtractedUnit`, `Candidate`,
//!   `Classification`, `RetrievalResult`, ...
//!
//! No module under `domain` depends on `tokio`'s runtime, a store
//! implementation, or I/O directly; everything external comes in through a
//! [`ports`] trait.

pub mod error;
pub mod ports;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
