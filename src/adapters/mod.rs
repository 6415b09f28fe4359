//! Concrete port implementations. `FsUnitStore` and `FileGraphStore` read
//! and persist the real on-disk extraction layout (spec.md §6.1); the
//! vector and metadata stores are in-memory stand-ins for a real vector
//! database and search index, and `DeterministicEmbeddingProvider` stands
//! in for a real AI embedding service.

pub mod embedding;
pub mod graph_store;
pub mod metadata_store;
pub mod unit_store;
pub mod vector_store;

pub use embedding::DeterministicEmbeddingProvider;
pub use graph_store::FileGraphStore;
pub use metadata_store::InMemoryMetadataStore;
pub use unit_store::FsUnitStore;
pub use vector_store::InMemoryVectorStore;
