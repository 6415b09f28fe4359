//! Chunking and embedding-text preparation: split an [`ExtractedUnit`] into
//! semantically coherent [`ChunkRecord`]s, then render each into the
//! header-prefixed text that gets embedded and shown in context.

mod chunker;
mod text_preparer;

pub use chunker::Chunker;
pub(crate) use chunker::truncate_middle;
pub use text_preparer::{PreparedText, TextPreparer};
