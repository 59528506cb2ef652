//! Folio Store: static knowledge base and persisted vector retrieval index.

pub mod index;
pub mod knowledge;
pub mod types;

pub use index::RetrievalIndex;
pub use knowledge::{load_knowledge_base, OWNER_NAME};
pub use types::*;
