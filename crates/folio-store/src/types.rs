//! Data types for knowledge passages and search results.

use serde::{Deserialize, Serialize};

/// A labeled block of portfolio text used as chat context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub category: String,
    pub content: String,
}

impl Passage {
    pub fn new(category: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            content: content.into(),
        }
    }
}

/// A passage ranked against a query by cosine similarity.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub passage: Passage,
    pub score: f32,
    /// Position of the passage in the indexed set.
    pub position: usize,
}
