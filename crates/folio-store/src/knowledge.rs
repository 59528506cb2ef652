//! The portfolio knowledge base.
//!
//! Passages are compiled into the binary from `data/*.md`; there is no
//! runtime source of knowledge and nothing mutates it.

use crate::types::Passage;

/// Whose portfolio the assistant speaks for.
pub const OWNER_NAME: &str = "Manish Ukirade";

/// `(category, content)` in presentation order.
const SOURCES: &[(&str, &str)] = &[
    ("general", include_str!("../data/general.md")),
    ("projects", include_str!("../data/projects.md")),
    ("ai-ml", include_str!("../data/ai-ml.md")),
    ("devops", include_str!("../data/devops.md")),
    ("leadership", include_str!("../data/leadership.md")),
    ("security", include_str!("../data/security.md")),
    ("backend", include_str!("../data/backend.md")),
    ("frontend", include_str!("../data/frontend.md")),
];

/// Load every knowledge passage.
pub fn load_knowledge_base() -> Vec<Passage> {
    SOURCES
        .iter()
        .map(|(category, content)| Passage::new(*category, content.trim_end()))
        .collect()
}
