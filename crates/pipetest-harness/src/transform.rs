//! Transform source-index matching.

use serde::Deserialize;

/// A transform definition as far as the harness cares: its name and the
/// source index patterns it reads from.
#[derive(Debug, Clone, Deserialize)]
pub struct Transform {
    pub name: String,
    #[serde(default)]
    pub source_indices: Vec<String>,
}

impl Transform {
    /// Whether any source pattern matches the given index name. Patterns
    /// support a single trailing `*` glob; anything else is an exact match.
    #[must_use]
    pub fn has_source(&self, index: &str) -> bool {
        self.source_indices.iter().any(|pattern| {
            match pattern.strip_suffix('*') {
                Some(prefix) => index.starts_with(prefix),
                None => pattern == index,
            }
        })
    }
}
