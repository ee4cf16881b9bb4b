use serde::{Deserialize, Serialize};

/// A fanclub and the ids of every post it has published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub id: String,
    pub name: String,
    /// Newest first, as the listing pages present them
    pub post_ids: Vec<String>,
}

impl Creator {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            post_ids: Vec::new(),
        }
    }

    pub fn post_count(&self) -> usize {
        self.post_ids.len()
    }
}
