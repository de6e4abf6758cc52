use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One retrieved piece of text evidence about a persona.
///
/// Snippets are created by the content fetcher and never mutated afterwards;
/// the workflow only ever appends them to its collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    pub source_text: String,
    pub retrieved_at: DateTime<Utc>,
    pub tags: BTreeSet<String>,
}

impl Snippet {
    /// Creates a snippet stamped with the current time.
    pub fn new(source_text: impl Into<String>, tags: impl IntoIterator<Item = String>) -> Self {
        Self {
            source_text: source_text.into(),
            retrieved_at: Utc::now(),
            tags: tags.into_iter().collect(),
        }
    }

    /// Checks whether the text contains `token` as a whole alphanumeric word.
    pub fn mentions_token(&self, token: &str) -> bool {
        self.source_text
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|word| word == token)
    }

    /// Returns the text cut to at most `max_chars` characters, on a char boundary.
    pub fn truncated(&self, max_chars: usize) -> &str {
        match self.source_text.char_indices().nth(max_chars) {
            Some((idx, _)) => &self.source_text[..idx],
            None => &self.source_text,
        }
    }
}
