//! Sufficiency Evaluation
//!
//! Decides whether the material gathered so far is enough to stop searching.

use crate::snippet::Snippet;
use chrono::{Datelike, Utc};

/// Minimum number of snippets before the material can be considered sufficient.
pub const MIN_SNIPPETS: usize = 15;

/// Decides whether the collected snippets are enough to stop searching.
pub trait SufficiencyEvaluator: Send + Sync {
    fn is_sufficient(&self, snippets: &[Snippet]) -> bool;
}

/// The default rule: enough snippets, and at least one of them mentions the
/// current or the previous calendar year.
///
/// Unless pinned, the current year is read from the clock on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecencyEvaluator {
    current_year: Option<i32>,
}

impl RecencyEvaluator {
    /// Creates an evaluator pinned to a reference year.
    pub fn new(current_year: i32) -> Self {
        Self {
            current_year: Some(current_year),
        }
    }

    pub fn reference_year(&self) -> i32 {
        self.current_year.unwrap_or_else(|| Utc::now().year())
    }
}

impl SufficiencyEvaluator for RecencyEvaluator {
    fn is_sufficient(&self, snippets: &[Snippet]) -> bool {
        is_sufficient(snippets, self.reference_year())
    }
}

pub fn is_sufficient(snippets: &[Snippet], current_year: i32) -> bool {
    if snippets.len() < MIN_SNIPPETS {
        return false;
    }
    let current = current_year.to_string();
    let previous = (current_year - 1).to_string();
    snippets
        .iter()
        .any(|s| s.mentions_token(&current) || s.mentions_token(&previous))
}
