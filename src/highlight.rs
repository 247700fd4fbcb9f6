use indexmap::IndexSet;
use regex::{Regex, RegexBuilder};

use crate::search::LetterQuery;

/// Case-insensitive matcher for the active query, or `None` when nothing is searched.
pub fn query_highlighter(query: &LetterQuery) -> Option<Regex> {
    highlight_regex(&query.highlight_terms())
}

pub fn highlight_regex(terms: &[String]) -> Option<Regex> {
    let mut seen = IndexSet::new();
    let mut unique: Vec<&str> = terms
        .iter()
        .map(|term| term.trim())
        .filter(|term| !term.is_empty() && seen.insert(term.to_lowercase()))
        .collect();
    if unique.is_empty() {
        return None;
    }
    // longest first so overlapping terms highlight the widest match
    unique.sort_by(|a, b| b.len().cmp(&a.len()));
    let pattern = unique
        .into_iter()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("|");
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .ok()
}
