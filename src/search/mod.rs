use crate::letter::Letter;

/// Normalised free-text query over the searchable letter fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LetterQuery {
    normalized: String,
}

impl LetterQuery {
    pub fn parse(input: &str) -> Self {
        Self {
            normalized: input.trim().to_lowercase(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }

    pub fn matches(&self, letter: &Letter) -> bool {
        if self.is_empty() {
            return true;
        }
        searchable_fields(letter).any(|field| contains_folded(field, &self.normalized))
    }

    pub fn highlight_terms(&self) -> Vec<String> {
        if self.is_empty() {
            Vec::new()
        } else {
            vec![self.normalized.clone()]
        }
    }
}

fn searchable_fields(letter: &Letter) -> impl Iterator<Item = &str> {
    [
        Some(letter.letter_number.as_str()),
        Some(letter.subject.as_str()),
        Some(letter.main_body.as_str()),
        Some(letter.salutation.as_str()),
        letter.special_remarks.as_deref(),
    ]
    .into_iter()
    .flatten()
}

fn contains_folded(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}
