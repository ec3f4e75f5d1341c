//! Term extraction shared by indexing and BM25 scoring

use std::collections::HashMap;

/// Terms shorter than this are not indexed
pub const MIN_TERM_CHARS: usize = 2;

/// Terms longer than this are not indexed
pub const MAX_TERM_CHARS: usize = 64;

/// Statistics of one term inside a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermStats {
    pub frequency: u32,
    /// Ordinal of the first occurrence among the document's terms
    pub first_position: u32,
}

/// Lower-cased word terms of `text` in order of appearance
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| {
            let n = w.chars().count();
            (MIN_TERM_CHARS..=MAX_TERM_CHARS).contains(&n)
        })
        .map(str::to_lowercase)
        .collect()
}

/// Per-term frequencies plus the document length in terms
pub fn term_frequencies(text: &str) -> (HashMap<String, TermStats>, u32) {
    let terms = tokenize(text);
    let length = terms.len() as u32;
    let mut stats: HashMap<String, TermStats> = HashMap::new();
    for (position, term) in terms.into_iter().enumerate() {
        stats
            .entry(term)
            .and_modify(|s| s.frequency += 1)
            .or_insert(TermStats {
                frequency: 1,
                first_position: position as u32,
            });
    }
    (stats, length)
}
