//! Line-level text search over file blobs

use regex::{Regex, RegexBuilder};

use crate::query::{PatternKind, TextPattern};

/// Bytes inspected for a NUL when classifying a blob as binary
const BINARY_PROBE_BYTES: usize = 8192;

/// Longest snippet kept for a matching line, in characters
const MAX_SNIPPET_CHARS: usize = 200;

/// A blob is binary when a NUL byte appears early in it
pub fn is_binary(blob: &[u8]) -> bool {
    blob.iter().take(BINARY_PROBE_BYTES).any(|b| *b == 0)
}

/// One matching line inside a blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMatch {
    /// 1-based
    pub line_number: u32,
    pub byte_offset: usize,
    pub line: String,
}

impl LineMatch {
    pub fn snippet(&self) -> String {
        snippet(&self.line)
    }
}

/// Trimmed line, cut to a bounded number of characters
pub fn snippet(line: &str) -> String {
    let trimmed = line.trim();
    match trimmed.char_indices().nth(MAX_SNIPPET_CHARS) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

/// Compiled literal or regex matcher.
///
/// Literals match case-insensitively; regexes are taken as written.
#[derive(Debug, Clone)]
pub struct TextMatcher {
    regex: Regex,
}

impl TextMatcher {
    pub fn literal(pattern: &str) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(&regex::escape(pattern.trim()))
            .case_insensitive(true)
            .build()?;
        Ok(Self { regex })
    }

    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
        })
    }

    pub fn for_pattern(pattern: &TextPattern) -> Result<Self, regex::Error> {
        match pattern.kind {
            PatternKind::Literal => Self::literal(&pattern.pattern),
            PatternKind::Regex => Self::regex(&pattern.pattern),
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// The first matched fragment of `text`
    pub fn find<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.regex.find(text).map(|m| m.as_str())
    }

    /// Every line of `blob` containing a match; invalid UTF-8 is replaced
    pub fn find_lines(&self, blob: &[u8]) -> Vec<LineMatch> {
        let text = String::from_utf8_lossy(blob);
        let mut matches = Vec::new();
        let mut offset = 0;
        for (idx, raw) in text.split('\n').enumerate() {
            let line = raw.strip_suffix('\r').unwrap_or(raw);
            if self.regex.is_match(line) {
                matches.push(LineMatch {
                    line_number: idx as u32 + 1,
                    byte_offset: offset,
                    line: line.to_string(),
                });
            }
            offset += raw.len() + 1;
        }
        matches
    }
}

/// Decoded lines of a blob with their 1-based numbers
pub(crate) fn lines(blob: &[u8]) -> Vec<(u32, String)> {
    String::from_utf8_lossy(blob)
        .split('\n')
        .enumerate()
        .map(|(idx, raw)| {
            let line = raw.strip_suffix('\r').unwrap_or(raw);
            (idx as u32 + 1, line.to_string())
        })
        .collect()
}
