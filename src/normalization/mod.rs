//! Legacy-compatible company name normalization
//!
//! The normalized form is the universal cache key and the only input the
//! temporary id generator ever hashes, so the function must be total and
//! deterministic: the same raw name always produces the same key.
//!
//! Rules, in order:
//! 1. drop every whitespace character (including U+3000)
//! 2. fold full-width ASCII onto half-width
//! 3. lower-case (optional, on by default; not a legacy rule)
//! 4. map every bracket glyph onto `(` / `)`
//! 5. until nothing changes: remove bracketed status markers, strip status
//!    markers at either end (longest first), strip business-suffix patterns,
//!    drop empty `()` and trim separator characters at both ends

use regex::Regex;
use std::sync::OnceLock;

pub mod markers;

use markers::{
    BUSINESS_SUFFIX_PATTERNS, EDGE_SEPARATORS, STATUS_MARKERS, canonical_bracket, to_half_width,
};

/// Toggles for behaviour that has no legacy precedent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub lowercase: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self { lowercase: true }
    }
}

/// Name normalizer carrying its option set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NameNormalizer {
    options: NormalizeOptions,
}

impl NameNormalizer {
    pub fn new(options: NormalizeOptions) -> Self {
        Self { options }
    }

    pub fn with_lowercase(lowercase: bool) -> Self {
        Self::new(NormalizeOptions { lowercase })
    }

    pub fn options(&self) -> NormalizeOptions {
        self.options
    }

    pub fn normalize(&self, raw: &str) -> String {
        normalize_with(raw, &self.options)
    }
}

/// Normalize with the default options
pub fn normalize(raw: &str) -> String {
    normalize_with(raw, &NormalizeOptions::default())
}

pub fn normalize_with(raw: &str, options: &NormalizeOptions) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let folded: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(to_half_width)
        .collect();

    let cased = if options.lowercase {
        folded.to_lowercase()
    } else {
        folded
    };

    let mut current: String = cased.chars().map(canonical_bracket).collect();

    loop {
        let next = strip_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn markers_longest_first() -> &'static [&'static str] {
    static SORTED: OnceLock<Vec<&'static str>> = OnceLock::new();
    SORTED.get_or_init(|| {
        let mut sorted = STATUS_MARKERS.to_vec();
        sorted.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
        sorted
    })
}

fn suffix_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        BUSINESS_SUFFIX_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
    })
}

fn trim_separators(s: &str) -> &str {
    s.trim_matches(|c: char| EDGE_SEPARATORS.contains(&c))
}

/// One pass of the marker/suffix/separator rules
fn strip_once(input: &str) -> String {
    let mut s = input.to_string();

    for marker in markers_longest_first() {
        let bracketed = format!("({marker})");
        if s.contains(&bracketed) {
            s = s.replace(&bracketed, "");
        }
    }

    for marker in markers_longest_first() {
        if let Some(rest) = s.strip_prefix(marker) {
            s = rest.to_string();
            break;
        }
    }
    s = trim_separators(&s).to_string();

    for marker in markers_longest_first() {
        if let Some(rest) = s.strip_suffix(marker) {
            s = rest.to_string();
            break;
        }
    }
    s = trim_separators(&s).to_string();

    for pattern in suffix_patterns() {
        if pattern.is_match(&s) {
            s = pattern.replace(&s, "").into_owned();
        }
    }

    s = s.replace("()", "");
    trim_separators(&s).to_string()
}
