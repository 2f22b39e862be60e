//! Text normalization for notification deduplication
//!
//! Produces a canonical comparison form of notification text by:
//! 1. Replacing decorative punctuation and bullets with a space
//! 2. Collapsing whitespace runs to a single space
//! 3. Trimming and lowercasing
//!
//! Two bodies that differ only in decoration (e.g. `-` vs `•` as a separator
//! in a progress notification) normalize to the same string.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Characters treated as decoration, not content
const DECORATION_CHARS: &[char] = &[
    '-', '–', '—', '•', '·', '●', '◦', '▪', '|', ':', ';', ',', '.', '!', '?', '…', '(', ')',
    '[', ']', '{', '}', '"', '\'', '“', '”', '‘', '’', '/', '\\', '*', '_', '~', '>', '<',
];

fn whitespace_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static whitespace pattern"))
}

/// Normalize notification text into its comparison form
///
/// Empty input is returned unchanged. A string made only of decoration
/// normalizes to the empty string.
pub fn normalize(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let replaced: String = text
        .chars()
        .map(|c| if DECORATION_CHARS.contains(&c) { ' ' } else { c })
        .collect();

    whitespace_run()
        .replace_all(&replaced, " ")
        .trim()
        .to_lowercase()
}

/// Normalize optional text (absent bodies normalize to empty)
pub fn normalize_opt(text: Option<&str>) -> String {
    text.map(normalize).unwrap_or_default()
}

/// Split normalized text into its token set
pub fn tokenize(normalized: &str) -> HashSet<String> {
    normalized
        .split_whitespace()
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_empty_is_unchanged() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize_opt(None), "");
    }

    #[test]
    fn test_normalize_strips_separators() {
        assert_eq!(normalize("Download complete - 100%"), "download complete 100%");
        assert_eq!(normalize("Download complete • 100%"), "download complete 100%");
    }

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize("  Hello \t\n  World  "), "hello world");
    }

    #[test]
    fn test_normalize_only_punctuation_is_blank() {
        assert_eq!(normalize("...!!! -- •"), "");
    }

    #[test]
    fn test_normalize_keeps_non_ascii_text() {
        assert_eq!(normalize("Übertragung: 50 %"), "übertragung 50 %");
        assert_eq!(normalize("下载完成 — 100%"), "下载完成 100%");
    }

    #[test]
    fn test_tokenize() {
        let tokens = tokenize("download complete 100%");
        assert_eq!(tokens.len(), 3);
        assert!(tokens.contains("download"));
        assert!(tokens.contains("100%"));
    }

    #[test]
    fn test_tokenize_blank() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_tokenize_dedups_repeated_words() {
        let tokens = tokenize("ping ping ping");
        assert_eq!(tokens.len(), 1);
    }
}
