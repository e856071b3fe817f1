//! Token-count heuristics
//!
//! Used for context budgeting before LLM calls. A grapheme-based estimate
//! is accurate enough for truncation decisions; backends with a real
//! tokenizer may override counts on their side.

use unicode_segmentation::UnicodeSegmentation;

/// Estimate the number of tokens in `text`.
///
/// Roughly 4 characters per token for English-like text, counted in
/// grapheme clusters so combining marks don't inflate the estimate.
pub fn count_tokens(text: &str) -> usize {
    let graphemes = text.graphemes(true).count();
    (graphemes / 4).max(if text.is_empty() { 0 } else { 1 })
}

/// Truncate `text` to approximately `max_tokens` tokens, cutting on a
/// word boundary. Returns the input unchanged when it already fits.
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> String {
    if count_tokens(text) <= max_tokens {
        return text.to_string();
    }
    let max_graphemes = max_tokens * 4;
    let mut out = String::with_capacity(max_graphemes);
    let mut taken = 0usize;
    for word in text.split_inclusive(char::is_whitespace) {
        let len = word.graphemes(true).count();
        if taken + len > max_graphemes {
            break;
        }
        out.push_str(word);
        taken += len;
    }
    out.trim_end().to_string()
}
