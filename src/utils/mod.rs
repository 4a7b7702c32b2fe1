//! Utility functions and helpers.

pub mod http;
pub mod log;

use unicode_segmentation::UnicodeSegmentation;

/// Marker appended to text cut by [`truncate`].
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// Keep at most `max_len` grapheme clusters of `text`, appending
/// [`TRUNCATION_MARKER`] when anything was cut.
pub fn truncate(text: &str, max_len: usize) -> String {
    match text.grapheme_indices(true).nth(max_len) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

/// Like [`truncate`] but without a marker, for display excerpts.
pub fn excerpt(text: &str, max_len: usize) -> &str {
    match text.grapheme_indices(true).nth(max_len) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}
