//! Text chunking for index construction.
//!
//! Splits raw document text into overlapping fixed-size passages. Overlap
//! creates intentional redundancy across adjacent chunks so facts are not
//! cut at boundaries.

/// Default chunk size when the caller passes a non-positive value.
pub const DEFAULT_MAX_CHARS: usize = 800;

/// Split `text` into trimmed, overlapping chunks of at most `max_chars`
/// characters.
///
/// - `max_chars <= 0` is coerced to [`DEFAULT_MAX_CHARS`]; negative
///   `overlap` is coerced to 0.
/// - Windows advance by `max_chars - overlap`; the final chunk may be
///   shorter.
/// - Empty or whitespace-only windows are not emitted.
///
/// Operates on character boundaries, so multi-byte text never splits
/// inside a code point.
pub fn chunk_text(text: &str, max_chars: i64, overlap: i64) -> Vec<String> {
    let max_chars = if max_chars <= 0 {
        DEFAULT_MAX_CHARS
    } else {
        max_chars as usize
    };
    let overlap = if overlap < 0 { 0 } else { overlap as usize };
    // A full-window overlap would stall the scan.
    let overlap = overlap.min(max_chars - 1);

    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    let mut chunks = Vec::new();

    let mut start = 0;
    while start < n {
        let end = (start + max_chars).min(n);
        let window: String = chars[start..end].iter().collect();
        let trimmed = window.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        if end >= n {
            break;
        }
        start = end - overlap;
    }

    chunks
}
