//! Chunk splitter - fits arbitrary text into transport-sized segments.
//!
//! Splitting is lossless and order-preserving: concatenating the returned
//! segments reproduces the input exactly. Split points prefer paragraph,
//! then line, then sentence, then word boundaries, searched backwards from
//! the length limit, and never land inside a multi-byte character.

/// Split `text` into ordered segments of at most `max_len` characters.
///
/// Empty input yields an empty list.
///
/// # Panics
///
/// Panics if `max_len` is zero; that is a programmer error, not a
/// recoverable condition.
pub fn split_into_chunks(text: &str, max_len: usize) -> Vec<String> {
    assert!(max_len > 0, "max_len must be positive");

    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        // Byte offset just past the max_len-th character, if the remainder
        // is that long
        let hard_end = match rest.char_indices().nth(max_len) {
            Some((idx, _)) => idx,
            None => {
                chunks.push(rest.to_string());
                break;
            }
        };
        let window = &rest[..hard_end];
        let cut = find_break(window).unwrap_or(hard_end);
        chunks.push(window[..cut].to_string());
        rest = &rest[cut..];
    }
    chunks
}

/// Best split point within `window`, as a byte offset, or `None` when no
/// boundary exists. The delimiter stays with the leading segment.
fn find_break(window: &str) -> Option<usize> {
    if let Some(idx) = window.rfind("\n\n") {
        if idx > 0 {
            return Some(idx + 2);
        }
    }
    if let Some(idx) = window.rfind('\n') {
        if idx > 0 {
            return Some(idx + 1);
        }
    }
    for pattern in [". ", "! ", "? "] {
        if let Some(idx) = window.rfind(pattern) {
            if idx > 0 {
                return Some(idx + pattern.len());
            }
        }
    }
    if let Some(idx) = window.rfind(|c: char| c.is_whitespace()) {
        if idx > 0 {
            let delim_len = window[idx..].chars().next().map(char::len_utf8)?;
            return Some(idx + delim_len);
        }
    }
    None
}
