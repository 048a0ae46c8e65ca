//! Payload chunking
//!
//! Splits a serialized session payload into size-bounded ordered
//! fragments and reconstructs it. Fragment boundaries always fall on
//! UTF-8 character boundaries, so a multi-byte character is never split
//! across two chunk documents.

/// Maximum size of a single chunk fragment in bytes.
///
/// Kept well under [`DOCUMENT_SIZE_CEILING`] to absorb per-document
/// metadata overhead.
pub const CHUNK_SIZE_BYTES: usize = 400_000;

/// Hard per-document size ceiling of the backing store.
pub const DOCUMENT_SIZE_CEILING: usize = 1_048_576;

/// Split a payload into ordered fragments of at most `chunk_size` bytes.
///
/// ASCII payloads produce fragments of exactly `chunk_size` bytes except
/// possibly the last. An empty payload yields exactly one empty fragment,
/// so a stored session always has at least one chunk.
///
/// `chunk_size` must be non-zero. A fragment may exceed `chunk_size` only
/// when a single character is wider than `chunk_size` itself, which the
/// reference sizes (hundreds of kilobytes) can never hit.
pub fn split_payload(payload: &str, chunk_size: usize) -> Vec<String> {
    assert!(chunk_size > 0, "chunk_size must be non-zero");

    if payload.is_empty() {
        return vec![String::new()];
    }

    let bytes = payload.len();
    let mut fragments = Vec::with_capacity(bytes.div_ceil(chunk_size));
    let mut start = 0;

    while start < bytes {
        let mut end = usize::min(start + chunk_size, bytes);
        while end > start && !payload.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            // A single character wider than chunk_size: take it whole.
            let ch = payload[start..]
                .chars()
                .next()
                .map(char::len_utf8)
                .unwrap_or(1);
            end = start + ch;
        }
        fragments.push(payload[start..end].to_string());
        start = end;
    }

    fragments
}

/// Reassemble fragments in ascending index order.
///
/// Exact inverse of [`split_payload`]: concatenation reproduces the
/// original payload byte for byte.
pub fn join_fragments(fragments: &[String]) -> String {
    fragments.concat()
}
