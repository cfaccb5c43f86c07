//! Structured decoding of generator replies.
//!
//! Models often wrap their JSON in prose or code fences. [`decode_reply`]
//! pulls out the first balanced `{ ... }` object and decodes it strictly into
//! the expected reply type, reporting anything else as
//! [`Decoded::Malformed`] instead of an error.

use serde::de::DeserializeOwned;

/// Outcome of decoding a generator reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    Parsed(T),
    /// No usable object was found; carries a human-readable reason.
    Malformed(String),
}

/// Extract the first balanced JSON object from `raw`.
///
/// Braces inside string literals (including escaped quotes) are ignored. If an
/// opening brace never closes, scanning resumes at the next one.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let bytes = raw.as_bytes();
    let mut search_from = 0;
    while let Some(offset) = raw[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = balanced_end(&bytes[start..]) {
            return Some(&raw[start..start + end]);
        }
        search_from = start + 1;
    }
    None
}

/// Length of the balanced object at the start of `bytes`, if it closes.
fn balanced_end(bytes: &[u8]) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Decode the first JSON object in `raw` as `T`.
pub fn decode_reply<T: DeserializeOwned>(raw: &str) -> Decoded<T> {
    let Some(object) = extract_json_object(raw) else {
        return Decoded::Malformed("no JSON object found in reply".to_string());
    };
    match serde_json::from_str(object) {
        Ok(value) => Decoded::Parsed(value),
        Err(e) => Decoded::Malformed(format!("reply object does not match expected shape: {e}")),
    }
}
