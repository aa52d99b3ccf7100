//! Path normalization and encoding.
//!
//! Every path that arrives at the public boundary is a caller-supplied string
//! that may carry leading slashes, backslashes, or stray whitespace. These
//! helpers collapse such input into a canonical storage key: forward-slash
//! delimited, percent-encoded, never starting or ending with `/`.

/// Split the given parts on `/`, trim whitespace, slashes, and backslashes
/// from each segment, and drop empty segments.
///
/// Never returns more than the caller sent; empty input yields an empty list.
pub fn normalize(parts: &[&str]) -> Vec<String> {
    let mut segments = Vec::new();
    for part in parts {
        for raw in part.split('/') {
            let segment = raw.trim().trim_matches(|c| c == '/' || c == '\\').trim();
            if !segment.is_empty() {
                segments.push(segment.to_string());
            }
        }
    }
    segments
}

/// Percent-encode a caller-supplied path into a canonical storage key.
///
/// Spaces become hyphens before encoding, so keys stay readable in listings
/// and URLs. Segments that are already safe pass through unchanged.
pub fn encode(path: &str) -> String {
    normalize(&[path])
        .iter()
        .map(|segment| urlencoding::encode(&segment.replace(' ', "-")).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Join already-encoded key parts, dropping empties.
pub fn join(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/")
}

/// True when the encoded path addresses the storage root.
pub fn is_root(key: &str) -> bool {
    key.is_empty()
}

/// The key of the containing folder; empty for top-level keys.
pub fn parent(key: &str) -> &str {
    match key.rsplit_once('/') {
        Some((parent, _)) => parent,
        None => "",
    }
}

/// Last segment of a key.
pub fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Every ancestor folder key of `key`, shortest first, excluding `key` itself.
///
/// `"a/b/c.txt"` yields `["a", "a/b"]`.
pub fn ancestors(key: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut prefix = String::new();
    let segments: Vec<&str> = key.split('/').collect();
    for segment in segments.iter().take(segments.len().saturating_sub(1)) {
        if !prefix.is_empty() {
            prefix.push('/');
        }
        prefix.push_str(segment);
        out.push(prefix.clone());
    }
    out
}
