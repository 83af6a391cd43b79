//! Title to path segment conversion.

/// Maximum length of a segment, in characters.
pub const MAX_SEGMENT_LEN: usize = 100;

/// Length of the id prefix used when a title sanitizes to nothing.
const ID_FALLBACK_LEN: usize = 8;

/// Convert a document title into a filesystem-safe path segment.
///
/// Keeps alphanumerics, space, `-`, `_` and `.`, strips trailing whitespace
/// and truncates to [`MAX_SEGMENT_LEN`] characters. Titles that end up empty
/// (or consist of periods only, which would address `.`/`..`) fall back to
/// the first eight characters of `id`.
pub fn sanitize(title: &str, id: &str) -> String {
    let kept: String = title.chars().filter(|c| is_allowed(*c)).collect();
    let truncated: String = kept.trim_end().chars().take(MAX_SEGMENT_LEN).collect();
    let segment = truncated.trim_end();

    if segment.is_empty() || segment.chars().all(|c| c == '.') {
        return id_fallback(id);
    }
    segment.to_string()
}

fn is_allowed(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.')
}

fn id_fallback(id: &str) -> String {
    let prefix: String = id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .take(ID_FALLBACK_LEN)
        .collect();
    if prefix.is_empty() {
        "untitled".to_string()
    } else {
        prefix
    }
}
