//! Retrieval tools used by the specialist agents.
//!
//! Each tool queries one source (the code index, the repository host, or the
//! article store) and renders the result as Markdown context for a prompt.
//! Tools return `Err` only when the source itself fails; "nothing found" is
//! a normal answer.

pub mod blog;
pub mod repo;

/// Prefix of `text` holding at most `max_chars` characters, and whether
/// anything was cut.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => (&text[..byte_index], true),
        None => (text, false),
    }
}

/// Comma-joined list, `"None"` when empty.
pub(crate) fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "None".to_string()
    } else {
        items.join(", ")
    }
}
