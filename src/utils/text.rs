//! Text processing utilities.

/// Check if content is missing or whitespace only.
///
/// Rows with blank content are never queued for embedding; storage queries
/// apply the same rule in SQL.
pub fn is_blank(content: &str) -> bool {
    content.chars().all(char::is_whitespace)
}

/// Number of characters, the unit used for chunk length limits.
pub fn char_len(content: &str) -> usize {
    content.chars().count()
}
