//! Text chunking on paragraph and sentence boundaries.

use crate::models::{ChunkedText, EmbeddingConfiguration, Row};
use crate::utils::char_len;

/// Separators tried in order, from paragraph breaks down to single spaces.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "? ", "! ", "; ", ", ", " "];

/// Splits row text into length-bounded fragments.
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Maximum fragment length in characters.
    max_length: usize,
    /// Keep every fragment (true) or only the first one with chunk id 0.
    chunk_text: bool,
}

impl TextChunker {
    /// Create a chunker from the run's embedding configuration.
    pub fn new(config: &EmbeddingConfiguration) -> Self {
        Self {
            max_length: config.chunk_max_length.max(1),
            chunk_text: config.chunk_text,
        }
    }

    /// Chunk a row into ordered fragments ready for embedding.
    ///
    /// With chunking disabled only the first fragment is kept (chunk id 0);
    /// the remainder of long text is never embedded.
    pub fn chunk_row(&self, row: &Row) -> Vec<ChunkedText> {
        let mut fragments = split_text(&row.text, self.max_length).into_iter();

        if !self.chunk_text {
            let text = fragments.next().unwrap_or_default();
            return vec![ChunkedText {
                row_id: row.id,
                chunk_id: 0,
                text,
            }];
        }

        fragments
            .enumerate()
            .map(|(idx, text)| ChunkedText {
                row_id: row.id,
                chunk_id: idx as u32 + 1,
                text,
            })
            .collect()
    }
}

/// Split text into fragments of at most `max_length` characters.
///
/// Fragments follow the original left-to-right order and are trimmed. At
/// least one fragment is always returned; short or empty input comes back
/// unchanged as the only fragment.
pub fn split_text(text: &str, max_length: usize) -> Vec<String> {
    let max_length = max_length.max(1);

    if char_len(text) <= max_length {
        return vec![text.to_string()];
    }

    let fragments: Vec<String> = split_recursive(text, max_length, 0)
        .into_iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect();

    if fragments.is_empty() {
        // Whitespace-only input longer than the limit.
        return vec![text.chars().take(max_length).collect()];
    }

    fragments
}

fn split_recursive(text: &str, max_length: usize, level: usize) -> Vec<String> {
    if char_len(text) <= max_length {
        return vec![text.to_string()];
    }

    let Some(separator) = SEPARATORS.get(level) else {
        return hard_split(text, max_length);
    };

    let mut fragments = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for piece in text.split_inclusive(*separator) {
        let piece_len = char_len(piece);

        if current_len + piece_len <= max_length {
            current.push_str(piece);
            current_len += piece_len;
            continue;
        }

        if !current.is_empty() {
            fragments.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if piece_len > max_length {
            fragments.extend(split_recursive(piece, max_length, level + 1));
        } else {
            current.push_str(piece);
            current_len = piece_len;
        }
    }

    if !current.is_empty() {
        fragments.push(current);
    }

    fragments
}

fn hard_split(text: &str, max_length: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_length)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::passage;

    fn chunker(chunk_text: bool, max: usize) -> TextChunker {
        TextChunker::new(&EmbeddingConfiguration {
            dimensions: 4,
            chunk_text,
            chunk_max_length: max,
        })
    }

    #[test]
    fn test_short_text_single_fragment() {
        let fragments = split_text("Short note.", 2048);
        assert_eq!(fragments, vec!["Short note.".to_string()]);
    }

    #[test]
    fn test_empty_text_single_fragment() {
        let fragments = split_text("", 2048);
        assert_eq!(fragments, vec![String::new()]);
    }

    #[test]
    fn test_fragments_respect_max_length() {
        let text = passage(5000);
        let fragments = split_text(&text, 2048);

        assert!(fragments.len() >= 3);
        for fragment in &fragments {
            assert!(char_len(fragment) <= 2048);
            assert!(!fragment.is_empty());
        }
    }

    #[test]
    fn test_prefers_paragraph_breaks() {
        let first = "a".repeat(30);
        let second = "b".repeat(30);
        let text = format!("{first}\n\n{second}");
        let fragments = split_text(&text, 40);
        assert_eq!(fragments, vec![first, second]);
    }

    #[test]
    fn test_sentence_split_preserves_order() {
        let text = "One two three. Four five six. Seven eight nine.";
        let fragments = split_text(text, 17);
        assert_eq!(
            fragments,
            vec!["One two three.", "Four five six.", "Seven eight nine."]
        );
    }

    #[test]
    fn test_unbroken_text_hard_split() {
        let text = "x".repeat(25);
        let fragments = split_text(&text, 10);
        assert_eq!(fragments.len(), 3);
        assert_eq!(fragments[2], "xxxxx");
    }

    #[test]
    fn test_multibyte_characters_counted_as_chars() {
        let text = "é".repeat(12);
        let fragments = split_text(&text, 5);
        assert_eq!(fragments.len(), 3);
        assert!(fragments.iter().all(|f| char_len(f) <= 5));
    }

    #[test]
    fn test_chunk_ids_one_based_and_increasing() {
        let row = Row::new(7, passage(5000));
        let chunks = chunker(true, 2048).chunk_row(&row);

        assert!(chunks.len() >= 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.row_id, 7);
            assert_eq!(chunk.chunk_id, i as u32 + 1);
        }
    }

    #[test]
    fn test_chunking_disabled_keeps_first_fragment() {
        let row = Row::new(3, passage(5000));
        let chunks = chunker(false, 2048).chunk_row(&row);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, 0);
        assert_eq!(chunks[0].text, split_text(&row.text, 2048)[0]);
    }

    #[test]
    fn test_short_row_with_chunking_enabled() {
        let row = Row::new(1, "Short note.");
        let chunks = chunker(true, 2048).chunk_row(&row);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, 1);
        assert_eq!(chunks[0].text, "Short note.");
    }
}
