//! Quoted SQL identifiers for the configured tables.

use super::config::StorageConfig;

/// Quote a possibly schema-qualified identifier for PostgreSQL.
///
/// Each dot-separated part is wrapped in double quotes. Already double-quoted
/// parts are unwrapped and re-escaped, and `[bracketed]` parts lose their brackets.
pub fn quote_identifier(name: &str) -> String {
    split_parts(name.trim())
        .into_iter()
        .map(|part| quote_part(part.trim()))
        .collect::<Vec<_>>()
        .join(".")
}

/// The unquoted last part of an identifier, for deriving index names.
pub fn base_name(name: &str) -> String {
    let last = split_parts(name.trim())
        .pop()
        .map(|p| p.trim().to_string())
        .unwrap_or_default();
    let unwrapped = unwrap_part(&last);
    unwrapped
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn split_parts(name: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut in_brackets = false;
    let mut start = 0;

    for (i, c) in name.char_indices() {
        match c {
            '"' if !in_brackets => in_quotes = !in_quotes,
            '[' if !in_quotes => in_brackets = true,
            ']' if !in_quotes => in_brackets = false,
            '.' if !in_quotes && !in_brackets => {
                parts.push(&name[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&name[start..]);
    parts
}

fn unwrap_part(part: &str) -> String {
    if part.len() >= 2 && part.starts_with('"') && part.ends_with('"') {
        part[1..part.len() - 1].replace("\"\"", "\"")
    } else if part.len() >= 2 && part.starts_with('[') && part.ends_with(']') {
        part[1..part.len() - 1].to_string()
    } else {
        part.to_string()
    }
}

/// Unwrap any existing quoting and re-escape, so inner quotes always come in pairs.
fn quote_part(part: &str) -> String {
    format!("\"{}\"", unwrap_part(part).replace('"', "\"\""))
}

/// Quoted identifiers of the source table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub table: String,
    pub id_column: String,
    pub text_column: String,
    pub embedding_column: String,
}

impl TableInfo {
    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            table: quote_identifier(&config.table_name),
            id_column: quote_identifier(&config.id_column),
            text_column: quote_identifier(&config.content_column),
            embedding_column: quote_identifier(&config.embedding_column),
        }
    }
}

/// Quoted identifiers of the child table holding one embedding per chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedicatedTableInfo {
    pub table: String,
    pub parent_id_column: String,
    pub chunk_id_column: String,
    pub chunk_text_column: String,
    pub embedding_column: String,
    pub parent_index: String,
}

impl DedicatedTableInfo {
    pub fn new(table_name: &str, config: &StorageConfig) -> Self {
        let parent_index = format!(
            "{}_{}_idx",
            base_name(table_name),
            base_name(&config.parent_id_column)
        );
        Self {
            table: quote_identifier(table_name),
            parent_id_column: quote_identifier(&config.parent_id_column),
            chunk_id_column: quote_identifier(&config.chunk_id_column),
            chunk_text_column: quote_identifier(&config.chunk_text_column),
            embedding_column: quote_identifier(&config.embedding_column),
            parent_index: quote_identifier(&parent_index),
        }
    }
}
