use std::fmt::Write as FmtWrite;

use serde::Serialize;

use crate::models::{OutputFormat, StorageVariant};
use crate::services::RunStats;

pub trait Formatter {
    fn format_run_summary(&self, summary: &RunSummary) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

/// Result of `run`, with enough context to read it on its own.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub variant: StorageVariant,
    pub target: String,
    pub model: String,
    pub endpoints: usize,
    pub workers: usize,
    #[serde(flatten)]
    pub stats: RunStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub variant: StorageVariant,
    pub target: String,
    pub connected: bool,
    /// `None` when the database could not be queried.
    pub pending_rows: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_run_summary(&self, summary: &RunSummary) -> String {
        let stats = &summary.stats;
        let mut output = String::new();
        writeln!(output, "Vectorization Complete").unwrap();
        writeln!(output, "----------------------").unwrap();
        writeln!(output, "Storage:           {} ({})", summary.target, summary.variant).unwrap();
        writeln!(output, "Model:             {}", summary.model).unwrap();
        writeln!(
            output,
            "Workers:           {} over {} endpoint(s)",
            summary.workers, summary.endpoints
        )
        .unwrap();
        writeln!(output, "Rows pending:      {}", stats.total_pending).unwrap();
        writeln!(output, "Rows completed:    {}", stats.rows_completed).unwrap();
        writeln!(output, "Chunks embedded:   {}", stats.chunks_embedded).unwrap();
        writeln!(output, "Pages:             {}", stats.pages).unwrap();
        writeln!(output, "Provider calls:    {}", stats.provider_calls).unwrap();
        if stats.throttled_retries > 0 {
            writeln!(output, "Throttled retries: {}", stats.throttled_retries).unwrap();
        }
        writeln!(output, "Duration:          {}ms", stats.duration_ms).unwrap();
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "Status").unwrap();
        writeln!(output, "------").unwrap();

        let db_status = if status.connected {
            "[CONNECTED]"
        } else {
            "[DISCONNECTED]"
        };
        writeln!(output, "Database:      {}", db_status).unwrap();
        writeln!(output, "  Layout:      {}", status.variant).unwrap();
        writeln!(output, "  Target:      {}", status.target).unwrap();
        match status.pending_rows {
            Some(pending) => writeln!(output, "  Pending:     {}", pending).unwrap(),
            None => writeln!(output, "  Pending:     unknown").unwrap(),
        }
        if let Some(ref error) = status.error {
            writeln!(output, "  Error:       {}", error).unwrap();
        }

        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render<T: Serialize>(&self, value: &T) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
    }
}

impl Formatter for JsonFormatter {
    fn format_run_summary(&self, summary: &RunSummary) -> String {
        format!("{}\n", self.render(summary))
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        format!("{}\n", self.render(status))
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", serde_json::json!({"message": message}))
    }

    fn format_error(&self, error: &str) -> String {
        format!("{}\n", serde_json::json!({"error": error}))
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
    }
}
