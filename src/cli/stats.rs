//! Stats command for marksearch.
//!
//! Reports document and segment counts and the on-disk size of the index.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::store::IndexStore;

/// Options for the stats command.
#[derive(Debug, Clone, Default)]
pub struct StatsOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// Output format for the stats command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsOutput {
    /// Whether stats were collected.
    pub success: bool,
    /// Index directory, absent for in-memory indexes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_dir: Option<String>,
    /// Live documents.
    pub documents: u64,
    /// Searchable segments.
    pub segments: usize,
    /// Total size of the index directory in bytes.
    pub size_bytes: u64,
    /// When the stats were collected (RFC 3339).
    pub generated_at: String,
    /// Error message if collection failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatsOutput {
    /// Create a failed output.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            index_dir: None,
            documents: 0,
            segments: 0,
            size_bytes: 0,
            generated_at: Utc::now().to_rfc3339(),
            error: Some(error.into()),
        }
    }
}

/// The stats command implementation.
pub struct StatsCommand<'a> {
    store: &'a IndexStore,
}

impl<'a> StatsCommand<'a> {
    /// Create a new stats command.
    pub fn new(store: &'a IndexStore) -> Self {
        Self { store }
    }

    /// Run the stats command.
    pub fn run(&self) -> StatsOutput {
        match self.collect() {
            Ok(output) => output,
            Err(e) => StatsOutput::failure(e.to_string()),
        }
    }

    fn collect(&self) -> Result<StatsOutput> {
        let location = self.store.location();
        Ok(StatsOutput {
            success: true,
            index_dir: location.map(|path| path.display().to_string()),
            documents: self.store.num_docs()?,
            segments: self.store.segment_count()?,
            size_bytes: location.map(dir_size).unwrap_or(0),
            generated_at: Utc::now().to_rfc3339(),
            error: None,
        })
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &StatsOutput, options: &StatsOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &StatsOutput) -> String {
        if !output.success {
            return format!(
                "Stats failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            );
        }

        let mut lines = Vec::new();
        lines.push(format!(
            "Index:     {}",
            output.index_dir.as_deref().unwrap_or("(in memory)")
        ));
        lines.push(format!("Documents: {}", output.documents));
        lines.push(format!("Segments:  {}", output.segments));
        lines.push(format!("Size:      {}", format_bytes(output.size_bytes)));
        lines.push(String::new());
        lines.join("\n")
    }
}

/// Sum of file sizes directly inside `dir`. Unreadable entries count as zero.
fn dir_size(dir: &Path) -> u64 {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .filter_map(|entry| entry.metadata().ok())
                .filter(|metadata| metadata.is_file())
                .map(|metadata| metadata.len())
                .sum()
        })
        .unwrap_or(0)
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DocumentRecord;
    use tempfile::TempDir;

    #[test]
    fn test_stats_in_memory() {
        let store = IndexStore::in_memory().unwrap();
        store
            .upsert(&DocumentRecord::new("/a.md", "a.md", "alpha"))
            .unwrap();

        let output = StatsCommand::new(&store).run();
        assert!(output.success);
        assert_eq!(output.documents, 1);
        assert_eq!(output.segments, 1);
        assert!(output.index_dir.is_none());
        assert_eq!(output.size_bytes, 0);
    }

    #[test]
    fn test_stats_on_disk() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::open(dir.path()).unwrap();
        store
            .upsert(&DocumentRecord::new("/a.md", "a.md", "alpha"))
            .unwrap();

        let cmd = StatsCommand::new(&store);
        let output = cmd.run();
        assert!(output.size_bytes > 0);
        assert_eq!(
            output.index_dir.as_deref(),
            Some(dir.path().display().to_string().as_str())
        );

        let text = cmd.format_output(&output, &StatsOptions::default());
        assert!(text.contains("Documents: 1"));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
