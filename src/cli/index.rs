//! Index command for marksearch.
//!
//! Walks a directory for Markdown files and upserts them in one batch.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::Config;
use crate::corpus::CorpusWalker;
use crate::error::Result;
use crate::store::IndexStore;

/// Options for the index command.
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Remove every indexed document before adding the new ones.
    pub rebuild: bool,
}

/// A file that was not indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedInfo {
    pub path: String,
    pub reason: String,
}

/// Output format for the index command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexOutput {
    /// Whether indexing was successful.
    pub success: bool,
    /// Directory that was walked.
    pub root: String,
    /// Documents written in this run.
    pub indexed: usize,
    /// Documents in the index afterwards.
    pub total: u64,
    /// Files that could not be read.
    pub skipped: Vec<SkippedInfo>,
    /// Error message if indexing failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IndexOutput {
    /// Create a failed output.
    pub fn failure(root: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            root: root.into(),
            indexed: 0,
            total: 0,
            skipped: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// The index command implementation.
pub struct IndexCommand<'a> {
    store: &'a IndexStore,
    walker: CorpusWalker,
}

impl<'a> IndexCommand<'a> {
    /// Create a new index command.
    pub fn new(store: &'a IndexStore, config: &Config) -> Self {
        Self {
            store,
            walker: CorpusWalker::from_config(&config.ingest),
        }
    }

    /// Run the index command over `root`.
    pub fn run(&self, root: &Path, options: &IndexOptions) -> IndexOutput {
        let root_display = root.display().to_string();
        match self.index(root, options) {
            Ok(output) => output,
            Err(e) => IndexOutput::failure(root_display, e.to_string()),
        }
    }

    fn index(&self, root: &Path, options: &IndexOptions) -> Result<IndexOutput> {
        let corpus = self.walker.walk(root)?;
        let skipped = corpus
            .skipped()
            .iter()
            .map(|file| SkippedInfo {
                path: file.path.display().to_string(),
                reason: file.reason.clone(),
            })
            .collect();

        let records = corpus.into_records();
        {
            let mut transaction = self.store.transaction()?;
            if options.rebuild {
                transaction.delete_all()?;
            }
            for record in &records {
                transaction.replace(record)?;
            }
            transaction.commit()?;
        }

        Ok(IndexOutput {
            success: true,
            root: root.display().to_string(),
            indexed: records.len(),
            total: self.store.num_docs()?,
            skipped,
            error: None,
        })
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &IndexOutput, options: &IndexOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &IndexOutput) -> String {
        if !output.success {
            return format!(
                "Indexing failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            );
        }

        let mut lines = vec![format!(
            "Indexed {} file(s) from {} ({} document(s) in index)",
            output.indexed, output.root, output.total
        )];
        for file in &output.skipped {
            lines.push(format!("  skipped {}: {}", file.path, file.reason));
        }
        lines.push(String::new());
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn corpus_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.md"), "alpha").unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.md"), "beta").unwrap();
        fs::write(dir.path().join("c.txt"), "ignored").unwrap();
        dir
    }

    #[test]
    fn test_index_directory() {
        let dir = corpus_dir();
        let store = IndexStore::in_memory().unwrap();
        let cmd = IndexCommand::new(&store, &Config::default());

        let output = cmd.run(dir.path(), &IndexOptions::default());
        assert!(output.success);
        assert_eq!(output.indexed, 2);
        assert_eq!(output.total, 2);

        // Re-indexing replaces instead of duplicating.
        let output = cmd.run(dir.path(), &IndexOptions::default());
        assert_eq!(output.total, 2);
    }

    #[test]
    fn test_rebuild_drops_removed_files() {
        let dir = corpus_dir();
        let store = IndexStore::in_memory().unwrap();
        let cmd = IndexCommand::new(&store, &Config::default());
        cmd.run(dir.path(), &IndexOptions::default());

        fs::remove_file(dir.path().join("a.md")).unwrap();
        let output = cmd.run(dir.path(), &IndexOptions::default());
        assert_eq!(output.total, 2);

        let output = cmd.run(
            dir.path(),
            &IndexOptions {
                rebuild: true,
                ..IndexOptions::default()
            },
        );
        assert_eq!(output.total, 1);
    }

    #[test]
    fn test_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::in_memory().unwrap();
        let cmd = IndexCommand::new(&store, &Config::default());

        let output = cmd.run(&dir.path().join("missing"), &IndexOptions::default());
        assert!(!output.success);
        assert!(cmd
            .format_output(&output, &IndexOptions::default())
            .starts_with("Indexing failed"));
    }
}
