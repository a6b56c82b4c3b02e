//! List command for marksearch.
//!
//! Lists the documents stored in the index, ordered by key.

use serde::{Deserialize, Serialize};

use crate::record::DocumentRecord;
use crate::store::IndexStore;

/// Options for the list command.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Maximum number of documents shown.
    pub limit: Option<usize>,
}

/// One stored document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    /// Display name.
    pub name: String,
    /// Key the document is stored under.
    pub path: String,
    /// Stored content length in bytes.
    pub bytes: usize,
}

impl From<&DocumentRecord> for DocumentInfo {
    fn from(record: &DocumentRecord) -> Self {
        Self {
            name: record.display_name.clone(),
            path: record.key.clone(),
            bytes: record.content.len(),
        }
    }
}

/// Output format for the list command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListOutput {
    /// Whether the list was successful.
    pub success: bool,
    /// Documents in the index.
    pub total: usize,
    /// The documents shown.
    pub documents: Vec<DocumentInfo>,
    /// Error message if listing failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ListOutput {
    /// Create a successful output.
    pub fn success(total: usize, documents: Vec<DocumentInfo>) -> Self {
        Self {
            success: true,
            total,
            documents,
            error: None,
        }
    }

    /// Create a failed output.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            total: 0,
            documents: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// The list command implementation.
pub struct ListCommand<'a> {
    store: &'a IndexStore,
}

impl<'a> ListCommand<'a> {
    /// Create a new list command.
    pub fn new(store: &'a IndexStore) -> Self {
        Self { store }
    }

    /// Run the list command.
    pub fn run(&self, options: &ListOptions) -> ListOutput {
        match self.store.documents() {
            Ok(records) => {
                let total = records.len();
                let documents = records
                    .iter()
                    .take(options.limit.unwrap_or(usize::MAX))
                    .map(DocumentInfo::from)
                    .collect();
                ListOutput::success(total, documents)
            }
            Err(e) => ListOutput::failure(e.to_string()),
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &ListOutput, options: &ListOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &ListOutput) -> String {
        if !output.success {
            return format!(
                "List failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            );
        }

        if output.documents.is_empty() {
            return "No documents indexed.\n".to_string();
        }

        let mut lines = vec![format!(
            "Showing {} of {} document(s):\n",
            output.documents.len(),
            output.total
        )];
        for doc in &output.documents {
            lines.push(format!("  {} ({} bytes)", doc.name, doc.bytes));
            lines.push(format!("    {}", doc.path));
        }
        lines.push(String::new());
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> IndexStore {
        let store = IndexStore::in_memory().unwrap();
        store
            .upsert_batch(&[
                DocumentRecord::new("/z/last.md", "last.md", "zzz"),
                DocumentRecord::new("/a/first.md", "first.md", "a"),
            ])
            .unwrap();
        store
    }

    #[test]
    fn test_list_sorted_by_key() {
        let store = store();
        let output = ListCommand::new(&store).run(&ListOptions::default());

        assert!(output.success);
        assert_eq!(output.total, 2);
        assert_eq!(output.documents[0].path, "/a/first.md");
        assert_eq!(output.documents[1].bytes, 3);
    }

    #[test]
    fn test_list_limit() {
        let store = store();
        let cmd = ListCommand::new(&store);
        let options = ListOptions {
            limit: Some(1),
            ..ListOptions::default()
        };
        let output = cmd.run(&options);

        assert_eq!(output.total, 2);
        assert_eq!(output.documents.len(), 1);
        assert!(cmd
            .format_output(&output, &options)
            .starts_with("Showing 1 of 2 document(s)"));
    }

    #[test]
    fn test_list_empty() {
        let store = IndexStore::in_memory().unwrap();
        let cmd = ListCommand::new(&store);
        let output = cmd.run(&ListOptions::default());
        assert_eq!(
            cmd.format_output(&output, &ListOptions::default()),
            "No documents indexed.\n"
        );
    }
}
