//! Maintenance commands for marksearch: delete, clear and optimize.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};
use crate::store::IndexStore;

/// Options for the maintenance commands.
#[derive(Debug, Clone, Default)]
pub struct MaintainOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// Actions available in maintain.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase", tag = "action", content = "key")]
pub enum MaintainAction {
    /// Remove the document stored under a key.
    Delete(String),
    /// Remove every document.
    Clear,
    /// Merge segments and drop obsolete files.
    Optimize,
}

impl MaintainAction {
    fn name(&self) -> &'static str {
        match self {
            MaintainAction::Delete(_) => "delete",
            MaintainAction::Clear => "clear",
            MaintainAction::Optimize => "optimize",
        }
    }
}

/// Output format for the maintenance commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintainOutput {
    /// Whether the operation was successful.
    pub success: bool,
    /// The action performed.
    pub action: String,
    /// Key targeted by `delete`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Documents in the index afterwards.
    pub documents: u64,
    /// Searchable segments afterwards.
    pub segments: usize,
    /// Error message if the operation failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The maintenance command implementation.
pub struct MaintainCommand<'a> {
    store: &'a IndexStore,
}

impl<'a> MaintainCommand<'a> {
    /// Create a new maintenance command.
    pub fn new(store: &'a IndexStore) -> Self {
        Self { store }
    }

    /// Run `action`.
    pub fn run(&self, action: &MaintainAction) -> MaintainOutput {
        let key = match action {
            MaintainAction::Delete(key) => Some(key.clone()),
            _ => None,
        };

        let result = match action {
            MaintainAction::Delete(key) => self.store.delete_by_key(key),
            MaintainAction::Clear => {
                if self.store.clear() {
                    Ok(())
                } else {
                    Err(SearchError::index("clearing the index failed"))
                }
            }
            MaintainAction::Optimize => self.store.optimize(),
        };

        match result.and_then(|()| self.counts()) {
            Ok((documents, segments)) => MaintainOutput {
                success: true,
                action: action.name().to_string(),
                key,
                documents,
                segments,
                error: None,
            },
            Err(e) => MaintainOutput {
                success: false,
                action: action.name().to_string(),
                key,
                documents: 0,
                segments: 0,
                error: Some(e.to_string()),
            },
        }
    }

    fn counts(&self) -> Result<(u64, usize)> {
        Ok((self.store.num_docs()?, self.store.segment_count()?))
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &MaintainOutput, options: &MaintainOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &MaintainOutput) -> String {
        if !output.success {
            return format!(
                "{} failed: {}\n",
                output.action,
                output.error.as_deref().unwrap_or("unknown error")
            );
        }

        let summary = match (output.action.as_str(), &output.key) {
            ("delete", Some(key)) => format!("Deleted {}", key),
            ("clear", _) => "Cleared index".to_string(),
            _ => "Optimized index".to_string(),
        };
        format!(
            "{} ({} document(s), {} segment(s))\n",
            summary, output.documents, output.segments
        )
    }
}
