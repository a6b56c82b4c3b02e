//! Search command for marksearch.
//!
//! Runs one query against the index and prints ranked, highlighted hits.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::record::SearchResult;
use crate::search::{SearchEngine, SearchMode};
use crate::store::IndexStore;

use super::format_hit;

/// Options for the search command.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Maximum number of results.
    pub limit: Option<usize>,
    /// Parse the query with the full syntax instead of prefix matching.
    pub raw: bool,
}

/// Output format for the search command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutput {
    /// Whether the search was successful.
    pub success: bool,
    /// The search query used.
    pub query: String,
    /// How the query was interpreted.
    pub mode: SearchMode,
    /// Number of results found.
    pub count: usize,
    /// The search results, best first.
    pub results: Vec<SearchResult>,
    /// Error message if search failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchOutput {
    /// Create a successful output.
    pub fn success(query: impl Into<String>, mode: SearchMode, results: Vec<SearchResult>) -> Self {
        let count = results.len();
        Self {
            success: true,
            query: query.into(),
            mode,
            count,
            results,
            error: None,
        }
    }

    /// Create a failed output.
    pub fn failure(query: impl Into<String>, mode: SearchMode, error: impl Into<String>) -> Self {
        Self {
            success: false,
            query: query.into(),
            mode,
            count: 0,
            results: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// The search command implementation.
pub struct SearchCommand<'a> {
    store: &'a IndexStore,
    config: Config,
}

impl<'a> SearchCommand<'a> {
    /// Create a new search command.
    pub fn new(store: &'a IndexStore, config: Config) -> Self {
        Self { store, config }
    }

    /// Run the search command with the given query.
    pub fn run(&self, query: &str, options: &SearchOptions) -> SearchOutput {
        let mode = if options.raw {
            SearchMode::Raw
        } else {
            self.config.search.mode
        };

        let mut engine = SearchEngine::with_config(self.store, &self.config);
        if let Some(limit) = options.limit {
            engine = engine.with_max_hits(limit.min(self.config.search.max_hits));
        }

        match engine.search_with_mode(query, mode) {
            Ok(results) => SearchOutput::success(query.trim(), mode, results),
            Err(e) => SearchOutput::failure(query.trim(), mode, e.to_string()),
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &SearchOutput, options: &SearchOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &SearchOutput) -> String {
        if !output.success {
            return format!(
                "Search failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            );
        }

        if output.results.is_empty() {
            return format!("No documents found for query: \"{}\"\n", output.query);
        }

        let mut lines = Vec::new();
        lines.push(format!(
            "Found {} document(s) for query: \"{}\"\n",
            output.count, output.query
        ));

        for (i, result) in output.results.iter().enumerate() {
            lines.push(format_hit(i + 1, result));
            for line in result.content.lines().filter(|l| !l.trim().is_empty()).take(3) {
                lines.push(format!("   {}", line.trim()));
            }
            lines.push(String::new());
        }

        lines.join("\n")
    }
}
