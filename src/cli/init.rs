//! Init command for marksearch.
//!
//! Scaffolds the project `.marksearch/` directory, its `config.toml` and the
//! user-level home directory.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{marksearch_home, project_dir};

/// Options for the init command.
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Overwrite an existing config file.
    pub force: bool,
}

/// Output format for the init command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitOutput {
    /// Whether initialization was successful.
    pub success: bool,
    /// Files and directories created.
    pub created: Vec<String>,
    /// Files and directories that already existed.
    pub skipped: Vec<String>,
    /// Error message if initialization failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InitOutput {
    /// Create a successful output.
    pub fn success(created: Vec<String>, skipped: Vec<String>) -> Self {
        Self {
            success: true,
            created,
            skipped,
            error: None,
        }
    }

    /// Create a failed output, keeping what was created before the failure.
    pub fn failure(error: impl Into<String>, created: Vec<String>, skipped: Vec<String>) -> Self {
        Self {
            success: false,
            created,
            skipped,
            error: Some(error.into()),
        }
    }
}

/// Default config.toml content.
pub const DEFAULT_CONFIG: &str = r#"# marksearch configuration
#
# Environment variables override these values:
# MARKSEARCH_INDEX_DIR, MARKSEARCH_MAX_HITS, MARKSEARCH_SEARCH_MODE,
# MARKSEARCH_FRAGMENT_SIZE, MARKSEARCH_MAX_FRAGMENTS.

[index]
# Relative paths resolve against the project root.
# Default: .marksearch/index
# dir = "search-index"
writer_heap_bytes = 15000000

[search]
max_hits = 1000
# mode: "fuzzy" (every word is a prefix) or "raw" (full query syntax)
mode = "fuzzy"
max_expansions = 1024

[highlight]
pre_tag = '<span style="font-weight:bold; background-color:yellow;">'
post_tag = "</span>"
max_fragments = 5
fragment_size = 1000
separator = " ... "

[ingest]
extensions = ["md"]
max_file_bytes = 10485760
"#;

/// The init command implementation.
pub struct InitCommand {
    cwd: PathBuf,
}

impl InitCommand {
    /// Create a new init command.
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self { cwd: cwd.into() }
    }

    /// Run the init command.
    pub fn run(&self, options: &InitOptions) -> InitOutput {
        let mut created = Vec::new();
        let mut skipped = Vec::new();

        let dir = project_dir(&self.cwd);
        match ensure_dir(&dir) {
            Ok(true) => created.push(dir.display().to_string()),
            Ok(false) => skipped.push(dir.display().to_string()),
            Err(e) => return InitOutput::failure(e, created, skipped),
        }

        let config_path = dir.join("config.toml");
        match ensure_file(&config_path, DEFAULT_CONFIG, options.force) {
            Ok(true) => created.push(config_path.display().to_string()),
            Ok(false) => skipped.push(config_path.display().to_string()),
            Err(e) => return InitOutput::failure(e, created, skipped),
        }

        if let Some(home) = marksearch_home() {
            match ensure_dir(&home) {
                Ok(true) => created.push(home.display().to_string()),
                Ok(false) => skipped.push(home.display().to_string()),
                Err(e) => return InitOutput::failure(e, created, skipped),
            }
        }

        InitOutput::success(created, skipped)
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &InitOutput, options: &InitOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &InitOutput) -> String {
        let mut lines = Vec::new();

        if !output.created.is_empty() {
            lines.push("Created:".to_string());
            for path in &output.created {
                lines.push(format!("  {}", path));
            }
        }

        if !output.skipped.is_empty() {
            lines.push("Already present:".to_string());
            for path in &output.skipped {
                lines.push(format!("  {}", path));
            }
        }

        if let Some(error) = &output.error {
            lines.push(format!("Init failed: {}", error));
        }

        lines.push(String::new());
        lines.join("\n")
    }
}

/// Returns `Ok(true)` if the directory was created.
fn ensure_dir(path: &Path) -> Result<bool, String> {
    if path.exists() {
        if path.is_dir() {
            return Ok(false);
        }
        return Err(format!("{} exists but is not a directory", path.display()));
    }

    fs::create_dir_all(path)
        .map_err(|e| format!("Failed to create directory {}: {}", path.display(), e))?;

    Ok(true)
}

/// Returns `Ok(true)` if the file was written.
fn ensure_file(path: &Path, content: &str, force: bool) -> Result<bool, String> {
    if path.exists() && !force {
        return Ok(false);
    }

    fs::write(path, content)
        .map_err(|e| format!("Failed to write file {}: {}", path.display(), e))?;

    Ok(true)
}
