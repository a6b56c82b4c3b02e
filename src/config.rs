//! Configuration loading for marksearch.
//!
//! Configuration follows a precedence chain:
//! 1. Environment variables (highest priority)
//! 2. Project config (`.marksearch/config.toml`)
//! 3. User config (`~/.marksearch/config.toml`)
//! 4. Defaults (lowest priority)
//!
//! All configuration is optional. The system runs with sensible defaults
//! when no config exists.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{FailOpen, Result, SearchError};
use crate::highlight::{
    DEFAULT_FRAGMENT_SIZE, DEFAULT_MAX_FRAGMENTS, DEFAULT_POST_TAG, DEFAULT_PRE_TAG,
    DEFAULT_SEPARATOR,
};
use crate::query::MAX_EXPANSIONS;
use crate::search::{SearchMode, DEFAULT_MAX_HITS};
use crate::store::DEFAULT_WRITER_HEAP_SIZE;

/// Name of the per-project directory holding config and the default index.
pub const PROJECT_DIR_NAME: &str = ".marksearch";

/// Index directory name inside the project directory.
pub const DEFAULT_INDEX_DIR_NAME: &str = "index";

/// Largest Markdown file read during ingestion (10 MB).
pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// Main configuration struct for marksearch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Index location and writer settings.
    pub index: IndexConfig,
    /// Query execution settings.
    pub search: SearchConfig,
    /// Result highlighting settings.
    pub highlight: HighlightConfig,
    /// Corpus walking settings.
    pub ingest: IngestConfig,
}

/// Index location and writer settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexConfig {
    /// Index directory. Relative paths resolve against the project root.
    /// Unset means `<project>/.marksearch/index`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Memory budget for the index writer.
    pub writer_heap_bytes: usize,
}

impl IndexConfig {
    /// Absolute index directory for a project rooted at `root`.
    pub fn resolve_dir(&self, root: &Path) -> PathBuf {
        match &self.dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => root.join(dir),
            None => root.join(PROJECT_DIR_NAME).join(DEFAULT_INDEX_DIR_NAME),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: None,
            writer_heap_bytes: DEFAULT_WRITER_HEAP_SIZE,
        }
    }
}

/// Query execution settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum number of hits returned per query.
    pub max_hits: usize,
    /// Mode used when the caller does not pick one.
    pub mode: SearchMode,
    /// Maximum index terms a single wildcard pattern expands to.
    pub max_expansions: usize,
}

impl SearchConfig {
    /// Check if a hit cap is valid (at least one hit).
    pub fn is_valid_max_hits(value: usize) -> bool {
        value >= 1
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_hits: DEFAULT_MAX_HITS,
            mode: SearchMode::default(),
            max_expansions: MAX_EXPANSIONS,
        }
    }
}

/// Result highlighting settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HighlightConfig {
    /// Marker inserted before each matching token.
    pub pre_tag: String,
    /// Marker inserted after each matching token.
    pub post_tag: String,
    /// Maximum fragments kept per field.
    pub max_fragments: usize,
    /// Fragment span in bytes.
    pub fragment_size: usize,
    /// Joins non-adjacent fragments.
    pub separator: String,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            pre_tag: DEFAULT_PRE_TAG.to_string(),
            post_tag: DEFAULT_POST_TAG.to_string(),
            max_fragments: DEFAULT_MAX_FRAGMENTS,
            fragment_size: DEFAULT_FRAGMENT_SIZE,
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }
}

/// Corpus walking settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestConfig {
    /// File extensions to index, matched case-insensitively, without dot.
    pub extensions: Vec<String>,
    /// Files larger than this are skipped.
    pub max_file_bytes: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["md".to_string()],
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

impl Config {
    /// Load configuration with full precedence chain, using the current
    /// directory's project root.
    pub fn load() -> Self {
        match env::current_dir() {
            Ok(cwd) => Self::load_from_cwd(&find_project_root(&cwd)),
            Err(_) => {
                let mut config = Config::default();
                if let Some(user_config) = Self::load_user_config() {
                    config = config.merge(user_config);
                }
                config.apply_env_overrides();
                config
            }
        }
    }

    /// Load configuration with a specific project root.
    pub fn load_from_cwd(cwd: &Path) -> Self {
        let mut config = Config::default();

        if let Some(user_config) = Self::load_user_config() {
            config = config.merge(user_config);
        }

        if let Some(project_config) = Self::load_project_config(cwd) {
            config = config.merge(project_config);
        }

        config.apply_env_overrides();

        config
    }

    fn load_user_config() -> Option<Config> {
        let home = marksearch_home()?;
        let config_path = home.join("config.toml");
        Self::load_optional(&config_path)
    }

    fn load_project_config(cwd: &Path) -> Option<Config> {
        let config_path = project_dir(cwd).join("config.toml");
        Self::load_optional(&config_path)
    }

    /// Missing files are silent; unreadable or invalid ones are warned about.
    fn load_optional(path: &Path) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        Self::load_from_file(path)
            .map(Some)
            .fail_open_default(&format!("loading {}", path.display()))
    }

    /// Load config from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path).map_err(|e| SearchError::storage(path, e))?;
        toml::from_str(&content).map_err(|e| SearchError::config(e.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        // MARKSEARCH_INDEX_DIR
        if let Ok(val) = env::var("MARKSEARCH_INDEX_DIR") {
            if val.trim().is_empty() {
                tracing::warn!("MARKSEARCH_INDEX_DIR is empty, ignoring");
            } else {
                self.index.dir = Some(PathBuf::from(val));
            }
        }

        // MARKSEARCH_MAX_HITS
        if let Ok(val) = env::var("MARKSEARCH_MAX_HITS") {
            match val.parse::<usize>() {
                Ok(n) if SearchConfig::is_valid_max_hits(n) => self.search.max_hits = n,
                _ => tracing::warn!(
                    "Invalid MARKSEARCH_MAX_HITS value '{}'. Expected a positive integer. \
                     Using '{}'.",
                    val,
                    self.search.max_hits
                ),
            }
        }

        // MARKSEARCH_SEARCH_MODE
        if let Ok(val) = env::var("MARKSEARCH_SEARCH_MODE") {
            match val.parse::<SearchMode>() {
                Ok(mode) => self.search.mode = mode,
                Err(_) => tracing::warn!(
                    "Invalid MARKSEARCH_SEARCH_MODE value '{}'. Valid values: fuzzy, raw. \
                     Using '{}'.",
                    val,
                    self.search.mode
                ),
            }
        }

        // MARKSEARCH_FRAGMENT_SIZE
        if let Ok(val) = env::var("MARKSEARCH_FRAGMENT_SIZE") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => self.highlight.fragment_size = n,
                _ => tracing::warn!(
                    "Invalid MARKSEARCH_FRAGMENT_SIZE value '{}'. Expected a positive integer. \
                     Using '{}'.",
                    val,
                    self.highlight.fragment_size
                ),
            }
        }

        // MARKSEARCH_MAX_FRAGMENTS
        if let Ok(val) = env::var("MARKSEARCH_MAX_FRAGMENTS") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => self.highlight.max_fragments = n,
                _ => tracing::warn!(
                    "Invalid MARKSEARCH_MAX_FRAGMENTS value '{}'. Expected a positive integer. \
                     Using '{}'.",
                    val,
                    self.highlight.max_fragments
                ),
            }
        }
    }

    /// Merge another config into this one, field by field.
    ///
    /// Non-default values in `other` win. A layer cannot set a value back to
    /// the default once a lower layer changed it.
    fn merge(mut self, other: Config) -> Self {
        if other.index.dir.is_some() {
            self.index.dir = other.index.dir;
        }
        let default_index = IndexConfig::default();
        if other.index.writer_heap_bytes != default_index.writer_heap_bytes {
            self.index.writer_heap_bytes = other.index.writer_heap_bytes;
        }

        let default_search = SearchConfig::default();
        if other.search.max_hits != default_search.max_hits {
            self.search.max_hits = other.search.max_hits;
        }
        if other.search.mode != default_search.mode {
            self.search.mode = other.search.mode;
        }
        if other.search.max_expansions != default_search.max_expansions {
            self.search.max_expansions = other.search.max_expansions;
        }

        let default_highlight = HighlightConfig::default();
        if other.highlight.pre_tag != default_highlight.pre_tag {
            self.highlight.pre_tag = other.highlight.pre_tag;
        }
        if other.highlight.post_tag != default_highlight.post_tag {
            self.highlight.post_tag = other.highlight.post_tag;
        }
        if other.highlight.max_fragments != default_highlight.max_fragments {
            self.highlight.max_fragments = other.highlight.max_fragments;
        }
        if other.highlight.fragment_size != default_highlight.fragment_size {
            self.highlight.fragment_size = other.highlight.fragment_size;
        }
        if other.highlight.separator != default_highlight.separator {
            self.highlight.separator = other.highlight.separator;
        }

        let default_ingest = IngestConfig::default();
        if other.ingest.extensions != default_ingest.extensions {
            self.ingest.extensions = other.ingest.extensions;
        }
        if other.ingest.max_file_bytes != default_ingest.max_file_bytes {
            self.ingest.max_file_bytes = other.ingest.max_file_bytes;
        }

        self
    }

    /// Save configuration to `.marksearch/config.toml` under `cwd`.
    ///
    /// Writes to a temp file and renames it into place.
    pub fn save_project(&self, cwd: &Path) -> Result<PathBuf> {
        let dir = cwd.join(PROJECT_DIR_NAME);

        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| SearchError::storage(&dir, e))?;
        }

        let config_path = dir.join("config.toml");

        let content =
            toml::to_string_pretty(self).map_err(|e| SearchError::config(e.to_string()))?;

        let temp_path = dir.join(".config.toml.tmp");
        fs::write(&temp_path, &content).map_err(|e| SearchError::storage(&temp_path, e))?;

        let file = fs::File::open(&temp_path).map_err(|e| SearchError::storage(&temp_path, e))?;
        file.sync_all()
            .map_err(|e| SearchError::storage(&temp_path, e))?;
        drop(file);

        fs::rename(&temp_path, &config_path).map_err(|e| SearchError::storage(&config_path, e))?;

        Ok(config_path)
    }
}

/// Get the marksearch home directory.
///
/// Checks `MARKSEARCH_HOME` first, then falls back to `~/.marksearch`.
/// An empty `MARKSEARCH_HOME` is ignored.
pub fn marksearch_home() -> Option<PathBuf> {
    if let Ok(home) = env::var("MARKSEARCH_HOME") {
        if home.is_empty() {
            tracing::warn!("MARKSEARCH_HOME is empty, using default");
        } else {
            let path = PathBuf::from(&home);
            if path.is_absolute() {
                return Some(path);
            }
            if let Ok(canonical) = path.canonicalize() {
                return Some(canonical);
            }
            tracing::warn!("MARKSEARCH_HOME is relative and doesn't exist, using as-is");
            return Some(path);
        }
    }

    if let Some(home) = dirs::home_dir() {
        return Some(home.join(PROJECT_DIR_NAME));
    }

    let fallback_path = fallback_home();
    tracing::warn!(
        "HOME not set, using fallback location: {}",
        fallback_path.display()
    );
    Some(fallback_path)
}

#[cfg(unix)]
fn fallback_home() -> PathBuf {
    use std::os::unix::fs::MetadataExt;
    let uid = std::fs::metadata("/").map(|m| m.uid()).unwrap_or(0);
    PathBuf::from(format!("/tmp/marksearch-{}", uid))
}

#[cfg(not(unix))]
fn fallback_home() -> PathBuf {
    std::env::temp_dir().join("marksearch")
}

/// Find the project root for a given working directory.
///
/// 1. The nearest ancestor (or `cwd` itself) holding a `.marksearch/` directory.
/// 2. The git repository root, via `git rev-parse --show-toplevel`.
/// 3. `cwd`.
pub fn find_project_root(cwd: &Path) -> PathBuf {
    for ancestor in cwd.ancestors() {
        if ancestor.join(PROJECT_DIR_NAME).is_dir() {
            return ancestor.to_path_buf();
        }
    }

    if let Ok(output) = std::process::Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .current_dir(cwd)
        .output()
    {
        if output.status.success() {
            if let Ok(path) = String::from_utf8(output.stdout) {
                let trimmed = path.trim();
                if !trimmed.is_empty() {
                    return PathBuf::from(trimmed);
                }
            }
        }
    }

    cwd.to_path_buf()
}

/// `<root>/.marksearch`.
pub fn project_dir(root: &Path) -> PathBuf {
    root.join(PROJECT_DIR_NAME)
}

/// `<marksearch_home>/crash.log`.
pub fn crash_log_path() -> Option<PathBuf> {
    marksearch_home().map(|h| h.join("crash.log"))
}
