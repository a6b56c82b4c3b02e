//! Markdown corpus walking.
//!
//! Collects every file with a configured extension under a root directory
//! into [`DocumentRecord`]s keyed by absolute path. Unreadable entries are
//! logged and skipped; only a missing or non-directory root is an error.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::{IngestConfig, PROJECT_DIR_NAME};
use crate::error::{Result, SearchError};
use crate::record::DocumentRecord;
use crate::util::{has_extension, read_to_string_with_limit};

/// Directory names never descended into.
const SKIPPED_DIRS: &[&str] = &[".git", PROJECT_DIR_NAME];

/// A file that could not be ingested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Records collected from one walk.
#[derive(Debug, Default)]
pub struct Corpus {
    records: Vec<DocumentRecord>,
    skipped: Vec<SkippedFile>,
}

impl Corpus {
    pub fn records(&self) -> &[DocumentRecord] {
        &self.records
    }

    pub fn skipped(&self) -> &[SkippedFile] {
        &self.skipped
    }

    /// First record whose display name is `name`.
    pub fn get(&self, name: &str) -> Option<&DocumentRecord> {
        self.records.iter().find(|record| record.display_name == name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<DocumentRecord> {
        self.records
    }
}

/// Recursive file collector.
#[derive(Debug, Clone)]
pub struct CorpusWalker {
    extensions: Vec<String>,
    max_file_bytes: u64,
}

impl Default for CorpusWalker {
    fn default() -> Self {
        Self::from_config(&IngestConfig::default())
    }
}

impl CorpusWalker {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            extensions: config
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_string())
                .collect(),
            max_file_bytes: config.max_file_bytes,
        }
    }

    /// Walk `root`. Entries are visited in name order, so the result is
    /// deterministic.
    pub fn walk(&self, root: &Path) -> Result<Corpus> {
        let root = fs::canonicalize(root).map_err(|e| SearchError::storage(root, e))?;
        if !root.is_dir() {
            return Err(SearchError::ingest(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let mut corpus = Corpus::default();
        self.walk_dir(&root, &mut corpus);
        debug!(
            root = %root.display(),
            documents = corpus.records.len(),
            skipped = corpus.skipped.len(),
            "walked corpus"
        );
        Ok(corpus)
    }

    fn walk_dir(&self, dir: &Path, corpus: &mut Corpus) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "cannot read directory");
                corpus.skipped.push(SkippedFile {
                    path: dir.to_path_buf(),
                    reason: e.to_string(),
                });
                return;
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.path()),
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "cannot read directory entry");
                    None
                }
            })
            .collect();
        paths.sort();

        for path in paths {
            if path.is_dir() {
                let skipped = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| SKIPPED_DIRS.contains(&name));
                if !skipped {
                    self.walk_dir(&path, corpus);
                }
            } else if has_extension(&path, &self.extensions) {
                self.read_file(path, corpus);
            }
        }
    }

    fn read_file(&self, path: PathBuf, corpus: &mut Corpus) {
        match read_to_string_with_limit(&path, self.max_file_bytes) {
            Ok(content) => {
                let display_name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                corpus.records.push(DocumentRecord::new(
                    path.to_string_lossy().into_owned(),
                    display_name,
                    content,
                ));
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping file");
                corpus.skipped.push(SkippedFile {
                    path,
                    reason: e.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_walk_collects_markdown_recursively() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "README.md", "# Readme");
        write(dir.path(), "docs/guide.MD", "# Guide");
        write(dir.path(), "docs/deep/nested/page.md", "deep");
        write(dir.path(), "src/main.rs", "fn main() {}");
        write(dir.path(), "notes.txt", "plain");

        let corpus = CorpusWalker::default().walk(dir.path()).unwrap();

        let mut names: Vec<&str> = corpus
            .records()
            .iter()
            .map(|r| r.display_name.as_str())
            .collect();
        names.sort();
        assert_eq!(names, vec!["README.md", "guide.MD", "page.md"]);
        assert!(corpus.skipped().is_empty());
    }

    #[test]
    fn test_keys_are_absolute_paths() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "docs/a.md", "alpha");

        let corpus = CorpusWalker::default().walk(dir.path()).unwrap();
        let record = corpus.get("a.md").unwrap();

        assert!(Path::new(&record.key).is_absolute());
        assert!(record.key.ends_with("a.md"));
        assert_eq!(record.content, "alpha");
    }

    #[test]
    fn test_skips_git_and_project_dirs() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), ".git/info.md", "git");
        write(dir.path(), ".marksearch/index/notes.md", "index");
        write(dir.path(), "kept.md", "kept");

        let corpus = CorpusWalker::default().walk(dir.path()).unwrap();
        assert_eq!(corpus.len(), 1);
        assert!(corpus.get("kept.md").is_some());
    }

    #[test]
    fn test_oversized_and_invalid_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "big.md", &"x".repeat(64));
        fs::write(dir.path().join("binary.md"), [0xff, 0xfe]).unwrap();
        write(dir.path(), "small.md", "ok");

        let walker = CorpusWalker::from_config(&IngestConfig {
            max_file_bytes: 16,
            ..IngestConfig::default()
        });
        let corpus = walker.walk(dir.path()).unwrap();

        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus.skipped().len(), 2);
    }

    #[test]
    fn test_custom_extensions() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.markdown", "one");
        write(dir.path(), "b.md", "two");

        let walker = CorpusWalker::from_config(&IngestConfig {
            extensions: vec![".markdown".to_string()],
            ..IngestConfig::default()
        });
        let corpus = walker.walk(dir.path()).unwrap();
        assert_eq!(corpus.into_records().len(), 1);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(CorpusWalker::default().walk(&dir.path().join("absent")).is_err());

        write(dir.path(), "file.md", "x");
        let err = CorpusWalker::default()
            .walk(&dir.path().join("file.md"))
            .unwrap_err();
        assert!(matches!(err, SearchError::Ingest { .. }));
    }
}
