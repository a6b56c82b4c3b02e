//! Search facade: query parsing, execution, ranking and highlighting.
//!
//! Two entry points share one pipeline:
//!
//! - [`SearchEngine::search_raw`] parses the input with the full query
//!   grammar.
//! - [`SearchEngine::search`] first rewrites the input into a prefix query
//!   (`hello world` becomes `hello* world*`), so partial words match.
//!
//! Blank input (after removing `*` and `?`) returns no results without
//! opening a reader.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::error::{Result, SearchError};
use crate::highlight::Highlighter;
use crate::query::{is_blank_query, QueryEngine};
use crate::record::SearchResult;
use crate::store::IndexStore;

/// Default cap on hits per query.
pub const DEFAULT_MAX_HITS: usize = 1000;

/// How query input is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Every word becomes a prefix match.
    #[default]
    Fuzzy,
    /// The input is parsed as written.
    Raw,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMode::Fuzzy => f.write_str("fuzzy"),
            SearchMode::Raw => f.write_str("raw"),
        }
    }
}

impl FromStr for SearchMode {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fuzzy" => Ok(SearchMode::Fuzzy),
            "raw" => Ok(SearchMode::Raw),
            other => Err(SearchError::config(format!("unknown search mode '{}'", other))),
        }
    }
}

/// Rewrite free text into a prefix query: hyphens become spaces and every
/// remaining word gets a trailing `*`. `None` when no word is left.
pub fn fuzzy_query_string(input: &str) -> Option<String> {
    let words: Vec<String> = input
        .replace('-', " ")
        .split_whitespace()
        .map(|word| format!("{}*", word))
        .collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

/// Runs queries against one [`IndexStore`].
#[derive(Debug)]
pub struct SearchEngine<'a> {
    store: &'a IndexStore,
    query_engine: QueryEngine,
    highlighter: Highlighter,
    max_hits: usize,
    mode: SearchMode,
}

impl<'a> SearchEngine<'a> {
    pub fn new(store: &'a IndexStore) -> Self {
        let analyzer = store.analyzer().clone();
        Self {
            store,
            query_engine: QueryEngine::new(analyzer.clone()),
            highlighter: Highlighter::new(analyzer),
            max_hits: DEFAULT_MAX_HITS,
            mode: SearchMode::default(),
        }
    }

    pub fn with_config(store: &'a IndexStore, config: &Config) -> Self {
        let analyzer = store.analyzer().clone();
        Self {
            store,
            query_engine: QueryEngine::new(analyzer.clone())
                .with_max_expansions(config.search.max_expansions),
            highlighter: Highlighter::from_config(analyzer, &config.highlight),
            max_hits: config.search.max_hits,
            mode: config.search.mode,
        }
    }

    pub fn with_max_hits(mut self, max_hits: usize) -> Self {
        self.max_hits = max_hits;
        self
    }

    pub fn with_highlighter(mut self, highlighter: Highlighter) -> Self {
        self.highlighter = highlighter;
        self
    }

    /// Mode used by [`search_default`](Self::search_default).
    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    /// Prefix search over every word of `input`.
    pub fn search(&self, input: &str) -> Result<Vec<SearchResult>> {
        match fuzzy_query_string(input) {
            Some(query) => self.execute(&query),
            None => Ok(Vec::new()),
        }
    }

    /// Search with `input` parsed as written.
    pub fn search_raw(&self, input: &str) -> Result<Vec<SearchResult>> {
        self.execute(input)
    }

    pub fn search_with_mode(&self, input: &str, mode: SearchMode) -> Result<Vec<SearchResult>> {
        match mode {
            SearchMode::Fuzzy => self.search(input),
            SearchMode::Raw => self.search_raw(input),
        }
    }

    /// Search in the configured mode.
    pub fn search_default(&self, input: &str) -> Result<Vec<SearchResult>> {
        self.search_with_mode(input, self.mode)
    }

    fn execute(&self, query_text: &str) -> Result<Vec<SearchResult>> {
        if is_blank_query(query_text) {
            return Ok(Vec::new());
        }

        let parsed = self.query_engine.parse(query_text);
        let snapshot = self.store.open_reader()?;
        let Some(compiled) = self.query_engine.compile(&snapshot, parsed.query())? else {
            debug!(query = query_text, "query has no searchable terms");
            return Ok(Vec::new());
        };

        let hits = snapshot.top_documents(compiled.query(), self.max_hits)?;
        debug!(
            query = query_text,
            fallback = parsed.is_fallback(),
            hits = hits.len(),
            "executed search"
        );

        let terms = compiled.terms();
        Ok(hits
            .into_iter()
            .map(|hit| SearchResult {
                name: self.highlighter.highlight(&hit.record.display_name, terms),
                content: self.highlighter.highlight(&hit.record.content, terms),
                full_name: hit.record.key,
                score: hit.score,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::highlight::{DEFAULT_POST_TAG, DEFAULT_PRE_TAG};
    use crate::record::DocumentRecord;

    fn store_with(records: &[DocumentRecord]) -> IndexStore {
        let store = IndexStore::in_memory().unwrap();
        store.upsert_batch(records).unwrap();
        store
    }

    fn names(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.full_name.as_str()).collect()
    }

    #[test]
    fn test_fuzzy_query_string() {
        assert_eq!(
            fuzzy_query_string("hello world").as_deref(),
            Some("hello* world*")
        );
        assert_eq!(
            fuzzy_query_string("  multi-word  term ").as_deref(),
            Some("multi* word* term*")
        );
        assert_eq!(fuzzy_query_string(""), None);
        assert_eq!(fuzzy_query_string(" - -- "), None);
    }

    #[test]
    fn test_search_mode_parse_and_display() {
        assert_eq!("RAW".parse::<SearchMode>().unwrap(), SearchMode::Raw);
        assert_eq!("fuzzy".parse::<SearchMode>().unwrap(), SearchMode::Fuzzy);
        assert!("exact".parse::<SearchMode>().is_err());
        assert_eq!(SearchMode::Raw.to_string(), "raw");
    }

    #[test]
    fn test_blank_queries_return_nothing() {
        let store = store_with(&[DocumentRecord::new("/a.md", "a.md", "anything at all")]);
        let engine = SearchEngine::new(&store);
        for input in ["", "   ", "**", "??", "* ?"] {
            assert!(engine.search(input).unwrap().is_empty(), "fuzzy {:?}", input);
            assert!(engine.search_raw(input).unwrap().is_empty(), "raw {:?}", input);
        }
    }

    #[test]
    fn test_fuzzy_matches_word_prefixes() {
        let store = store_with(&[
            DocumentRecord::new("/one.md", "one.md", "Hello there"),
            DocumentRecord::new("/two.md", "two.md", "World peace"),
            DocumentRecord::new("/three.md", "three.md", "Nothing relevant"),
        ]);
        let engine = SearchEngine::new(&store);

        let mut found = names(&engine.search("hello world").unwrap())
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        found.sort();
        assert_eq!(found, vec!["/one.md", "/two.md"]);

        let partial = engine.search("hel").unwrap();
        assert_eq!(names(&partial), vec!["/one.md"]);
    }

    #[test]
    fn test_round_trip_with_highlight() {
        let store = store_with(&[DocumentRecord::new(
            "/docs/a.md",
            "a.md",
            "# Title\nSome searchable body text",
        )]);
        let engine = SearchEngine::new(&store);

        let results = engine.search("searchable").unwrap();
        assert_eq!(results.len(), 1);
        let hit = &results[0];
        assert_eq!(hit.full_name, "/docs/a.md");
        assert_eq!(hit.name, "a.md");
        assert!(hit.content.contains(&format!(
            "{}searchable{}",
            DEFAULT_PRE_TAG, DEFAULT_POST_TAG
        )));
        assert!(hit.score > 0.0);
    }

    #[test]
    fn test_words_with_punctuation_match_in_both_modes() {
        let store = store_with(&[
            DocumentRecord::new("/docs/readme.md", "readme.md", "Project overview"),
            DocumentRecord::new("/docs/b.md", "b.md", "Please don't panic, see v1.2 notes"),
        ]);
        let engine = SearchEngine::new(&store);

        for (input, expected) in [
            ("readme.md", "/docs/readme.md"),
            ("don't", "/docs/b.md"),
            ("v1.2", "/docs/b.md"),
            ("Panic,", "/docs/b.md"),
        ] {
            let fuzzy = engine.search(input).unwrap();
            assert_eq!(names(&fuzzy), vec![expected], "fuzzy {:?}", input);
            let raw = engine.search_raw(input).unwrap();
            assert_eq!(names(&raw), vec![expected], "raw {:?}", input);
        }
    }

    #[test]
    fn test_wildcard_with_punctuation_requires_every_piece() {
        let store = store_with(&[
            DocumentRecord::new("/docs/readme.md", "readme.md", "Project overview"),
            DocumentRecord::new("/docs/readme.txt", "readme.txt", "Plain text"),
            DocumentRecord::new("/docs/read.md", "guide.md", "Read this first"),
        ]);
        let engine = SearchEngine::new(&store).with_highlighter(Highlighter::default().with_tags("[", "]"));

        let results = engine.search_raw("name:read*.md").unwrap();
        assert_eq!(names(&results), vec!["/docs/readme.md"]);
        assert_eq!(results[0].name, "[readme].[md]");

        let results = engine.search("readme.m").unwrap();
        assert_eq!(names(&results), vec!["/docs/readme.md"]);
    }

    #[test]
    fn test_name_is_highlighted_and_full_name_is_not() {
        let store = store_with(&[DocumentRecord::new(
            "/docs/install.md",
            "install.md",
            "Steps to set things up",
        )]);
        let engine = SearchEngine::new(&store).with_highlighter(Highlighter::default().with_tags("[", "]"));

        let results = engine.search("install").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "[install].md");
        assert_eq!(results[0].full_name, "/docs/install.md");
        assert_eq!(results[0].content, "Steps to set things up");
    }

    #[test]
    fn test_more_occurrences_rank_higher() {
        let store = store_with(&[
            DocumentRecord::new("/once.md", "once.md", "rust notes about python"),
            DocumentRecord::new("/thrice.md", "thrice.md", "rust rust rust notes"),
        ]);
        let engine = SearchEngine::new(&store);

        for results in [engine.search("rust").unwrap(), engine.search_raw("rust").unwrap()] {
            assert_eq!(names(&results), vec!["/thrice.md", "/once.md"]);
            assert!(results[0].score > results[1].score);
        }
    }

    #[test]
    fn test_malformed_raw_query_falls_back_to_literal() {
        let store = store_with(&[
            DocumentRecord::new("/a.md", "a.md", "hello there"),
            DocumentRecord::new("/b.md", "b.md", "unrelated"),
        ]);
        let engine = SearchEngine::new(&store);

        let results = engine.search_raw("hello (world").unwrap();
        assert_eq!(names(&results), vec!["/a.md"]);

        let results = engine.search_raw("\"unterminated hello").unwrap();
        assert_eq!(names(&results), vec!["/a.md"]);
    }

    #[test]
    fn test_raw_query_operators() {
        let store = store_with(&[
            DocumentRecord::new("/a.md", "a.md", "install on linux"),
            DocumentRecord::new("/b.md", "b.md", "install on windows"),
        ]);
        let engine = SearchEngine::new(&store);

        let results = engine.search_raw("install -windows").unwrap();
        assert_eq!(names(&results), vec!["/a.md"]);

        let results = engine.search_raw("name:b*").unwrap();
        assert_eq!(names(&results), vec!["/b.md"]);
    }

    #[test]
    fn test_max_hits_caps_results() {
        let records: Vec<DocumentRecord> = (0..5)
            .map(|i| DocumentRecord::new(format!("/{}.md", i), format!("{}.md", i), "shared words"))
            .collect();
        let store = store_with(&records);

        let engine = SearchEngine::new(&store).with_max_hits(2);
        assert_eq!(engine.search("shared").unwrap().len(), 2);

        let engine = SearchEngine::new(&store).with_max_hits(0);
        assert!(engine.search("shared").unwrap().is_empty());
    }

    #[test]
    fn test_deleted_documents_are_not_found() {
        let store = store_with(&[
            DocumentRecord::new("/a.md", "a.md", "ephemeral"),
            DocumentRecord::new("/b.md", "b.md", "ephemeral too"),
        ]);
        store.delete_by_key("/a.md").unwrap();

        let results = SearchEngine::new(&store).search("ephemeral").unwrap();
        assert_eq!(names(&results), vec!["/b.md"]);
    }

    #[test]
    fn test_optimize_preserves_results_and_scores() {
        let store = IndexStore::in_memory().unwrap();
        for (key, content) in [
            ("/a.md", "alpha beta gamma"),
            ("/b.md", "alpha alpha delta"),
            ("/c.md", "gamma delta epsilon alpha"),
        ] {
            store
                .upsert(&DocumentRecord::new(key, key.trim_start_matches('/'), content))
                .unwrap();
        }
        let engine = SearchEngine::new(&store);
        let before = engine.search("alpha gamma").unwrap();

        store.optimize().unwrap();
        assert_eq!(store.segment_count().unwrap(), 1);
        let after = engine.search("alpha gamma").unwrap();

        assert_eq!(before.len(), after.len());
        for hit in &before {
            let same = after
                .iter()
                .find(|other| other.full_name == hit.full_name)
                .unwrap();
            assert!((same.score - hit.score).abs() < 1e-4);
            assert_eq!(same.content, hit.content);
        }
    }

    #[test]
    fn test_with_config_uses_settings() {
        let store = store_with(&[DocumentRecord::new("/a.md", "a.md", "configured highlight")]);
        let mut config = Config::default();
        config.highlight.pre_tag = "<em>".to_string();
        config.highlight.post_tag = "</em>".to_string();
        config.search.mode = SearchMode::Raw;

        let engine = SearchEngine::with_config(&store, &config);
        assert_eq!(engine.mode(), SearchMode::Raw);
        let results = engine.search_default("configured").unwrap();
        assert_eq!(results[0].content, "<em>configured</em> highlight");
    }
}
