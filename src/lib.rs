//! marksearch - full-text search over a tree of Markdown documents.
//!
//! Markdown files are ingested as [`DocumentRecord`]s into a tantivy-backed
//! [`IndexStore`], queried through a [`SearchEngine`] that parses, ranks and
//! highlights, and returned as [`SearchResult`]s.
//!
//! ```ignore
//! use marksearch::{CorpusWalker, IndexStore, SearchEngine};
//!
//! let store = IndexStore::open(Path::new(".marksearch/index"))?;
//! let corpus = CorpusWalker::default().walk(Path::new("docs"))?;
//! store.upsert_batch(corpus.records())?;
//!
//! for hit in SearchEngine::new(&store).search("getting start")? {
//!     println!("{} {}", hit.full_name, hit.score);
//! }
//! ```

pub mod analyzer;
pub mod cli;
pub mod config;
pub mod corpus;
pub mod error;
pub mod highlight;
pub mod logging;
pub mod query;
pub mod record;
pub mod search;
pub mod store;
pub mod util;

pub use analyzer::Analyzer;
pub use config::Config;
pub use corpus::{Corpus, CorpusWalker};
pub use error::{FailOpen, Result, SearchError};
pub use highlight::{Highlighter, QueryTerms};
pub use query::{parse, ParsedQuery, QueryEngine, QueryNode};
pub use record::{DocField, DocumentRecord, SearchResult};
pub use search::{fuzzy_query_string, SearchEngine, SearchMode};
pub use store::{IndexSnapshot, IndexStore, WriteTransaction};

// CLI commands
pub use cli::{
    IndexCommand, InitCommand, ListCommand, MaintainCommand, SearchCommand, ShellCommand,
    StatsCommand,
};
