//! Tantivy-backed index store.
//!
//! Owns the index directory. Every mutation goes through a
//! [`WriteTransaction`], which holds the store's write gate for its
//! lifetime and becomes visible to readers only on [`WriteTransaction::commit`].
//! Readers get a fresh [`IndexSnapshot`] per call.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tantivy::collector::{DocSetCollector, TopDocs};
use tantivy::directory::MmapDirectory;
use tantivy::query::{AllQuery, Query};
use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value, STORED, STRING,
};
use tantivy::{
    doc, DocAddress, Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument,
    TantivyError, Term,
};
use tracing::{debug, info, warn};

use crate::analyzer::{Analyzer, ANALYZER_NAME};
use crate::config::IndexConfig;
use crate::error::{FailOpen, Result, SearchError};
use crate::query::WildcardPattern;
use crate::record::{DocField, DocumentRecord};

/// Heap size for the index writer (15MB), tantivy's per-thread minimum.
pub const DEFAULT_WRITER_HEAP_SIZE: usize = 15_000_000;

/// Lock file tantivy's `MmapDirectory` creates next to the segments while an
/// `IndexWriter` is alive.
pub const WRITER_LOCK_FILE: &str = ".tantivy-writer.lock";

/// Schema field handles.
#[derive(Debug, Clone, Copy)]
pub struct IndexFields {
    /// Raw, untokenized key used for delete-by-key.
    pub key: Field,
    pub name: Field,
    pub full_name: Field,
    pub content: Field,
}

impl IndexFields {
    fn resolve(schema: &Schema) -> Result<Self> {
        Ok(Self {
            key: schema.get_field("key")?,
            name: schema.get_field(DocField::Name.schema_name())?,
            full_name: schema.get_field(DocField::FullName.schema_name())?,
            content: schema.get_field(DocField::Content.schema_name())?,
        })
    }

    pub fn field(&self, field: DocField) -> Field {
        match field {
            DocField::Name => self.name,
            DocField::FullName => self.full_name,
            DocField::Content => self.content,
        }
    }
}

fn build_schema() -> Schema {
    let mut schema_builder = Schema::builder();

    // Untokenized so delete-by-key matches the exact path.
    schema_builder.add_text_field("key", STRING | STORED);

    let text_options = TextOptions::default().set_stored().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer(ANALYZER_NAME)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );
    for field in DocField::ALL {
        schema_builder.add_text_field(field.schema_name(), text_options.clone());
    }

    schema_builder.build()
}

/// A stored document with its relevance score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub score: f32,
    pub record: DocumentRecord,
}

/// Durable inverted index over [`DocumentRecord`]s.
pub struct IndexStore {
    index: Index,
    fields: IndexFields,
    analyzer: Analyzer,
    path: Option<PathBuf>,
    writer_heap_size: usize,
    write_gate: Mutex<()>,
}

impl std::fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexStore")
            .field("path", &self.path)
            .field("writer_heap_size", &self.writer_heap_size)
            .finish()
    }
}

impl IndexStore {
    /// Open or create a persistent index in `path`.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_heap(path, DEFAULT_WRITER_HEAP_SIZE)
    }

    /// Open the index described by `config`, resolving relative paths
    /// against `cwd`.
    pub fn from_config(config: &IndexConfig, cwd: &Path) -> Result<Self> {
        Self::open_with_heap(&config.resolve_dir(cwd), config.writer_heap_bytes)
    }

    fn open_with_heap(path: &Path, writer_heap_size: usize) -> Result<Self> {
        fs::create_dir_all(path).map_err(|e| SearchError::storage(path, e))?;
        let directory = MmapDirectory::open(path)?;
        let index = Index::open_or_create(directory, build_schema())?;
        debug!(path = %path.display(), "opened index");
        Self::from_index(index, Some(path.to_path_buf()), writer_heap_size)
    }

    /// Create an index that lives only in memory.
    pub fn in_memory() -> Result<Self> {
        let index = Index::create_in_ram(build_schema());
        Self::from_index(index, None, DEFAULT_WRITER_HEAP_SIZE)
    }

    fn from_index(index: Index, path: Option<PathBuf>, writer_heap_size: usize) -> Result<Self> {
        let analyzer = Analyzer::new();
        analyzer.register(&index);
        let fields = IndexFields::resolve(&index.schema())?;
        Ok(Self {
            index,
            fields,
            analyzer,
            path,
            writer_heap_size: writer_heap_size.max(DEFAULT_WRITER_HEAP_SIZE),
            write_gate: Mutex::new(()),
        })
    }

    /// Directory holding the index, `None` for in-memory stores.
    pub fn location(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    /// Begin a write transaction.
    ///
    /// Blocks while another transaction on this store is open, so holding
    /// one and calling a mutating method of the same store on the same
    /// thread deadlocks.
    pub fn transaction(&self) -> Result<WriteTransaction<'_>> {
        let gate = self.lock_gate();
        let writer = self.acquire_writer()?;
        Ok(WriteTransaction {
            writer,
            fields: self.fields,
            staged: 0,
            _gate: gate,
        })
    }

    /// Insert `record`, replacing any document with the same key.
    pub fn upsert(&self, record: &DocumentRecord) -> Result<()> {
        let mut transaction = self.transaction()?;
        transaction.replace(record)?;
        transaction.commit()?;
        Ok(())
    }

    /// Upsert every record in one commit. Later records win over earlier
    /// ones with the same key.
    pub fn upsert_batch(&self, records: &[DocumentRecord]) -> Result<()> {
        let mut transaction = self.transaction()?;
        for record in records {
            transaction.replace(record)?;
        }
        let staged = transaction.commit()?;
        info!(documents = staged, "committed batch");
        Ok(())
    }

    /// Remove the document stored under `key`. Absent keys are a no-op.
    pub fn delete_by_key(&self, key: &str) -> Result<()> {
        let mut transaction = self.transaction()?;
        transaction.delete(key);
        transaction.commit()?;
        Ok(())
    }

    /// Remove every document. Failures are logged and reported as `false`.
    pub fn clear(&self) -> bool {
        self.try_clear()
            .map(|()| true)
            .fail_open_with("clearing index", false)
    }

    fn try_clear(&self) -> Result<()> {
        let mut transaction = self.transaction()?;
        transaction.delete_all()?;
        transaction.commit()?;
        info!("cleared index");
        Ok(())
    }

    /// Merge all segments into one and drop obsolete files.
    ///
    /// Does not change search results. Serialized with writers through the
    /// write gate.
    pub fn optimize(&self) -> Result<()> {
        let _gate = self.lock_gate();
        let mut writer = self.acquire_writer()?;

        let metas = self.index.searchable_segment_metas()?;
        let needs_merge = metas.len() > 1 || metas.iter().any(|meta| meta.has_deletes());
        if needs_merge {
            let segment_ids: Vec<_> = metas.iter().map(|meta| meta.id()).collect();
            info!(segments = segment_ids.len(), "merging segments");
            writer.merge(&segment_ids).wait()?;
        }
        writer.garbage_collect_files().wait()?;
        writer.wait_merging_threads()?;
        Ok(())
    }

    /// Open a consistent read snapshot of the last commit.
    pub fn open_reader(&self) -> Result<IndexSnapshot> {
        let reader: IndexReader = self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        Ok(IndexSnapshot {
            searcher: reader.searcher(),
            fields: self.fields,
        })
    }

    /// Number of live documents in the last commit.
    pub fn num_docs(&self) -> Result<u64> {
        Ok(self.open_reader()?.searcher().num_docs())
    }

    /// Number of searchable segments in the last commit.
    pub fn segment_count(&self) -> Result<usize> {
        Ok(self.index.searchable_segment_ids()?.len())
    }

    /// Every stored document, ordered by key.
    pub fn documents(&self) -> Result<Vec<DocumentRecord>> {
        self.open_reader()?.documents()
    }

    fn lock_gate(&self) -> MutexGuard<'_, ()> {
        self.write_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an `IndexWriter`, clearing a stale writer lock once if needed.
    fn acquire_writer(&self) -> Result<IndexWriter> {
        match self
            .index
            .writer::<TantivyDocument>(self.writer_heap_size)
        {
            Ok(writer) => Ok(writer),
            Err(TantivyError::LockFailure(lock_error, _)) => {
                let Some(path) = &self.path else {
                    return Err(SearchError::index(format!(
                        "index writer lock is busy: {:?}",
                        lock_error
                    )));
                };
                warn!(
                    path = %path.display(),
                    error = ?lock_error,
                    "index writer lock is held, clearing stale lock"
                );
                clear_stale_lock(path)?;
                Ok(self
                    .index
                    .writer::<TantivyDocument>(self.writer_heap_size)?)
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Remove a leftover writer lock file from `index_dir`.
fn clear_stale_lock(index_dir: &Path) -> Result<()> {
    let lock_path = index_dir.join(WRITER_LOCK_FILE);
    match fs::remove_file(&lock_path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SearchError::storage(lock_path, e)),
    }
}

/// Staged index mutations. Dropping without [`commit`](Self::commit)
/// discards them.
pub struct WriteTransaction<'a> {
    writer: IndexWriter,
    fields: IndexFields,
    staged: usize,
    _gate: MutexGuard<'a, ()>,
}

impl WriteTransaction<'_> {
    /// Stage delete-then-insert for `record.key`.
    pub fn replace(&mut self, record: &DocumentRecord) -> Result<()> {
        self.delete(&record.key);
        self.writer.add_document(doc!(
            self.fields.key => record.key.as_str(),
            self.fields.name => record.display_name.as_str(),
            self.fields.full_name => record.key.as_str(),
            self.fields.content => record.content.as_str(),
        ))?;
        self.staged += 1;
        Ok(())
    }

    /// Stage removal of the document stored under `key`.
    pub fn delete(&mut self, key: &str) {
        self.writer
            .delete_term(Term::from_field_text(self.fields.key, key));
    }

    /// Stage removal of every document.
    pub fn delete_all(&mut self) -> Result<()> {
        self.writer.delete_all_documents()?;
        Ok(())
    }

    /// Make the staged changes durable and visible to new readers.
    /// Returns the number of documents written.
    pub fn commit(mut self) -> Result<usize> {
        let opstamp = self.writer.commit()?;
        debug!(opstamp, documents = self.staged, "committed");
        let staged = self.staged;
        self.writer.wait_merging_threads()?;
        Ok(staged)
    }
}

/// A read-only view of one commit.
pub struct IndexSnapshot {
    searcher: Searcher,
    fields: IndexFields,
}

impl IndexSnapshot {
    pub fn searcher(&self) -> &Searcher {
        &self.searcher
    }

    pub fn fields(&self) -> IndexFields {
        self.fields
    }

    /// Best `limit` documents for `query`, highest score first.
    pub fn top_documents(&self, query: &dyn Query, limit: usize) -> Result<Vec<ScoredDocument>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let top_docs = self.searcher.search(query, &TopDocs::with_limit(limit))?;
        top_docs
            .into_iter()
            .map(|(score, address)| {
                Ok(ScoredDocument {
                    score,
                    record: self.load(address)?,
                })
            })
            .collect()
    }

    /// Every live document, ordered by key.
    pub fn documents(&self) -> Result<Vec<DocumentRecord>> {
        let addresses = self.searcher.search(&AllQuery, &DocSetCollector)?;
        let mut records = addresses
            .into_iter()
            .map(|address| self.load(address))
            .collect::<Result<Vec<_>>>()?;
        records.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(records)
    }

    /// Index terms of `field` matching `pattern`, at most `limit`, in
    /// lexicographic order.
    pub fn expand_terms(
        &self,
        field: Field,
        pattern: &WildcardPattern,
        limit: usize,
    ) -> Result<Vec<String>> {
        let prefix = pattern.literal_prefix().as_bytes();
        let mut matched = BTreeSet::new();

        'segments: for segment_reader in self.searcher.segment_readers() {
            let inverted_index = segment_reader.inverted_index(field)?;
            let mut stream = inverted_index.terms().range().ge(prefix).into_stream()?;
            while stream.advance() {
                let key = stream.key();
                if !key.starts_with(prefix) {
                    break;
                }
                let Ok(candidate) = std::str::from_utf8(key) else {
                    continue;
                };
                if pattern.matches(candidate) {
                    matched.insert(candidate.to_string());
                    if matched.len() >= limit {
                        warn!(
                            prefix = pattern.literal_prefix(),
                            limit, "wildcard expansion truncated"
                        );
                        break 'segments;
                    }
                }
            }
        }

        Ok(matched.into_iter().collect())
    }

    fn load(&self, address: DocAddress) -> Result<DocumentRecord> {
        let doc: TantivyDocument = self.searcher.doc(address)?;
        let text = |field: Field| {
            doc.get_first(field)
                .and_then(|value| value.as_str())
                .unwrap_or_default()
                .to_string()
        };
        Ok(DocumentRecord {
            key: text(self.fields.key),
            display_name: text(self.fields.name),
            content: text(self.fields.content),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tantivy::query::TermQuery;

    fn sample_records() -> Vec<DocumentRecord> {
        vec![
            DocumentRecord::new(
                "/docs/install.md",
                "install.md",
                "# Install\nRun the installer and follow the prompts.",
            ),
            DocumentRecord::new(
                "/docs/usage.md",
                "usage.md",
                "# Usage\nSearch the index with keywords.",
            ),
            DocumentRecord::new(
                "/docs/faq.md",
                "faq.md",
                "# FAQ\nThe index is rebuilt on every run.",
            ),
        ]
    }

    fn content_hits(store: &IndexStore, word: &str) -> Vec<String> {
        let snapshot = store.open_reader().unwrap();
        let query = TermQuery::new(
            Term::from_field_text(snapshot.fields().content, word),
            IndexRecordOption::WithFreqs,
        );
        snapshot
            .top_documents(&query, 10)
            .unwrap()
            .into_iter()
            .map(|hit| hit.record.key)
            .collect()
    }

    #[test]
    fn test_in_memory_store_starts_empty() {
        let store = IndexStore::in_memory().unwrap();
        assert_eq!(store.num_docs().unwrap(), 0);
        assert!(store.location().is_none());
    }

    #[test]
    fn test_upsert_batch_and_read_back() {
        let store = IndexStore::in_memory().unwrap();
        store.upsert_batch(&sample_records()).unwrap();
        assert_eq!(store.num_docs().unwrap(), 3);

        let documents = store.documents().unwrap();
        let keys: Vec<&str> = documents.iter().map(|d| d.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["/docs/faq.md", "/docs/install.md", "/docs/usage.md"]
        );
        assert_eq!(documents[1], sample_records()[0]);
    }

    #[test]
    fn test_upsert_twice_keeps_one_document() {
        let store = IndexStore::in_memory().unwrap();
        let record = sample_records().remove(0);
        store.upsert(&record).unwrap();
        store.upsert(&record).unwrap();
        assert_eq!(store.num_docs().unwrap(), 1);
    }

    #[test]
    fn test_upsert_replaces_content() {
        let store = IndexStore::in_memory().unwrap();
        store.upsert_batch(&sample_records()).unwrap();

        let updated = DocumentRecord::new("/docs/install.md", "install.md", "Use the package manager.");
        store.upsert(&updated).unwrap();

        assert_eq!(store.num_docs().unwrap(), 3);
        assert!(content_hits(&store, "installer").is_empty());
        assert_eq!(content_hits(&store, "package"), vec!["/docs/install.md"]);
    }

    #[test]
    fn test_duplicate_keys_in_one_batch_keep_the_last() {
        let store = IndexStore::in_memory().unwrap();
        store
            .upsert_batch(&[
                DocumentRecord::new("/a.md", "a.md", "first version"),
                DocumentRecord::new("/a.md", "a.md", "second version"),
            ])
            .unwrap();
        assert_eq!(store.num_docs().unwrap(), 1);
        assert!(content_hits(&store, "first").is_empty());
        assert_eq!(content_hits(&store, "second"), vec!["/a.md"]);
    }

    #[test]
    fn test_delete_by_key() {
        let store = IndexStore::in_memory().unwrap();
        store.upsert_batch(&sample_records()).unwrap();

        store.delete_by_key("/docs/usage.md").unwrap();
        assert_eq!(store.num_docs().unwrap(), 2);
        assert!(content_hits(&store, "keywords").is_empty());
    }

    #[test]
    fn test_delete_missing_key_is_noop() {
        let store = IndexStore::in_memory().unwrap();
        store.upsert_batch(&sample_records()).unwrap();
        store.delete_by_key("/nowhere.md").unwrap();
        assert_eq!(store.num_docs().unwrap(), 3);
    }

    #[test]
    fn test_clear_reports_success() {
        let store = IndexStore::in_memory().unwrap();
        store.upsert_batch(&sample_records()).unwrap();
        assert!(store.clear());
        assert_eq!(store.num_docs().unwrap(), 0);
        assert!(store.clear(), "clearing an empty index still succeeds");
    }

    #[test]
    fn test_uncommitted_transaction_is_invisible() {
        let store = IndexStore::in_memory().unwrap();
        {
            let mut transaction = store.transaction().unwrap();
            transaction.replace(&sample_records()[0]).unwrap();
            assert_eq!(store.num_docs().unwrap(), 0);
            // dropped without commit
        }
        assert_eq!(store.num_docs().unwrap(), 0);
    }

    #[test]
    fn test_snapshot_does_not_see_later_commits() {
        let store = IndexStore::in_memory().unwrap();
        store.upsert(&sample_records()[0]).unwrap();
        let snapshot = store.open_reader().unwrap();
        store.upsert(&sample_records()[1]).unwrap();

        assert_eq!(snapshot.searcher().num_docs(), 1);
        assert_eq!(store.open_reader().unwrap().searcher().num_docs(), 2);
    }

    #[test]
    fn test_optimize_merges_segments() {
        let store = IndexStore::in_memory().unwrap();
        for record in sample_records() {
            store.upsert(&record).unwrap();
        }
        store.delete_by_key("/docs/faq.md").unwrap();

        store.optimize().unwrap();
        assert_eq!(store.segment_count().unwrap(), 1);
        assert_eq!(store.num_docs().unwrap(), 2);
        assert_eq!(content_hits(&store, "installer"), vec!["/docs/install.md"]);
    }

    #[test]
    fn test_expand_terms_by_prefix() {
        let store = IndexStore::in_memory().unwrap();
        store.upsert_batch(&sample_records()).unwrap();
        let snapshot = store.open_reader().unwrap();

        let expansions = snapshot
            .expand_terms(
                snapshot.fields().content,
                &WildcardPattern::new("inst*"),
                10,
            )
            .unwrap();
        assert_eq!(expansions, vec!["install", "installer"]);

        let limited = snapshot
            .expand_terms(snapshot.fields().content, &WildcardPattern::new("in*"), 1)
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_persistent_store_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = IndexStore::open(dir.path()).unwrap();
            store.upsert_batch(&sample_records()).unwrap();
        }
        let store = IndexStore::open(dir.path()).unwrap();
        assert_eq!(store.num_docs().unwrap(), 3);
        assert_eq!(store.location(), Some(dir.path()));
    }

    #[test]
    fn test_leftover_lock_file_does_not_block_writes() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = IndexStore::open(dir.path()).unwrap();
            store.upsert(&sample_records()[0]).unwrap();
        }
        fs::write(dir.path().join(WRITER_LOCK_FILE), b"").unwrap();

        let store = IndexStore::open(dir.path()).unwrap();
        store.upsert(&sample_records()[1]).unwrap();
        assert_eq!(store.num_docs().unwrap(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_held_lock_is_cleared_and_write_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let abandoned = IndexStore::open(dir.path()).unwrap();
        let held = abandoned.transaction().unwrap();

        let store = IndexStore::open(dir.path()).unwrap();
        store.upsert(&sample_records()[0]).unwrap();
        drop(held);

        assert_eq!(store.num_docs().unwrap(), 1);
    }

    #[test]
    fn test_clear_stale_lock_without_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        clear_stale_lock(dir.path()).unwrap();
    }
}
