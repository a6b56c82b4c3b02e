//! Text analysis shared by indexing, querying and highlighting.
//!
//! The same pipeline must run on both the write path and the read path,
//! otherwise query terms silently stop matching indexed terms. The store
//! registers it on every index it opens under [`ANALYZER_NAME`], and the
//! query engine and highlighter tokenize through the same [`Analyzer`].

use tantivy::tokenizer::{LowerCaser, RemoveLongFilter, SimpleTokenizer, TextAnalyzer, TokenStream};
use tantivy::Index;

/// Name the analyzer is registered under in the index's tokenizer manager.
pub const ANALYZER_NAME: &str = "markdown";

/// Tokens longer than this (in bytes) are dropped, matching tantivy's
/// default limit.
const MAX_TOKEN_LEN: usize = 255;

/// A normalized term with its byte span in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzedToken {
    /// Normalized (lowercased) term text.
    pub text: String,
    /// Byte offset of the first byte of the token in the original text.
    pub offset_from: usize,
    /// Byte offset one past the last byte of the token.
    pub offset_to: usize,
    /// Token position (0-based).
    pub position: usize,
}

/// Splits on non-alphanumeric boundaries and lowercases. No stop words,
/// no stemming.
#[derive(Clone)]
pub struct Analyzer {
    inner: TextAnalyzer,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("name", &ANALYZER_NAME)
            .finish()
    }
}

impl Analyzer {
    pub fn new() -> Self {
        let inner = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
            .filter(LowerCaser)
            .build();
        Self { inner }
    }

    /// Register this pipeline on an index so text fields configured with
    /// [`ANALYZER_NAME`] are indexed with it.
    pub fn register(&self, index: &Index) {
        index.tokenizers().register(ANALYZER_NAME, self.inner.clone());
    }

    /// Normalized terms of `text`, in order.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let mut analyzer = self.inner.clone();
        let mut stream = analyzer.token_stream(text);
        let mut terms = Vec::new();
        while let Some(token) = stream.next() {
            terms.push(token.text.clone());
        }
        terms
    }

    /// Normalized tokens of `text` with their byte offsets.
    pub fn tokens(&self, text: &str) -> Vec<AnalyzedToken> {
        let mut analyzer = self.inner.clone();
        let mut stream = analyzer.token_stream(text);
        let mut tokens = Vec::new();
        while let Some(token) = stream.next() {
            tokens.push(AnalyzedToken {
                text: token.text.clone(),
                offset_from: token.offset_from,
                offset_to: token.offset_to,
                position: token.position,
            });
        }
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_tokenize_lowercases_and_splits() {
        let analyzer = Analyzer::new();
        assert_eq!(
            analyzer.tokenize("# Title\nSome searchable-body TEXT"),
            vec!["title", "some", "searchable", "body", "text"]
        );
    }

    #[test]
    fn test_tokenize_keeps_stop_words() {
        let analyzer = Analyzer::new();
        assert_eq!(
            analyzer.tokenize("the and of"),
            vec!["the", "and", "of"]
        );
    }

    #[test]
    fn test_tokenize_splits_paths() {
        let analyzer = Analyzer::new();
        assert_eq!(
            analyzer.tokenize("/docs/getting_started.md"),
            vec!["docs", "getting", "started", "md"]
        );
    }

    #[test]
    fn test_tokens_carry_byte_offsets() {
        let analyzer = Analyzer::new();
        let text = "Héllo wörld";
        let tokens = analyzer.tokens(text);
        assert_eq!(tokens.len(), 2);
        assert_eq!(&text[tokens[0].offset_from..tokens[0].offset_to], "Héllo");
        assert_eq!(tokens[0].text, "héllo");
        assert_eq!(&text[tokens[1].offset_from..tokens[1].offset_to], "wörld");
        assert_eq!(tokens[1].position, 1);
    }

    #[test]
    fn test_empty_and_punctuation_only() {
        let analyzer = Analyzer::new();
        assert!(analyzer.tokenize("").is_empty());
        assert!(analyzer.tokenize("--- *** ...").is_empty());
    }

    proptest! {
        #[test]
        fn prop_tokenize_is_idempotent(text in "[a-zA-Z0-9 ,.#_-]{0,64}") {
            let analyzer = Analyzer::new();
            let once = analyzer.tokenize(&text);
            let twice = analyzer.tokenize(&once.join(" "));
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_token_offsets_slice_original(text in "[a-zA-Z0-9éöüÉÖÜ .,#_-]{0,64}") {
            let analyzer = Analyzer::new();
            for token in analyzer.tokens(&text) {
                let slice = &text[token.offset_from..token.offset_to];
                prop_assert_eq!(slice.to_lowercase(), token.text);
            }
        }
    }
}
