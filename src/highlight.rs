//! Best-fragment highlighting of stored field values.
//!
//! Text is re-tokenized with the index analyzer, cut at token boundaries into
//! fragments of at most `fragment_size` bytes, and each fragment is scored by
//! the distinct query terms it contains. The best fragments are returned in
//! document order with every matching token wrapped in the configured tags.

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use crate::analyzer::Analyzer;
use crate::config::HighlightConfig;

pub const DEFAULT_PRE_TAG: &str = r#"<span style="font-weight:bold; background-color:yellow;">"#;
pub const DEFAULT_POST_TAG: &str = "</span>";
pub const DEFAULT_MAX_FRAGMENTS: usize = 5;
/// Fragment span in bytes.
pub const DEFAULT_FRAGMENT_SIZE: usize = 1000;
pub const DEFAULT_SEPARATOR: &str = " ... ";

/// Normalized query terms and their weights.
#[derive(Debug, Clone, Default)]
pub struct QueryTerms {
    weights: HashMap<String, f32>,
}

impl QueryTerms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `term`; a term seen twice keeps its highest weight.
    pub fn insert(&mut self, term: String, weight: f32) {
        let entry = self.weights.entry(term).or_insert(weight);
        if weight > *entry {
            *entry = weight;
        }
    }

    pub fn weight(&self, term: &str) -> Option<f32> {
        self.weights.get(term).copied()
    }

    pub fn contains(&self, term: &str) -> bool {
        self.weights.contains_key(term)
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.weights.iter().map(|(term, weight)| (term.as_str(), *weight))
    }
}

impl<S: Into<String>> FromIterator<S> for QueryTerms {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut terms = QueryTerms::new();
        for term in iter {
            terms.insert(term.into(), 1.0);
        }
        terms
    }
}

/// A scored byte range of the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    pub start: usize,
    pub end: usize,
    pub score: f32,
    /// Byte ranges of matching tokens, in order.
    pub hits: Vec<Range<usize>>,
}

impl TextFragment {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }
}

/// Marks query terms in stored text.
#[derive(Debug, Clone)]
pub struct Highlighter {
    analyzer: Analyzer,
    pre_tag: String,
    post_tag: String,
    max_fragments: usize,
    fragment_size: usize,
    separator: String,
}

impl Default for Highlighter {
    fn default() -> Self {
        Self::new(Analyzer::new())
    }
}

impl Highlighter {
    pub fn new(analyzer: Analyzer) -> Self {
        Self {
            analyzer,
            pre_tag: DEFAULT_PRE_TAG.to_string(),
            post_tag: DEFAULT_POST_TAG.to_string(),
            max_fragments: DEFAULT_MAX_FRAGMENTS,
            fragment_size: DEFAULT_FRAGMENT_SIZE,
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }

    pub fn from_config(analyzer: Analyzer, config: &HighlightConfig) -> Self {
        Self::new(analyzer)
            .with_tags(&config.pre_tag, &config.post_tag)
            .with_max_fragments(config.max_fragments)
            .with_fragment_size(config.fragment_size)
            .with_separator(&config.separator)
    }

    pub fn with_tags(mut self, pre_tag: &str, post_tag: &str) -> Self {
        self.pre_tag = pre_tag.to_string();
        self.post_tag = post_tag.to_string();
        self
    }

    pub fn with_max_fragments(mut self, max_fragments: usize) -> Self {
        self.max_fragments = max_fragments.max(1);
        self
    }

    pub fn with_fragment_size(mut self, fragment_size: usize) -> Self {
        self.fragment_size = fragment_size.max(1);
        self
    }

    pub fn with_separator(mut self, separator: &str) -> Self {
        self.separator = separator.to_string();
        self
    }

    /// Highlight `text`. Returns it unchanged when no query term occurs.
    pub fn highlight(&self, text: &str, terms: &QueryTerms) -> String {
        let fragments = self.best_fragments(text, terms);
        if fragments.is_empty() {
            return text.to_string();
        }

        let mut out = String::with_capacity(text.len());
        let mut previous_end: Option<usize> = None;
        for fragment in &fragments {
            if let Some(end) = previous_end {
                if end != fragment.start {
                    out.push_str(&self.separator);
                }
            }
            self.mark(text, fragment, &mut out);
            previous_end = Some(fragment.end);
        }
        out
    }

    /// The top-scoring fragments of `text`, in document order.
    pub fn best_fragments(&self, text: &str, terms: &QueryTerms) -> Vec<TextFragment> {
        if terms.is_empty() || text.is_empty() {
            return Vec::new();
        }

        let mut fragments = self.fragment(text, terms);
        fragments.retain(|fragment| fragment.score > 0.0);

        fragments.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.hits.len().cmp(&a.hits.len()))
                .then_with(|| a.start.cmp(&b.start))
        });
        fragments.truncate(self.max_fragments);
        fragments.sort_by_key(|fragment| fragment.start);
        fragments
    }

    /// Split `text` into contiguous fragments covering all of it.
    fn fragment(&self, text: &str, terms: &QueryTerms) -> Vec<TextFragment> {
        let mut fragments = Vec::new();
        let mut current = FragmentBuilder::new(0);

        for token in self.analyzer.tokens(text) {
            if token.offset_to - current.start > self.fragment_size
                && token.offset_from > current.start
            {
                let next = FragmentBuilder::new(token.offset_from);
                fragments.push(std::mem::replace(&mut current, next).finish(token.offset_from));
            }
            if let Some(weight) = terms.weight(&token.text) {
                current.hit(token.text, token.offset_from..token.offset_to, weight);
            }
        }
        fragments.push(current.finish(text.len()));
        fragments
    }

    fn mark(&self, text: &str, fragment: &TextFragment, out: &mut String) {
        let mut cursor = fragment.start;
        for hit in &fragment.hits {
            out.push_str(&text[cursor..hit.start]);
            out.push_str(&self.pre_tag);
            out.push_str(&text[hit.clone()]);
            out.push_str(&self.post_tag);
            cursor = hit.end;
        }
        out.push_str(&text[cursor..fragment.end]);
    }
}

struct FragmentBuilder {
    start: usize,
    score: f32,
    seen: HashSet<String>,
    hits: Vec<Range<usize>>,
}

impl FragmentBuilder {
    fn new(start: usize) -> Self {
        Self {
            start,
            score: 0.0,
            seen: HashSet::new(),
            hits: Vec::new(),
        }
    }

    fn hit(&mut self, term: String, range: Range<usize>, weight: f32) {
        self.hits.push(range);
        if self.seen.insert(term) {
            self.score += weight;
        }
    }

    fn finish(self, end: usize) -> TextFragment {
        TextFragment {
            start: self.start,
            end,
            score: self.score,
            hits: self.hits,
        }
    }
}
