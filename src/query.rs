//! Query parsing and compilation.
//!
//! Parsing is two-stage: the structured grammar is tried first and, when the
//! input is malformed, the same text is re-read as plain literal terms. The
//! second stage cannot fail, so user input never turns into an error.
//!
//! # Grammar
//!
//! ```text
//! query   := clause*                      (default operator: OR)
//! clause  := [+|-|NOT] primary [^boost] | clause AND clause | clause OR clause
//! primary := field ':' primary | '(' query ')' | '"' phrase '"' | term
//! term    := word, may contain '*' or '?' (not as first character)
//! ```
//!
//! Fields are `name`, `fullname` and `content`; unfielded clauses search all
//! three. `\` escapes the next character.

use thiserror::Error;
use tracing::debug;

use tantivy::query::{
    BooleanQuery, BoostQuery, EmptyQuery, Occur as TantivyOccur, PhraseQuery, Query, TermQuery,
};
use tantivy::schema::IndexRecordOption;
use tantivy::Term;

use crate::analyzer::Analyzer;
use crate::error::Result;
use crate::highlight::QueryTerms;
use crate::record::DocField;
use crate::store::IndexSnapshot;

/// Upper bound on the number of index terms one wildcard pattern expands to.
pub const MAX_EXPANSIONS: usize = 1024;

/// How a clause participates in its enclosing boolean query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occur {
    Should,
    Must,
    MustNot,
}

impl From<Occur> for TantivyOccur {
    fn from(occur: Occur) -> Self {
        match occur {
            Occur::Should => TantivyOccur::Should,
            Occur::Must => TantivyOccur::Must,
            Occur::MustNot => TantivyOccur::MustNot,
        }
    }
}

/// A parsed, not yet analyzed, query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    /// Literal text; analyzed at compile time. Multi-token text becomes a phrase.
    Term {
        field: Option<DocField>,
        text: String,
    },
    /// Quoted text matched as consecutive terms.
    Phrase {
        field: Option<DocField>,
        text: String,
    },
    /// Pattern with `*` / `?`, matched against index terms.
    Wildcard {
        field: Option<DocField>,
        pattern: String,
    },
    Boolean(Vec<Clause>),
    Boost {
        node: Box<QueryNode>,
        boost: f32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub occur: Occur,
    pub node: QueryNode,
}

impl Clause {
    pub fn should(node: QueryNode) -> Self {
        Self {
            occur: Occur::Should,
            node,
        }
    }
}

/// Syntax errors of the structured grammar.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuerySyntaxError {
    #[error("unbalanced parenthesis at byte {0}")]
    UnbalancedParenthesis(usize),
    #[error("unterminated phrase starting at byte {0}")]
    UnterminatedPhrase(usize),
    #[error("operator '{0}' is missing an operand")]
    DanglingOperator(String),
    #[error("term '{0}' starts with a wildcard")]
    LeadingWildcard(String),
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("invalid boost '{0}'")]
    InvalidBoost(String),
    #[error("query ends with an escape character")]
    TrailingEscape,
}

/// Outcome of [`parse`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedQuery {
    /// The structured grammar accepted the input.
    Parsed(QueryNode),
    /// The input was malformed and was re-read as literal text.
    LiteralFallback {
        query: QueryNode,
        error: QuerySyntaxError,
    },
}

impl ParsedQuery {
    pub fn query(&self) -> &QueryNode {
        match self {
            ParsedQuery::Parsed(query) => query,
            ParsedQuery::LiteralFallback { query, .. } => query,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ParsedQuery::LiteralFallback { .. })
    }
}

/// True when `input` has nothing left after removing wildcard markers and
/// whitespace. Such queries would match everything (or nothing) and are
/// answered with an empty result without opening the index.
pub fn is_blank_query(input: &str) -> bool {
    input
        .chars()
        .all(|c| c == '*' || c == '?' || c.is_whitespace())
}

/// Parse with the structured grammar, falling back to literal text.
pub fn parse(input: &str) -> ParsedQuery {
    let trimmed = input.trim();
    match parse_structured(trimmed) {
        Ok(query) => ParsedQuery::Parsed(query),
        Err(error) => {
            debug!(%error, "query syntax error, falling back to literal search");
            ParsedQuery::LiteralFallback {
                query: parse_literal(trimmed),
                error,
            }
        }
    }
}

/// Every whitespace-separated chunk becomes a literal term, OR'd together.
pub fn parse_literal(input: &str) -> QueryNode {
    QueryNode::Boolean(
        input
            .split_whitespace()
            .map(|chunk| {
                Clause::should(QueryNode::Term {
                    field: None,
                    text: chunk.to_string(),
                })
            })
            .collect(),
    )
}

/// Parse `input` with the structured grammar only.
pub fn parse_structured(input: &str) -> std::result::Result<QueryNode, QuerySyntaxError> {
    let tokens = lex(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let query = parser.clause_list(None, 0)?;
    if let Some(token) = parser.peek() {
        // clause_list only stops early on a closing parenthesis.
        return Err(QuerySyntaxError::UnbalancedParenthesis(token.offset));
    }
    Ok(query)
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    LParen,
    RParen,
    Colon,
    Caret,
    Plus,
    Minus,
    Quoted(String),
    Word { text: String, wildcard: bool },
}

#[derive(Debug, Clone, PartialEq)]
struct LexToken {
    kind: TokenKind,
    offset: usize,
}

fn is_word_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '"' | ':' | '^')
}

fn lex(input: &str) -> std::result::Result<Vec<LexToken>, QuerySyntaxError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    // '+' and '-' are operators only where a clause can start.
    let mut at_clause_start = true;

    while let Some(&(offset, c)) = chars.peek() {
        let kind = match c {
            _ if c.is_whitespace() => {
                chars.next();
                at_clause_start = true;
                continue;
            }
            '(' => {
                chars.next();
                at_clause_start = true;
                tokens.push(LexToken {
                    kind: TokenKind::LParen,
                    offset,
                });
                continue;
            }
            ')' => {
                chars.next();
                TokenKind::RParen
            }
            ':' => {
                chars.next();
                tokens.push(LexToken {
                    kind: TokenKind::Colon,
                    offset,
                });
                at_clause_start = true;
                continue;
            }
            '^' => {
                chars.next();
                TokenKind::Caret
            }
            '+' | '-' if at_clause_start => {
                chars.next();
                tokens.push(LexToken {
                    kind: if c == '+' {
                        TokenKind::Plus
                    } else {
                        TokenKind::Minus
                    },
                    offset,
                });
                continue;
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some((_, next)) = chars.next() {
                    match next {
                        '\\' => match chars.next() {
                            Some((_, escaped)) => text.push(escaped),
                            None => return Err(QuerySyntaxError::TrailingEscape),
                        },
                        '"' => {
                            closed = true;
                            break;
                        }
                        other => text.push(other),
                    }
                }
                if !closed {
                    return Err(QuerySyntaxError::UnterminatedPhrase(offset));
                }
                TokenKind::Quoted(text)
            }
            _ => {
                let mut text = String::new();
                let mut wildcard = false;
                while let Some(&(_, next)) = chars.peek() {
                    if is_word_delimiter(next) {
                        break;
                    }
                    chars.next();
                    match next {
                        '\\' => match chars.next() {
                            // An escaped wildcard is plain punctuation, which
                            // the analyzer treats as a word boundary.
                            Some((_, '*' | '?')) => text.push(' '),
                            Some((_, escaped)) => text.push(escaped),
                            None => return Err(QuerySyntaxError::TrailingEscape),
                        },
                        '*' | '?' => {
                            wildcard = true;
                            text.push(next);
                        }
                        other => text.push(other),
                    }
                }
                TokenKind::Word { text, wildcard }
            }
        };
        at_clause_start = false;
        tokens.push(LexToken { kind, offset });
    }
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conjunction {
    None,
    And,
    Or,
}

struct Parser {
    tokens: Vec<LexToken>,
    pos: usize,
}

fn keyword(token: &LexToken) -> Option<&'static str> {
    match &token.kind {
        TokenKind::Word {
            text,
            wildcard: false,
        } => match text.as_str() {
            "AND" => Some("AND"),
            "OR" => Some("OR"),
            "NOT" => Some("NOT"),
            _ => None,
        },
        _ => None,
    }
}

impl Parser {
    fn peek(&self) -> Option<&LexToken> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<LexToken> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_group_end(&self) -> bool {
        matches!(
            self.peek(),
            None | Some(LexToken {
                kind: TokenKind::RParen,
                ..
            })
        )
    }

    /// Parse clauses until end of input or a closing parenthesis.
    fn clause_list(
        &mut self,
        field: Option<DocField>,
        depth: usize,
    ) -> std::result::Result<QueryNode, QuerySyntaxError> {
        let mut clauses: Vec<Clause> = Vec::new();
        let mut conjunction = Conjunction::None;

        loop {
            if self.at_group_end() {
                if conjunction != Conjunction::None {
                    let name = if conjunction == Conjunction::And {
                        "AND"
                    } else {
                        "OR"
                    };
                    return Err(QuerySyntaxError::DanglingOperator(name.to_string()));
                }
                if depth == 0 {
                    if let Some(token) = self.peek() {
                        return Err(QuerySyntaxError::UnbalancedParenthesis(token.offset));
                    }
                }
                break;
            }

            if let Some(op) = self.peek().and_then(keyword) {
                if op == "AND" || op == "OR" {
                    if clauses.is_empty() || conjunction != Conjunction::None {
                        return Err(QuerySyntaxError::DanglingOperator(op.to_string()));
                    }
                    self.next();
                    conjunction = if op == "AND" {
                        Conjunction::And
                    } else {
                        Conjunction::Or
                    };
                    continue;
                }
            }

            let mut occur = Occur::Should;
            if let Some(token) = self.peek() {
                let modifier = match (&token.kind, keyword(token)) {
                    (TokenKind::Plus, _) => Some(("+", Occur::Must)),
                    (TokenKind::Minus, _) => Some(("-", Occur::MustNot)),
                    (_, Some("NOT")) => Some(("NOT", Occur::MustNot)),
                    _ => None,
                };
                if let Some((name, modifier_occur)) = modifier {
                    self.next();
                    let operand_missing = self.at_group_end()
                        || self
                            .peek()
                            .and_then(keyword)
                            .is_some_and(|k| k == "AND" || k == "OR");
                    if operand_missing {
                        return Err(QuerySyntaxError::DanglingOperator(name.to_string()));
                    }
                    occur = modifier_occur;
                }
            }

            let node = self.primary(field, depth)?;

            if conjunction == Conjunction::And {
                if let Some(previous) = clauses.last_mut() {
                    if previous.occur == Occur::Should {
                        previous.occur = Occur::Must;
                    }
                }
                if occur == Occur::Should {
                    occur = Occur::Must;
                }
            }
            conjunction = Conjunction::None;
            clauses.push(Clause { occur, node });
        }

        Ok(QueryNode::Boolean(clauses))
    }

    fn primary(
        &mut self,
        field: Option<DocField>,
        depth: usize,
    ) -> std::result::Result<QueryNode, QuerySyntaxError> {
        let token = match self.next() {
            Some(token) => token,
            None => return Err(QuerySyntaxError::DanglingOperator(String::new())),
        };

        let node = match token.kind {
            TokenKind::LParen => {
                let group = self.clause_list(field, depth + 1)?;
                match self.next() {
                    Some(LexToken {
                        kind: TokenKind::RParen,
                        ..
                    }) => group,
                    _ => return Err(QuerySyntaxError::UnbalancedParenthesis(token.offset)),
                }
            }
            TokenKind::RParen => {
                return Err(QuerySyntaxError::UnbalancedParenthesis(token.offset));
            }
            TokenKind::Colon => return Err(QuerySyntaxError::DanglingOperator(":".to_string())),
            TokenKind::Caret => return Err(QuerySyntaxError::DanglingOperator("^".to_string())),
            TokenKind::Plus => return Err(QuerySyntaxError::DanglingOperator("+".to_string())),
            TokenKind::Minus => return Err(QuerySyntaxError::DanglingOperator("-".to_string())),
            TokenKind::Quoted(text) => QueryNode::Phrase { field, text },
            TokenKind::Word { text, wildcard } => {
                let is_field_prefix = matches!(
                    self.peek(),
                    Some(LexToken {
                        kind: TokenKind::Colon,
                        ..
                    })
                );
                if is_field_prefix && !wildcard {
                    self.next();
                    let target = DocField::from_query_prefix(&text)
                        .ok_or_else(|| QuerySyntaxError::UnknownField(text.clone()))?;
                    if self.at_group_end() {
                        return Err(QuerySyntaxError::DanglingOperator(":".to_string()));
                    }
                    return self.primary(Some(target), depth);
                }
                if wildcard {
                    if text.starts_with('*') || text.starts_with('?') {
                        return Err(QuerySyntaxError::LeadingWildcard(text));
                    }
                    QueryNode::Wildcard {
                        field,
                        pattern: text,
                    }
                } else {
                    QueryNode::Term { field, text }
                }
            }
        };

        self.boost(node)
    }

    fn boost(&mut self, node: QueryNode) -> std::result::Result<QueryNode, QuerySyntaxError> {
        if !matches!(
            self.peek(),
            Some(LexToken {
                kind: TokenKind::Caret,
                ..
            })
        ) {
            return Ok(node);
        }
        self.next();
        match self.next() {
            Some(LexToken {
                kind: TokenKind::Word { text, .. },
                ..
            }) => match text.parse::<f32>() {
                Ok(boost) if boost.is_finite() && boost > 0.0 => Ok(QueryNode::Boost {
                    node: Box::new(node),
                    boost,
                }),
                _ => Err(QuerySyntaxError::InvalidBoost(text)),
            },
            _ => Err(QuerySyntaxError::InvalidBoost(String::new())),
        }
    }
}

// ---------------------------------------------------------------------------
// Wildcard matching
// ---------------------------------------------------------------------------

/// Glob-style matcher: `*` matches any run of characters, `?` exactly one.
#[derive(Debug, Clone)]
pub struct WildcardPattern {
    chars: Vec<char>,
    literal_prefix: String,
}

impl WildcardPattern {
    /// Build a matcher; the pattern is lowercased like indexed terms.
    pub fn new(pattern: &str) -> Self {
        let lowered = pattern.to_lowercase();
        let literal_prefix = lowered
            .chars()
            .take_while(|c| *c != '*' && *c != '?')
            .collect();
        Self {
            chars: lowered.chars().collect(),
            literal_prefix,
        }
    }

    /// The characters before the first wildcard.
    pub fn literal_prefix(&self) -> &str {
        &self.literal_prefix
    }

    pub fn matches(&self, candidate: &str) -> bool {
        let text: Vec<char> = candidate.chars().collect();
        let (mut p, mut t) = (0, 0);
        let mut backtrack: Option<(usize, usize)> = None;

        while t < text.len() {
            if p < self.chars.len() && (self.chars[p] == '?' || self.chars[p] == text[t]) {
                p += 1;
                t += 1;
            } else if p < self.chars.len() && self.chars[p] == '*' {
                backtrack = Some((p, t));
                p += 1;
            } else if let Some((star, matched)) = backtrack {
                p = star + 1;
                t = matched + 1;
                backtrack = Some((star, matched + 1));
            } else {
                return false;
            }
        }
        self.chars[p..].iter().all(|c| *c == '*')
    }
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

/// A query ready to run against one snapshot, plus the index terms it
/// matches on (for highlighting).
pub struct CompiledQuery {
    query: Box<dyn Query>,
    terms: QueryTerms,
}

impl CompiledQuery {
    pub fn query(&self) -> &dyn Query {
        self.query.as_ref()
    }

    pub fn terms(&self) -> &QueryTerms {
        &self.terms
    }
}

impl std::fmt::Debug for CompiledQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledQuery")
            .field("query", &self.query)
            .field("terms", &self.terms)
            .finish()
    }
}

enum Compiled {
    /// The clause analyzed to nothing and is dropped from its parent.
    Skip,
    Query(Box<dyn Query>),
}

/// Turns parsed queries into tantivy queries against a snapshot.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    analyzer: Analyzer,
    max_expansions: usize,
}

impl Default for QueryEngine {
    fn default() -> Self {
        Self::new(Analyzer::new())
    }
}

impl QueryEngine {
    pub fn new(analyzer: Analyzer) -> Self {
        Self {
            analyzer,
            max_expansions: MAX_EXPANSIONS,
        }
    }

    pub fn with_max_expansions(mut self, max_expansions: usize) -> Self {
        self.max_expansions = max_expansions.max(1);
        self
    }

    pub fn parse(&self, input: &str) -> ParsedQuery {
        parse(input)
    }

    /// Compile `node` against `snapshot`. Returns `None` when nothing in the
    /// query survives analysis.
    pub fn compile(
        &self,
        snapshot: &IndexSnapshot,
        node: &QueryNode,
    ) -> Result<Option<CompiledQuery>> {
        let mut terms = QueryTerms::new();
        let compiled = self.compile_node(snapshot, node, 1.0, false, &mut terms)?;
        Ok(match compiled {
            Compiled::Skip => None,
            Compiled::Query(query) => Some(CompiledQuery { query, terms }),
        })
    }

    fn compile_node(
        &self,
        snapshot: &IndexSnapshot,
        node: &QueryNode,
        boost: f32,
        negated: bool,
        terms: &mut QueryTerms,
    ) -> Result<Compiled> {
        match node {
            QueryNode::Term { field, text } | QueryNode::Phrase { field, text } => {
                let tokens = self.analyzer.tokenize(text);
                if tokens.is_empty() {
                    return Ok(Compiled::Skip);
                }
                if !negated {
                    for token in &tokens {
                        terms.insert(token.clone(), boost);
                    }
                }
                let per_field = target_fields(*field)
                    .into_iter()
                    .map(|doc_field| {
                        let field = snapshot.fields().field(doc_field);
                        let query: Box<dyn Query> = if tokens.len() == 1 {
                            Box::new(TermQuery::new(
                                Term::from_field_text(field, &tokens[0]),
                                IndexRecordOption::WithFreqs,
                            ))
                        } else {
                            Box::new(PhraseQuery::new(
                                tokens
                                    .iter()
                                    .map(|token| Term::from_field_text(field, token))
                                    .collect(),
                            ))
                        };
                        (TantivyOccur::Should, query)
                    })
                    .collect();
                Ok(Compiled::Query(Box::new(BooleanQuery::new(per_field))))
            }
            QueryNode::Wildcard { field, pattern } => {
                let pieces = self.pattern_pieces(pattern);
                if pieces.is_empty() {
                    return Ok(Compiled::Skip);
                }
                let mut per_field: Vec<(TantivyOccur, Box<dyn Query>)> = Vec::new();
                'fields: for doc_field in target_fields(*field) {
                    let field = snapshot.fields().field(doc_field);
                    let mut required: Vec<(TantivyOccur, Box<dyn Query>)> = Vec::new();
                    for piece in &pieces {
                        let matched = match piece {
                            PatternPiece::Term(token) => vec![token.clone()],
                            PatternPiece::Wildcard(pattern) => {
                                let expansions =
                                    snapshot.expand_terms(field, pattern, self.max_expansions)?;
                                debug!(
                                    field = %doc_field,
                                    prefix = pattern.literal_prefix(),
                                    expansions = expansions.len(),
                                    "expanded wildcard"
                                );
                                expansions
                            }
                        };
                        if matched.is_empty() {
                            // Every piece must match within the same field.
                            continue 'fields;
                        }
                        if !negated {
                            for term in &matched {
                                terms.insert(term.clone(), boost);
                            }
                        }
                        let alternatives: Vec<(TantivyOccur, Box<dyn Query>)> = matched
                            .iter()
                            .map(|term| {
                                let query: Box<dyn Query> = Box::new(TermQuery::new(
                                    Term::from_field_text(field, term),
                                    IndexRecordOption::WithFreqs,
                                ));
                                (TantivyOccur::Should, query)
                            })
                            .collect();
                        required.push((
                            TantivyOccur::Must,
                            Box::new(BooleanQuery::new(alternatives)),
                        ));
                    }
                    per_field.push((TantivyOccur::Should, Box::new(BooleanQuery::new(required))));
                }
                if per_field.is_empty() {
                    // A pattern with no expansions still constrains its parent.
                    return Ok(Compiled::Query(Box::new(EmptyQuery)));
                }
                Ok(Compiled::Query(Box::new(BooleanQuery::new(per_field))))
            }
            QueryNode::Boolean(clauses) => {
                let mut subqueries: Vec<(TantivyOccur, Box<dyn Query>)> = Vec::new();
                for clause in clauses {
                    let clause_negated = negated || clause.occur == Occur::MustNot;
                    match self.compile_node(snapshot, &clause.node, boost, clause_negated, terms)? {
                        Compiled::Skip => {}
                        Compiled::Query(query) => subqueries.push((clause.occur.into(), query)),
                    }
                }
                if subqueries.is_empty() {
                    return Ok(Compiled::Skip);
                }
                Ok(Compiled::Query(Box::new(BooleanQuery::new(subqueries))))
            }
            QueryNode::Boost { node, boost: factor } => {
                match self.compile_node(snapshot, node, boost * factor, negated, terms)? {
                    Compiled::Skip => Ok(Compiled::Skip),
                    Compiled::Query(query) => {
                        Ok(Compiled::Query(Box::new(BoostQuery::new(query, *factor))))
                    }
                }
            }
        }
    }

    /// Split `pattern` at the boundaries the analyzer splits text on, so
    /// `readme.md*` becomes the term `readme` and the pattern `md*`.
    /// Pieces that are only wildcards match any term and are dropped.
    fn pattern_pieces(&self, pattern: &str) -> Vec<PatternPiece> {
        pattern
            .split(|c: char| !(c.is_alphanumeric() || c == '*' || c == '?'))
            .filter(|piece| !is_blank_query(piece))
            .flat_map(|piece| {
                if piece.contains(['*', '?']) {
                    vec![PatternPiece::Wildcard(WildcardPattern::new(piece))]
                } else {
                    self.analyzer
                        .tokenize(piece)
                        .into_iter()
                        .map(PatternPiece::Term)
                        .collect()
                }
            })
            .collect()
    }
}

/// One word-level piece of a wildcard pattern.
#[derive(Debug, Clone)]
enum PatternPiece {
    /// Analyzed literal term.
    Term(String),
    Wildcard(WildcardPattern),
}

fn target_fields(field: Option<DocField>) -> Vec<DocField> {
    match field {
        Some(field) => vec![field],
        None => DocField::ALL.to_vec(),
    }
}
