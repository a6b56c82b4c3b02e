//! Document records and search results.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The unit of indexing: one Markdown file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Stable unique identifier, usually the absolute file path.
    pub key: String,
    /// Name shown to the user, usually the file name.
    pub display_name: String,
    /// Raw UTF-8 text.
    pub content: String,
}

impl DocumentRecord {
    pub fn new(
        key: impl Into<String>,
        display_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            display_name: display_name.into(),
            content: content.into(),
        }
    }
}

/// The searchable fields of an indexed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocField {
    /// The display name.
    Name,
    /// The full key (path).
    FullName,
    /// The document body.
    Content,
}

impl DocField {
    /// Every searchable field, in the order unfielded queries expand to.
    pub const ALL: [DocField; 3] = [DocField::Name, DocField::FullName, DocField::Content];

    /// Schema field name.
    pub fn schema_name(self) -> &'static str {
        match self {
            DocField::Name => "name",
            DocField::FullName => "full_name",
            DocField::Content => "content",
        }
    }

    /// Resolve a user-facing field prefix (`name:`, `fullname:`, `content:`).
    pub fn from_query_prefix(prefix: &str) -> Option<Self> {
        match prefix.to_ascii_lowercase().as_str() {
            "name" => Some(DocField::Name),
            "fullname" | "full_name" | "path" => Some(DocField::FullName),
            "content" => Some(DocField::Content),
            _ => None,
        }
    }
}

impl fmt::Display for DocField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.schema_name())
    }
}

/// One ranked, possibly highlighted, search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Display name, highlighted when it contains a query term.
    pub name: String,
    /// Full key exactly as stored.
    pub full_name: String,
    /// Best fragments of the content, highlighted.
    pub content: String,
    /// Relevance score, only comparable within the same query.
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_prefix_is_case_insensitive() {
        assert_eq!(DocField::from_query_prefix("Name"), Some(DocField::Name));
        assert_eq!(
            DocField::from_query_prefix("FULLNAME"),
            Some(DocField::FullName)
        );
        assert_eq!(
            DocField::from_query_prefix("content"),
            Some(DocField::Content)
        );
        assert_eq!(DocField::from_query_prefix("title"), None);
    }

    #[test]
    fn test_result_serializes_all_columns() {
        let result = SearchResult {
            name: "a.md".to_string(),
            full_name: "/docs/a.md".to_string(),
            content: "body".to_string(),
            score: 1.5,
        };
        let json = serde_json::to_value(&result).unwrap();
        for key in ["name", "full_name", "content", "score"] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
    }
}
