//! Digest assembly for catalog analytics queries.
//!
//! A run walks each configured query's execution hierarchy
//! (session, batch, event) down to its latest result set, downloads the rows,
//! renders one HTML fragment per query and publishes the concatenated report
//! into a custom field of an existing catalog article.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

pub mod api_client;
pub mod assembler;
pub mod auth;
pub mod config;
pub mod digest;
pub mod fetcher;
pub mod formatter;
pub mod publisher;
pub mod resolver;
pub mod templates;

/// Digest section a configured query feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    /// Most viewed articles of the week.
    TopArticles,
    /// Recently created articles.
    NewArticles,
    /// Conversations without an accepted answer.
    UnansweredQuestions,
    /// Recently published queries.
    NewQueries,
}

impl QueryKind {
    /// Every kind, in the order the default configuration lists them.
    pub const ALL: [QueryKind; 4] = [
        QueryKind::TopArticles,
        QueryKind::NewArticles,
        QueryKind::UnansweredQuestions,
        QueryKind::NewQueries,
    ];

    /// Stable snake_case name used in configuration and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::TopArticles => "top_articles",
            QueryKind::NewArticles => "new_articles",
            QueryKind::UnansweredQuestions => "unanswered_questions",
            QueryKind::NewQueries => "new_queries",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        QueryKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "unknown query kind `{value}` (expected one of: top_articles, new_articles, \
                     unanswered_questions, new_queries)"
                )
            })
    }
}

/// One scheduled query whose latest result feeds the digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    /// Query id on the catalog platform.
    pub id: u64,
    /// Section the query's rows are rendered into.
    pub kind: QueryKind,
}

/// Result reference carried by a terminal execution event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultReference {
    /// Id of the materialized result set.
    pub result_id: u64,
    /// Column names, in result order.
    pub schema: Vec<String>,
}

/// Rows of one downloaded result set.
///
/// Row 0 is the header row. Cells are kept as text and row widths are not
/// checked against the result schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSet {
    /// All rows, header included.
    pub rows: Vec<Vec<String>>,
}

impl ResultSet {
    /// Wrap parsed rows.
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self {
            rows,
        }
    }

    /// True when the download produced no rows at all, not even a header.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of rows including the header.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// The header row, if any.
    pub fn header(&self) -> Option<&[String]> {
        self.rows.first().map(Vec::as_slice)
    }

    /// Rows after the header.
    pub fn data_rows(&self) -> impl Iterator<Item = &[String]> {
        self.rows.iter().skip(1).map(Vec::as_slice)
    }
}
