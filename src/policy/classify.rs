//! Statement classification by leading keyword.

use thiserror::Error;

/// Keywords a caller without an API key may run.
pub const READ_KEYWORDS: [&str; 5] = ["SELECT", "SHOW", "DESCRIBE", "EXPLAIN", "WITH"];

/// What a statement does, as far as authorization cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Read,
    Insert,
    OtherWrite,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Insert => "insert",
            Self::OtherWrite => "write",
        }
    }
}

/// The statement has no keyword to classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("query is empty")]
pub struct MalformedQuery;

/// A classified statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    /// First whitespace-delimited token, upper-cased.
    pub keyword: String,
    pub kind: QueryKind,
}

/// Classify raw SQL text by its first whitespace-delimited token.
///
/// Leading whitespace and case are ignored. No other parsing happens: the
/// statement text is forwarded to the driver untouched.
pub fn classify(query: &str) -> Result<Classified, MalformedQuery> {
    let keyword = query
        .split_whitespace()
        .next()
        .ok_or(MalformedQuery)?
        .to_uppercase();

    let kind = if READ_KEYWORDS.contains(&keyword.as_str()) {
        QueryKind::Read
    } else if keyword == "INSERT" {
        QueryKind::Insert
    } else {
        QueryKind::OtherWrite
    };

    Ok(Classified { keyword, kind })
}
