//! Query type and canonicalization.
//!
//! A query selects a subset of the local source log by author, entry type
//! and privacy flag. Its canonical serialization (JSON with keys in
//! lexicographic order, no whitespace) is the [`QueryId`], the sole key used
//! to tell two queries apart.

use serde::{Deserialize, Serialize};

use crate::error::FeedError;
use crate::message::SourceMsg;

/// A declarative filter over the source log.
///
/// Field declaration order is the canonical key order; do not reorder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Query {
    /// Feed ID of the author whose entries are selected
    pub author: String,

    /// Whether to select encrypted (true) or public (false) entries
    pub private: bool,

    /// Entry type filter; `None` selects every type
    #[serde(rename = "type")]
    pub msg_type: Option<String>,
}

impl Query {
    /// Create a query for `author` with no type filter.
    pub fn new(author: impl Into<String>, private: bool) -> Self {
        Self {
            author: author.into(),
            private,
            msg_type: None,
        }
    }

    /// Restrict the query to a single entry type.
    pub fn with_type(mut self, msg_type: impl Into<String>) -> Self {
        self.msg_type = Some(msg_type.into());
        self
    }

    /// Parse a query from its serialized textual form.
    pub fn parse(text: &str) -> Result<Self, FeedError> {
        let query: Query = serde_json::from_str(text)
            .map_err(|e| FeedError::InvalidQuery(format!("{}: {}", text, e)))?;
        query.validate()?;
        Ok(query)
    }

    /// Check the shape constraints serde cannot express.
    pub fn validate(&self) -> Result<(), FeedError> {
        if self.author.trim().is_empty() {
            return Err(FeedError::InvalidQuery("author must not be empty".into()));
        }
        if let Some(t) = &self.msg_type {
            if t.trim().is_empty() {
                return Err(FeedError::InvalidQuery("type must not be empty".into()));
            }
        }
        Ok(())
    }

    /// Check that this query targets the local identity.
    ///
    /// Only the author of a log may index it.
    pub fn ensure_author(&self, local_id: &str) -> Result<(), FeedError> {
        if self.author != local_id {
            return Err(FeedError::InvalidQuery(format!(
                "author {} is not the local identity {}",
                self.author, local_id
            )));
        }
        Ok(())
    }

    /// Canonical identifier of this query.
    pub fn id(&self) -> QueryId {
        // Serializing a struct of strings and bools cannot fail.
        QueryId(serde_json::to_string(self).unwrap_or_default())
    }

    /// Whether a source entry is selected by this query.
    pub fn matches(&self, msg: &SourceMsg) -> bool {
        msg.author == self.author
            && msg.private == self.private
            && self
                .msg_type
                .as_deref()
                .map_or(true, |t| t == msg.msg_type)
    }
}

/// Canonical serialization of a [`Query`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(String);

impl QueryId {
    /// Borrow the canonical text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Either form a caller may hand to [`canonicalize`].
#[derive(Debug, Clone)]
pub enum QueryInput {
    /// Already-structured query
    Structured(Query),
    /// Serialized JSON text
    Text(String),
}

impl From<Query> for QueryInput {
    fn from(query: Query) -> Self {
        QueryInput::Structured(query)
    }
}

impl From<&Query> for QueryInput {
    fn from(query: &Query) -> Self {
        QueryInput::Structured(query.clone())
    }
}

impl From<&str> for QueryInput {
    fn from(text: &str) -> Self {
        QueryInput::Text(text.to_string())
    }
}

impl From<String> for QueryInput {
    fn from(text: String) -> Self {
        QueryInput::Text(text)
    }
}

/// Validate and normalize a query.
///
/// Two textually different but semantically identical queries yield the
/// same [`QueryId`].
pub fn canonicalize(input: impl Into<QueryInput>) -> Result<(Query, QueryId), FeedError> {
    let query = match input.into() {
        QueryInput::Structured(query) => {
            query.validate()?;
            query
        }
        QueryInput::Text(text) => Query::parse(&text)?,
    };
    let id = query.id();
    Ok((query, id))
}

/// A query with the author omitted, implied to be the local identity.
///
/// Used for autostart configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialQuery {
    /// Entry type filter
    #[serde(rename = "type", default)]
    pub msg_type: Option<String>,

    /// Privacy flag (default: false)
    #[serde(default)]
    pub private: bool,
}

impl PartialQuery {
    /// Complete the query with the local identity.
    pub fn with_author(&self, author: impl Into<String>) -> Query {
        Query {
            author: author.into(),
            private: self.private,
            msg_type: self.msg_type.clone(),
        }
    }
}
