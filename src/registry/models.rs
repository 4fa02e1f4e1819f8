//! Request and response bodies for query endpoints.

use crate::db::{ExecutionOutcome, QueryParams};
use crate::policy::Grant;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of `POST {route}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub params: Option<QueryParams>,
    /// API key. The HTTP layer fills this from the `api-key` header when the
    /// body has none.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_params(mut self, params: QueryParams) -> Self {
        self.params = Some(params);
        self
    }

    /// The presented key, if any. Blank counts as absent.
    pub fn presented_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

/// Successful query response.
///
/// Reads carry `rows`; writes carry `message` and, for inserts that
/// generated one, `last_insert_id`. `user_id` and `expiry` appear whenever
/// an API key was used.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Map<String, Value>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_insert_id: Option<i64>,
}

impl QueryResponse {
    pub(super) fn from_outcome(grant: &Grant, outcome: ExecutionOutcome) -> Self {
        let user_id = grant.identity.as_ref().map(|c| c.subject.clone());
        let expiry = grant.identity.as_ref().map(|c| c.expiry);

        match outcome {
            ExecutionOutcome::Rows(rows) => Self {
                rows: Some(rows),
                user_id,
                expiry,
                ..Self::default()
            },
            ExecutionOutcome::Write { last_insert_id } => Self {
                message: Some(format!("{} executed successfully.", grant.statement.keyword)),
                user_id,
                expiry,
                last_insert_id,
                ..Self::default()
            },
        }
    }
}
