//! Query authorization.
//!
//! Decides, per incoming statement, whether it may run given what the caller
//! proved about itself:
//!
//! - no API key: read statements only ([`READ_KEYWORDS`]);
//! - an API key that verified: any statement, and the response carries the
//!   key's subject and expiry;
//! - an API key that did not verify: nothing. This is an authentication
//!   failure, reported apart from the read-only refusal.
//!
//! An empty statement is refused before credentials are considered.
//!
//! Everything here is pure. Logging and status codes belong to the caller.

mod classify;

pub use classify::{Classified, MalformedQuery, QueryKind, READ_KEYWORDS, classify};

use crate::auth::{TokenClaims, Verification};
use std::fmt;

/// How the response to an allowed statement is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// Result rows.
    RowSet,
    /// A status message.
    StatusMessage,
    /// A status message plus the identity value generated by the statement,
    /// read back on the same connection before anything else runs on it.
    StatusMessageWithInsertId,
}

impl ResponseShape {
    pub fn for_kind(kind: QueryKind) -> Self {
        match kind {
            QueryKind::Read => Self::RowSet,
            QueryKind::Insert => Self::StatusMessageWithInsertId,
            QueryKind::OtherWrite => Self::StatusMessage,
        }
    }
}

/// Whether an allowed statement may change the database.
///
/// The keyword check only sees the first token. Execution targets enforce
/// `ReadOnly` on the connection itself, so a read that turns out to write
/// fails in the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// Why a presented API key was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    Invalid,
    Expired,
    /// No secret key is configured on this service.
    MissingSecret,
}

impl AuthFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::Expired => "expired",
            Self::MissingSecret => "missing_secret",
        }
    }
}

/// Why a statement was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Empty statement.
    MalformedQuery,
    /// A statement other than a read, without an API key.
    ReadOnlyWithoutCredential,
    /// An API key was presented and did not verify.
    Authentication(AuthFailure),
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedQuery => f.write_str("malformed query"),
            Self::ReadOnlyWithoutCredential => f.write_str("read-only without credential"),
            Self::Authentication(failure) => write!(f, "authentication failed ({})", failure.as_str()),
        }
    }
}

/// Permission to run one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub statement: Classified,
    pub shape: ResponseShape,
    /// Present when the caller used a valid API key.
    pub identity: Option<TokenClaims>,
}

impl Grant {
    /// Only callers with a valid key may write.
    pub fn access(&self) -> Access {
        match self.identity {
            Some(_) => Access::ReadWrite,
            None => Access::ReadOnly,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Allow(Grant),
    Deny(DenyReason),
}

/// Authorize `query` for a caller.
///
/// `credential` is `None` when no API key was presented, otherwise the result
/// of verifying the presented key.
pub fn authorize(query: &str, credential: Option<&Verification>) -> AuthDecision {
    let statement = match classify(query) {
        Ok(statement) => statement,
        Err(MalformedQuery) => return AuthDecision::Deny(DenyReason::MalformedQuery),
    };

    let identity = match credential {
        None if statement.kind == QueryKind::Read => None,
        None => return AuthDecision::Deny(DenyReason::ReadOnlyWithoutCredential),
        Some(Verification::Valid(claims)) => Some(claims.clone()),
        Some(Verification::Invalid) => return deny_auth(AuthFailure::Invalid),
        Some(Verification::Expired) => return deny_auth(AuthFailure::Expired),
        Some(Verification::MissingSecret) => return deny_auth(AuthFailure::MissingSecret),
    };

    AuthDecision::Allow(Grant {
        shape: ResponseShape::for_kind(statement.kind),
        statement,
        identity,
    })
}

fn deny_auth(failure: AuthFailure) -> AuthDecision {
    AuthDecision::Deny(DenyReason::Authentication(failure))
}
