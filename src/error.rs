//! Unified error handling for sqlgate.
//!
//! Every refusal and failure a request can end in is a [`GatewayError`],
//! with the HTTP status, the client-visible `detail` text and a stable label
//! for metrics. Messages name only the coarse category, never the secret,
//! the expected signature or classification internals.

use crate::db::DbError;
use crate::policy::{AuthFailure, DenyReason};
use axum::Json;
use axum::response::{IntoResponse, Response};
use http::{HeaderValue, StatusCode, header};
use serde_json::json;
use thiserror::Error;

/// Realm sent with Basic challenges.
pub const BASIC_REALM: &str = "Basic realm=\"sqlgate\"";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Query is empty.")]
    MalformedQuery,

    #[error("Only read-only queries are allowed without API key.")]
    ReadOnly,

    #[error("Invalid API key")]
    InvalidKey,

    #[error("API key expired")]
    ExpiredKey,

    #[error("Service does not provide secret key!")]
    KeysUnavailable,

    #[error("Authentication required")]
    TransportAuth,

    #[error("No endpoint registered for {0}")]
    UnknownRoute(String),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("{0}")]
    Execution(#[from] DbError),
}

impl GatewayError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MalformedQuery => "malformed_query",
            Self::ReadOnly => "read_only",
            Self::InvalidKey => "invalid_key",
            Self::ExpiredKey => "expired_key",
            Self::KeysUnavailable => "keys_unavailable",
            Self::TransportAuth => "transport_auth",
            Self::UnknownRoute(_) => "unknown_route",
            Self::InvalidBody(_) => "invalid_body",
            Self::Execution(_) => "execution_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedQuery | Self::Execution(_) => StatusCode::BAD_REQUEST,
            Self::ReadOnly => StatusCode::FORBIDDEN,
            Self::InvalidKey | Self::ExpiredKey | Self::KeysUnavailable | Self::TransportAuth => {
                StatusCode::UNAUTHORIZED
            }
            Self::UnknownRoute(_) => StatusCode::NOT_FOUND,
            Self::InvalidBody(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl From<DenyReason> for GatewayError {
    fn from(reason: DenyReason) -> Self {
        match reason {
            DenyReason::MalformedQuery => Self::MalformedQuery,
            DenyReason::ReadOnlyWithoutCredential => Self::ReadOnly,
            DenyReason::Authentication(AuthFailure::Invalid) => Self::InvalidKey,
            DenyReason::Authentication(AuthFailure::Expired) => Self::ExpiredKey,
            DenyReason::Authentication(AuthFailure::MissingSecret) => Self::KeysUnavailable,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({ "detail": self.to_string() }));
        let mut response = (status, body).into_response();
        if matches!(self, Self::TransportAuth) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(BASIC_REALM));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_reasons_map_to_distinct_statuses() {
        let cases = [
            (DenyReason::MalformedQuery, StatusCode::BAD_REQUEST),
            (DenyReason::ReadOnlyWithoutCredential, StatusCode::FORBIDDEN),
            (DenyReason::Authentication(AuthFailure::Invalid), StatusCode::UNAUTHORIZED),
            (DenyReason::Authentication(AuthFailure::Expired), StatusCode::UNAUTHORIZED),
            (DenyReason::Authentication(AuthFailure::MissingSecret), StatusCode::UNAUTHORIZED),
        ];
        for (reason, status) in cases {
            assert_eq!(GatewayError::from(reason).status_code(), status);
        }
    }

    #[test]
    fn error_codes() {
        assert_eq!(GatewayError::ReadOnly.error_code(), "read_only");
        assert_eq!(GatewayError::ExpiredKey.error_code(), "expired_key");
        assert_eq!(
            GatewayError::Execution(DbError::Query("boom".into())).error_code(),
            "execution_error"
        );
    }

    #[test]
    fn execution_error_surfaces_driver_text() {
        let err = GatewayError::from(DbError::Query("no such table: t".into()));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "no such table: t");
    }

    #[test]
    fn transport_auth_carries_challenge() {
        let response = GatewayError::TransportAuth.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            BASIC_REALM
        );
    }
}
