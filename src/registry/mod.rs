//! Endpoint registry.
//!
//! Binds route identifiers to execution targets and runs every request
//! through the same checks, whichever database the route addresses:
//!
//! 1. the transport credential, for endpoints that require it;
//! 2. API key verification, when a key is presented;
//! 3. the query authorization policy;
//! 4. execution on the bound target, only if the policy allowed it.
//!
//! Routes are registered once at startup. After that the registry is only
//! read and is shared behind an `Arc`.

mod models;

pub use models::{QueryRequest, QueryResponse};

use crate::auth::{BasicAuthError, TokenAuthority, TransportCredential};
use crate::config::Config;
use crate::db::{DbError, ExecutionTarget, SqliteTarget};
use crate::error::GatewayError;
use crate::policy::{self, AuthDecision};
use crate::telemetry::QueryTimer;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors registering endpoints. Raised at startup, never per request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("route {0} is already registered")]
    DuplicateRoute(String),
    #[error("route {0:?} must start with '/' and must not contain ':', '*', '{{' or '}}'")]
    InvalidRoute(String),
    #[error("route {0} requires basic auth but no transport credential is configured")]
    MissingTransportCredential(String),
}

/// Errors building a registry from configuration.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("endpoint database: {0}")]
    Database(#[from] DbError),
    #[error("security.basic_auth: {0}")]
    Credential(#[from] BasicAuthError),
}

/// One registered route.
pub struct Endpoint {
    route: String,
    target: Arc<dyn ExecutionTarget>,
    require_transport_auth: bool,
}

impl Endpoint {
    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn target(&self) -> &dyn ExecutionTarget {
        self.target.as_ref()
    }

    pub fn requires_transport_auth(&self) -> bool {
        self.require_transport_auth
    }
}

/// Route identifier → execution target, in registration order.
pub struct EndpointRegistry {
    authority: Arc<TokenAuthority>,
    transport: Option<TransportCredential>,
    endpoints: Vec<Endpoint>,
    index: HashMap<String, usize>,
}

impl EndpointRegistry {
    pub fn new(authority: Arc<TokenAuthority>, transport: Option<TransportCredential>) -> Self {
        Self {
            authority,
            transport,
            endpoints: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Build the registry described by `config`, opening one SQLite target
    /// per `[[endpoint]]`.
    pub async fn from_config(config: &Config) -> Result<Self, StartupError> {
        let authority = Arc::new(TokenAuthority::from_secret(
            config.security.secret_key.as_deref(),
        ));
        let transport = config
            .security
            .basic_auth
            .as_deref()
            .map(TransportCredential::parse)
            .transpose()?;
        if let Some(credential) = &transport {
            info!(username = %credential.username(), "Basic auth enabled");
        }

        let mut registry = Self::new(authority, transport);
        for endpoint in &config.endpoints {
            let target = SqliteTarget::connect(&endpoint.database).await?;
            registry.register(&endpoint.route, Arc::new(target), endpoint.require_basic_auth)?;
        }
        Ok(registry)
    }

    /// Register `route` against `target`.
    pub fn register(
        &mut self,
        route: &str,
        target: Arc<dyn ExecutionTarget>,
        require_transport_auth: bool,
    ) -> Result<(), RegistryError> {
        if !is_valid_route(route) {
            return Err(RegistryError::InvalidRoute(route.to_string()));
        }
        if self.index.contains_key(route) {
            return Err(RegistryError::DuplicateRoute(route.to_string()));
        }
        if require_transport_auth && self.transport.is_none() {
            return Err(RegistryError::MissingTransportCredential(route.to_string()));
        }

        info!(
            route = %route,
            target = %target.name(),
            basic_auth = require_transport_auth,
            "Endpoint registered"
        );
        self.index.insert(route.to_string(), self.endpoints.len());
        self.endpoints.push(Endpoint {
            route: route.to_string(),
            target,
            require_transport_auth,
        });
        Ok(())
    }

    pub fn get(&self, route: &str) -> Option<&Endpoint> {
        self.index.get(route).map(|&i| &self.endpoints[i])
    }

    /// Registered routes in registration order.
    pub fn routes(&self) -> impl Iterator<Item = &str> {
        self.endpoints.iter().map(|e| e.route.as_str())
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn authority(&self) -> &TokenAuthority {
        &self.authority
    }

    /// Check an `Authorization` header against the transport credential.
    /// Passes when no credential is configured.
    pub fn check_transport(&self, authorization: Option<&str>) -> bool {
        self.transport
            .as_ref()
            .is_none_or(|credential| credential.check(authorization))
    }

    /// Run one request against `route`.
    pub async fn handle(
        &self,
        route: &str,
        authorization: Option<&str>,
        request: QueryRequest,
    ) -> Result<QueryResponse, GatewayError> {
        let _timer = QueryTimer::new(route);
        let result = self.dispatch(route, authorization, &request).await;
        crate::metrics::record_query(
            route,
            result.as_ref().map_or_else(|e| e.error_code(), |_| "ok"),
        );
        result
    }

    async fn dispatch(
        &self,
        route: &str,
        authorization: Option<&str>,
        request: &QueryRequest,
    ) -> Result<QueryResponse, GatewayError> {
        let endpoint = self
            .get(route)
            .ok_or_else(|| GatewayError::UnknownRoute(route.to_string()))?;

        if endpoint.require_transport_auth && !self.check_transport(authorization) {
            debug!(route = %route, "Transport credential rejected");
            return Err(GatewayError::TransportAuth);
        }

        let verification = request.presented_key().map(|key| self.authority.verify(key));
        if let Some(verification) = &verification {
            crate::metrics::record_verification(verification.label());
        }

        let grant = match policy::authorize(&request.query, verification.as_ref()) {
            AuthDecision::Allow(grant) => grant,
            AuthDecision::Deny(reason) => {
                debug!(route = %route, reason = %reason, "Query denied");
                return Err(reason.into());
            }
        };

        match &grant.identity {
            Some(claims) => warn!(
                route = %route,
                user_id = %claims.subject,
                expiry = claims.expiry,
                kind = grant.statement.kind.as_str(),
                query = %request.query,
                "Authenticated query"
            ),
            None => info!(
                route = %route,
                kind = grant.statement.kind.as_str(),
                query = %request.query,
                "Public query"
            ),
        }

        let outcome = endpoint
            .target()
            .execute(
                &request.query,
                request.params.as_ref(),
                grant.shape,
                grant.access(),
            )
            .await?;

        Ok(QueryResponse::from_outcome(&grant, outcome))
    }
}

fn is_valid_route(route: &str) -> bool {
    route.starts_with('/') && !route.contains([':', '*', '{', '}'])
}
