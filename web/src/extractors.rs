//! Custom Axum extractors.
//!
//! - `CorrelationId`: the id assigned by the correlation middleware
//! - `BearerToken`: raw token from `Authorization: Bearer` or `?token=`
//!
//! Turning a token into a principal needs application state and lives in the
//! application crate.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::CORRELATION_ID_HEADER;

/// Correlation ID for request tracing.
///
/// Prefers the id stored by the middleware, then the `X-Correlation-ID`
/// header, else a fresh UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<Self>() {
            return Ok(*id);
        }
        let id = parts
            .headers
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);
        Ok(Self(id))
    }
}

/// Raw bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken(pub String);

impl BearerToken {
    /// Token from the `Authorization` header or the `token` query parameter.
    ///
    /// Browsers cannot set headers on websocket upgrades, hence the query fallback.
    #[must_use]
    pub fn from_parts(parts: &Parts) -> Option<Self> {
        let from_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| {
                v.strip_prefix("Bearer ")
                    .or_else(|| v.strip_prefix("bearer "))
            })
            .map(str::trim)
            .filter(|t| !t.is_empty());

        if let Some(token) = from_header {
            return Some(Self(token.to_string()));
        }

        parts.uri.query().and_then(|q| {
            q.split('&')
                .filter_map(|pair| pair.split_once('='))
                .find(|(k, _)| *k == "token")
                .map(|(_, v)| v.to_string())
                .filter(|t| !t.is_empty())
                .map(Self)
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_parts(parts).ok_or_else(|| AppError::unauthorized("Missing bearer token"))
    }
}
