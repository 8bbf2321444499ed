//! HS256 bearer tokens for users and tracker devices.
//!
//! Expiry is checked against the injected clock rather than the wall clock,
//! so tests can mint and verify tokens at fixed instants.

use carhire_core::types::{Principal, Role, TrackerId, UserId};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

/// Token failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Malformed or badly signed.
    #[error("invalid token")]
    Invalid,
    /// Past its expiry.
    #[error("token expired")]
    Expired,
    /// Could not be signed.
    #[error("token encoding failed: {0}")]
    Encoding(String),
}

/// Subject kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// A platform user.
    User,
    /// A tracker device.
    Tracker,
}

/// JWT claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject id.
    pub sub: Uuid,
    /// Subject kind.
    pub kind: TokenKind,
    /// User roles; empty for trackers.
    #[serde(default)]
    pub roles: Vec<Role>,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expiry (unix seconds).
    pub exp: i64,
}

/// Verified token subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authenticated {
    /// User with roles.
    User(Principal),
    /// Tracker device.
    Tracker(TrackerId),
}

/// Issues and verifies tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    user_ttl: Duration,
    device_ttl: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("user_ttl", &self.user_ttl)
            .field("device_ttl", &self.device_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Create a service from a shared secret.
    #[must_use]
    pub fn new(secret: &[u8], user_ttl: Duration, device_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            user_ttl,
            device_ttl,
        }
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    /// Token for a user.
    ///
    /// # Errors
    ///
    /// [`TokenError::Encoding`] if signing fails.
    pub fn issue_user(&self, principal: &Principal, now: DateTime<Utc>) -> Result<String, TokenError> {
        self.sign(&Claims {
            sub: principal.user_id.as_uuid(),
            kind: TokenKind::User,
            roles: principal.roles.iter().copied().collect(),
            iat: now.timestamp(),
            exp: (now + self.user_ttl).timestamp(),
        })
    }

    /// Token for a tracker device.
    ///
    /// # Errors
    ///
    /// [`TokenError::Encoding`] if signing fails.
    pub fn issue_device(&self, tracker: TrackerId, now: DateTime<Utc>) -> Result<String, TokenError> {
        self.sign(&Claims {
            sub: tracker.as_uuid(),
            kind: TokenKind::Tracker,
            roles: Vec::new(),
            iat: now.timestamp(),
            exp: (now + self.device_ttl).timestamp(),
        })
    }

    /// Verify signature and expiry.
    ///
    /// # Errors
    ///
    /// [`TokenError::Invalid`] or [`TokenError::Expired`].
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Authenticated, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims = HashSet::new();

        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|_| TokenError::Invalid)?
            .claims;

        if claims.exp <= now.timestamp() {
            return Err(TokenError::Expired);
        }

        Ok(match claims.kind {
            TokenKind::User => Authenticated::User(Principal::new(
                UserId::from_uuid(claims.sub),
                claims.roles,
            )),
            TokenKind::Tracker => Authenticated::Tracker(TrackerId::from_uuid(claims.sub)),
        })
    }
}
