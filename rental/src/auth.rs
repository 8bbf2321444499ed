//! Bearer authentication for HTTP handlers and websocket upgrades.
//!
//! Tokens are verified with the shared [`TokenService`]; a user token is then
//! resolved against the user repository so suspended accounts lose access
//! immediately and roles come from the stored user, not the token.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use carhire_core::environment::Clock;
use carhire_core::repository::{TrackerRepository, UserRepository};
use carhire_core::types::{Principal, TrackerId};
use carhire_web::{AppError, Authenticated, BearerToken, TokenError, TokenService};

/// Who is calling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    /// A platform user.
    User(Principal),
    /// A tracker device.
    Tracker(TrackerId),
}

/// Extractor for endpoints that only users may call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser(pub Principal);

/// Extractor for device endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthTracker(pub TrackerId);

/// Resolves bearer tokens to callers.
#[derive(Clone)]
pub struct Authenticator {
    tokens: TokenService,
    users: Arc<dyn UserRepository>,
    trackers: Arc<dyn TrackerRepository>,
    clock: Arc<dyn Clock>,
}

impl Authenticator {
    /// Authenticator over the token service and identity repositories.
    #[must_use]
    pub fn new(
        tokens: TokenService,
        users: Arc<dyn UserRepository>,
        trackers: Arc<dyn TrackerRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tokens,
            users,
            trackers,
            clock,
        }
    }

    /// Verify `token` and load its subject.
    ///
    /// # Errors
    ///
    /// 401 for a bad, expired or orphaned token, or an inactive user.
    pub async fn authenticate(&self, token: &str) -> Result<Caller, AppError> {
        let subject = self
            .tokens
            .verify(token, self.clock.now())
            .map_err(|e| match e {
                TokenError::Expired => AppError::unauthorized("Token expired"),
                TokenError::Invalid | TokenError::Encoding(_) => AppError::unauthorized("Invalid token"),
            })?;

        match subject {
            Authenticated::User(claimed) => {
                let user = self
                    .users
                    .get(claimed.user_id)
                    .await?
                    .filter(carhire_core::types::User::is_active)
                    .ok_or_else(|| AppError::unauthorized("Unknown or inactive user"))?;
                Ok(Caller::User(Principal::new(user.id, user.roles)))
            }
            Authenticated::Tracker(id) => {
                self.trackers
                    .get(id)
                    .await?
                    .ok_or_else(|| AppError::unauthorized("Unknown tracker"))?;
                Ok(Caller::Tracker(id))
            }
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
    Authenticator: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_parts(parts)
            .ok_or_else(|| AppError::unauthorized("Missing bearer token"))?;
        Authenticator::from_ref(state).authenticate(&token).await
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Authenticator: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Caller::from_request_parts(parts, state).await? {
            Caller::User(principal) => Ok(Self(principal)),
            Caller::Tracker(_) => Err(AppError::forbidden("User token required")),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthTracker
where
    S: Send + Sync,
    Authenticator: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Caller::from_request_parts(parts, state).await? {
            Caller::Tracker(id) => Ok(Self(id)),
            Caller::User(_) => Err(AppError::forbidden("Device token required")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use carhire_core::types::{Role, UserStatus};
    use carhire_testing::{FixedClock, at, fixtures};
    use chrono::Duration;

    fn tokens() -> TokenService {
        TokenService::new(b"secret", Duration::hours(1), Duration::days(30))
    }

    fn authenticator(store: &Arc<MemoryStore>) -> Authenticator {
        Authenticator::new(
            tokens(),
            store.clone(),
            store.clone(),
            Arc::new(FixedClock::new(at("2025-03-01T09:00:00Z"))),
        )
    }

    #[tokio::test]
    async fn roles_come_from_the_stored_user() {
        let store = Arc::new(MemoryStore::new());
        let user = fixtures::user(1, &[Role::Manager]);
        UserRepository::insert(store.as_ref(), user.clone()).await.unwrap();
        let stale = Principal::new(user.id, [Role::Customer]);
        let token = tokens().issue_user(&stale, at("2025-03-01T08:30:00Z")).unwrap();

        let caller = authenticator(&store).authenticate(&token).await.unwrap();
        assert_eq!(caller, Caller::User(fixtures::principal(&user)));
    }

    #[tokio::test]
    async fn suspended_user_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let mut user = fixtures::user(1, &[Role::Customer]);
        user.status = UserStatus::Suspended;
        UserRepository::insert(store.as_ref(), user.clone()).await.unwrap();
        let token = tokens().issue_user(&fixtures::principal(&user), at("2025-03-01T08:30:00Z")).unwrap();

        let err = authenticator(&store).authenticate(&token).await.unwrap_err();
        assert_eq!(err.code(), "UNAUTHENTICATED");
    }

    #[tokio::test]
    async fn expired_and_unknown_tracker_tokens_are_rejected() {
        let store = Arc::new(MemoryStore::new());
        let tracker = TrackerId::from_uuid(uuid::Uuid::from_u128(77));
        let token = tokens().issue_device(tracker, at("2025-03-01T08:30:00Z")).unwrap();
        assert!(authenticator(&store).authenticate(&token).await.is_err());

        let old = tokens().issue_device(tracker, at("2025-01-01T00:00:00Z")).unwrap();
        let err = authenticator(&store).authenticate(&old).await.unwrap_err();
        assert_eq!(err.code(), "UNAUTHENTICATED");
    }
}
