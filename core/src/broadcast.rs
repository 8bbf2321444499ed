//! Realtime fanout seam.
//!
//! Services publish [`RealtimeEvent`]s to named rooms without knowing who is
//! connected. The session fabric implements [`Broadcaster`]; a shared bus
//! could implement it for multi-process deployments.

use crate::types::{ConversationId, Role, UserId, VehicleId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Realtime namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    /// Root namespace: chat, notifications and status changes.
    Chat,
    /// Vehicle tracking.
    Tracking,
}

impl Namespace {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Tracking => "tracking",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connected session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Wrap a UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Named event with a JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    /// Event name, e.g. `chat:message_created`.
    pub event: String,
    /// Payload.
    pub data: Value,
}

impl RealtimeEvent {
    /// Build an event.
    #[must_use]
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// Room name builders.
pub mod rooms {
    use super::{ConversationId, Role, UserId, VehicleId};

    /// Room every chat session joins.
    pub const BROADCAST: &str = "broadcast";

    /// `conversation:<id>`
    #[must_use]
    pub fn conversation(id: ConversationId) -> String {
        format!("conversation:{id}")
    }

    /// `vehicle:<id>`
    #[must_use]
    pub fn vehicle(id: VehicleId) -> String {
        format!("vehicle:{id}")
    }

    /// `user:<id>`
    #[must_use]
    pub fn user(id: UserId) -> String {
        format!("user:{id}")
    }

    /// `role:<role>`
    #[must_use]
    pub fn role(role: Role) -> String {
        format!("role:{role}")
    }
}

/// Publishes events to rooms.
///
/// Publishing never blocks on slow receivers.
pub trait Broadcaster: Send + Sync {
    /// Deliver `event` to every session in `room`, except `exclude`.
    ///
    /// Returns the number of sessions the event was queued for.
    fn publish(
        &self,
        namespace: Namespace,
        room: &str,
        event: RealtimeEvent,
        exclude: Option<SessionId>,
    ) -> usize;
}
