use super::ids::{ConversationId, DriverBookingId, MessageId, ReservationId, UserId};
use super::user::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Direct (two people) or group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    /// One-to-one.
    Direct,
    /// Many participants.
    Group,
}

/// What the conversation is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ConversationContext {
    /// No specific booking.
    #[default]
    General,
    /// A reservation.
    Reservation(ReservationId),
    /// A driver booking.
    DriverBooking(DriverBookingId),
}

/// Member with a role snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Member.
    pub user_id: UserId,
    /// Primary role when they joined.
    pub role: Role,
    /// Join time.
    pub joined_at: DateTime<Utc>,
}

/// Chat context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Identifier.
    pub id: ConversationId,
    /// Direct or group.
    pub kind: ConversationKind,
    /// Optional title.
    pub title: Option<String>,
    /// Booking context.
    pub context: ConversationContext,
    /// At least two members.
    pub participants: Vec<Participant>,
    /// Creator.
    pub created_by: UserId,
    /// Time of the latest message.
    pub last_message_at: Option<DateTime<Utc>>,
    /// Preview of the latest message.
    pub last_message_preview: Option<String>,
    /// Soft archive flag.
    pub is_archived: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Whether `user` is a member.
    #[must_use]
    pub fn has_participant(&self, user: UserId) -> bool {
        self.participants.iter().any(|p| p.user_id == user)
    }

    /// Member ids in a stable order.
    #[must_use]
    pub fn participant_ids(&self) -> BTreeSet<UserId> {
        self.participants.iter().map(|p| p.user_id).collect()
    }
}

/// File attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Storage URL.
    pub url: String,
    /// MIME type.
    pub mime_type: String,
    /// Original file name.
    pub name: Option<String>,
    /// Size in bytes.
    pub size: Option<u64>,
}

impl Attachment {
    /// `image/*` attachment.
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.mime_type.to_ascii_lowercase().starts_with("image/")
    }
}

/// Chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier.
    pub id: MessageId,
    /// Owning conversation.
    pub conversation_id: ConversationId,
    /// Sender, a participant.
    pub sender_id: UserId,
    /// Trimmed text; cleared on delete.
    pub content: String,
    /// Attachments, kept on delete.
    pub attachments: Vec<Attachment>,
    /// Users who read it; always contains the sender.
    pub read_by: BTreeSet<UserId>,
    /// Soft delete flag.
    pub is_deleted: bool,
    /// Delete time.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}
