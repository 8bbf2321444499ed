//! Conversations and messages.
//!
//! Every operation checks that the caller is a participant. Changes are
//! published to the `conversation:<id>` room of the chat namespace, and new
//! conversations to the `user:<id>` room of each member so open inboxes
//! refresh without a join.

use std::collections::BTreeSet;
use std::sync::Arc;

use carhire_core::broadcast::{Broadcaster, Namespace, RealtimeEvent, SessionId, rooms};
use carhire_core::environment::{Clock, IdGenerator};
use carhire_core::error::{DomainError, DomainResult, ErrorKind, codes};
use carhire_core::repository::{ConversationRepository, MessageRepository, UserRepository};
use carhire_core::types::{
    Attachment, Conversation, ConversationContext, ConversationId, ConversationKind, Message,
    MessageId, Participant, Principal, Role, UserId,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::metrics;

/// Longest accepted message text, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// Length of the conversation preview, in characters.
pub const PREVIEW_CHARS: usize = 200;

/// Largest page of messages.
pub const MAX_PAGE: usize = 100;

/// Page size when the client sends none.
pub const DEFAULT_PAGE: usize = 50;

/// A conversation to open.
#[derive(Debug, Clone, Deserialize)]
pub struct NewConversation {
    /// Other members; the creator is always added.
    pub participant_ids: Vec<UserId>,
    /// Direct for two members, group otherwise, unless given.
    pub kind: Option<ConversationKind>,
    /// Optional title.
    pub title: Option<String>,
    /// Booking context.
    #[serde(default)]
    pub context: ConversationContext,
}

/// A message to send.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewMessage {
    /// Text; trimmed.
    #[serde(default)]
    pub content: String,
    /// Files.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Role recorded for a participant: the most privileged one they hold.
fn primary_role(roles: &BTreeSet<Role>) -> Role {
    [Role::Admin, Role::Manager, Role::Agent, Role::Driver, Role::Customer]
        .into_iter()
        .find(|r| roles.contains(r))
        .unwrap_or(Role::Customer)
}

/// Conversation list preview for a message.
#[must_use]
pub fn preview(content: &str, attachments: &[Attachment]) -> String {
    if !content.is_empty() {
        return content.chars().take(PREVIEW_CHARS).collect();
    }
    match attachments.first() {
        Some(a) if a.is_image() => "[Image]".to_string(),
        _ => "[File]".to_string(),
    }
}

fn not_a_participant(id: ConversationId) -> DomainError {
    DomainError::new(
        ErrorKind::Forbidden,
        codes::NOT_A_PARTICIPANT,
        format!("not a participant of conversation {id}"),
    )
}

/// Chat over the conversation and message repositories.
#[derive(Clone)]
pub struct ChatService {
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
    users: Arc<dyn UserRepository>,
    broadcaster: Arc<dyn Broadcaster>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl ChatService {
    /// Service over its collaborators.
    #[must_use]
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        messages: Arc<dyn MessageRepository>,
        users: Arc<dyn UserRepository>,
        broadcaster: Arc<dyn Broadcaster>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            conversations,
            messages,
            users,
            broadcaster,
            clock,
            ids,
        }
    }

    fn publish(&self, id: ConversationId, event: RealtimeEvent, exclude: Option<SessionId>) {
        self.broadcaster
            .publish(Namespace::Chat, &rooms::conversation(id), event, exclude);
    }

    async fn load_message(&self, id: MessageId) -> DomainResult<Message> {
        self.messages
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Message", id))
    }

    /// Open a conversation. A direct conversation that already exists for the
    /// same pair and context is returned instead of a new one.
    ///
    /// # Errors
    ///
    /// `VALIDATION_ERROR` for fewer than two members or a direct conversation
    /// with more than two, `NOT_FOUND` for an unknown or inactive member.
    pub async fn create_conversation(
        &self,
        creator: &Principal,
        input: NewConversation,
    ) -> DomainResult<Conversation> {
        let members: BTreeSet<UserId> = input
            .participant_ids
            .iter()
            .copied()
            .chain([creator.user_id])
            .collect();
        if members.len() < 2 {
            return Err(DomainError::invalid_input(
                "a conversation needs at least two participants",
            ));
        }
        let kind = input.kind.unwrap_or(if members.len() == 2 {
            ConversationKind::Direct
        } else {
            ConversationKind::Group
        });
        if kind == ConversationKind::Direct && members.len() != 2 {
            return Err(DomainError::invalid_input(
                "a direct conversation has exactly two participants",
            ));
        }

        if kind == ConversationKind::Direct {
            let other = members
                .iter()
                .copied()
                .find(|m| *m != creator.user_id)
                .unwrap_or(creator.user_id);
            if let Some(existing) = self
                .conversations
                .find_direct(creator.user_id, other, input.context)
                .await?
            {
                tracing::debug!(conversation_id = %existing.id, "Reusing direct conversation");
                return Ok(existing);
            }
        }

        let now = self.clock.now();
        let mut participants = Vec::with_capacity(members.len());
        for member in &members {
            let user = self
                .users
                .get(*member)
                .await?
                .filter(carhire_core::types::User::is_active)
                .ok_or_else(|| DomainError::not_found("User", member))?;
            participants.push(Participant {
                user_id: user.id,
                role: primary_role(&user.roles),
                joined_at: now,
            });
        }

        let conversation = Conversation {
            id: ConversationId::from_uuid(self.ids.next_uuid()),
            kind,
            title: input
                .title
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            context: input.context,
            participants,
            created_by: creator.user_id,
            last_message_at: None,
            last_message_preview: None,
            is_archived: false,
            created_at: now,
        };
        let stored = self.conversations.insert(conversation).await?;
        tracing::info!(conversation_id = %stored.id, kind = ?stored.kind, members = stored.participants.len(), "Conversation created");

        let event = RealtimeEvent::new("chat:conversation_created", json!(stored));
        for member in &members {
            self.broadcaster
                .publish(Namespace::Chat, &rooms::user(*member), event.clone(), None);
        }
        Ok(stored)
    }

    /// The caller's open conversations, most recent activity first.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    pub async fn list_conversations(&self, user: &Principal) -> DomainResult<Vec<Conversation>> {
        self.conversations.list_for_user(user.user_id).await
    }

    /// One conversation the caller belongs to.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `NOT_A_PARTICIPANT`.
    pub async fn get(&self, user: &Principal, id: ConversationId) -> DomainResult<Conversation> {
        let conversation = self
            .conversations
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Conversation", id))?;
        if conversation.has_participant(user.user_id) {
            Ok(conversation)
        } else {
            Err(not_a_participant(id))
        }
    }

    /// Archive a conversation for all of its participants: it leaves every
    /// listing and refuses new messages. Archiving twice is a no-op.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `NOT_A_PARTICIPANT`.
    pub async fn archive(&self, user: &Principal, id: ConversationId) -> DomainResult<Conversation> {
        let mut conversation = self.get(user, id).await?;
        if conversation.is_archived {
            return Ok(conversation);
        }
        conversation.is_archived = true;
        let stored = self.conversations.update(conversation).await?;
        tracing::info!(conversation_id = %id, user_id = %user.user_id, "Conversation archived");
        Ok(stored)
    }

    /// Post a message and publish `chat:message_created`.
    ///
    /// # Errors
    ///
    /// `EMPTY_MESSAGE`, `MESSAGE_TOO_LONG`, `CONVERSATION_ARCHIVED`,
    /// `NOT_FOUND`, `NOT_A_PARTICIPANT`.
    pub async fn send_message(
        &self,
        user: &Principal,
        conversation_id: ConversationId,
        input: NewMessage,
    ) -> DomainResult<Message> {
        let content = input.content.trim().to_string();
        if content.is_empty() && input.attachments.is_empty() {
            return Err(DomainError::validation(
                codes::EMPTY_MESSAGE,
                "a message needs text or an attachment",
            ));
        }
        if content.chars().count() > MAX_MESSAGE_CHARS {
            return Err(DomainError::validation(
                codes::MESSAGE_TOO_LONG,
                format!("messages are limited to {MAX_MESSAGE_CHARS} characters"),
            ));
        }
        let conversation = self.get(user, conversation_id).await?;
        if conversation.is_archived {
            return Err(DomainError::invalid_state(
                codes::CONVERSATION_ARCHIVED,
                format!("conversation {conversation_id} is archived"),
            ));
        }

        let now = self.clock.now();
        let message = Message {
            id: MessageId::from_uuid(self.ids.next_uuid()),
            conversation_id,
            sender_id: user.user_id,
            content,
            attachments: input.attachments,
            read_by: BTreeSet::from([user.user_id]),
            is_deleted: false,
            deleted_at: None,
            created_at: now,
        };
        let message = self.messages.insert(message).await?;
        self.conversations
            .touch_last_message(
                conversation_id,
                now,
                preview(&message.content, &message.attachments),
            )
            .await?;

        metrics::record_chat_message();
        tracing::debug!(conversation_id = %conversation_id, message_id = %message.id, "Message sent");
        self.publish(
            conversation_id,
            RealtimeEvent::new("chat:message_created", json!(message)),
            None,
        );
        Ok(message)
    }

    /// A page of messages, newest first, created before `before`.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `NOT_A_PARTICIPANT`.
    pub async fn list_messages(
        &self,
        user: &Principal,
        conversation_id: ConversationId,
        before: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> DomainResult<Vec<Message>> {
        self.get(user, conversation_id).await?;
        let limit = limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
        self.messages.list(conversation_id, before, limit).await
    }

    /// Add the caller to `read_by`. Only the first read publishes
    /// `chat:message_read`.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `NOT_A_PARTICIPANT`.
    pub async fn mark_read(&self, user: &Principal, message_id: MessageId) -> DomainResult<Message> {
        let message = self.load_message(message_id).await?;
        self.get(user, message.conversation_id).await?;
        let (message, changed) = self.messages.add_reader(message_id, user.user_id).await?;
        if changed {
            self.publish(
                message.conversation_id,
                RealtimeEvent::new(
                    "chat:message_read",
                    json!({
                        "conversation_id": message.conversation_id,
                        "message_id": message.id,
                        "user_id": user.user_id,
                    }),
                ),
                None,
            );
        }
        Ok(message)
    }

    /// Soft-delete the caller's own message: the text is cleared, attachments
    /// stay. Deleting twice is a no-op.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `FORBIDDEN` for someone else's message.
    pub async fn delete_message(&self, user: &Principal, message_id: MessageId) -> DomainResult<Message> {
        let message = self.load_message(message_id).await?;
        if message.sender_id != user.user_id {
            return Err(DomainError::forbidden("only the sender can delete a message"));
        }
        let (message, changed) = self
            .messages
            .soft_delete(message_id, self.clock.now())
            .await?;
        if changed {
            tracing::info!(message_id = %message.id, conversation_id = %message.conversation_id, "Message deleted");
            self.publish(
                message.conversation_id,
                RealtimeEvent::new(
                    "chat:message_deleted",
                    json!({
                        "conversation_id": message.conversation_id,
                        "message_id": message.id,
                        "deleted_at": message.deleted_at,
                    }),
                ),
                None,
            );
        }
        Ok(message)
    }

    /// Publish `typing:start` or `typing:stop` to everyone in the room but
    /// the originating session.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `NOT_A_PARTICIPANT`.
    pub async fn typing(
        &self,
        user: &Principal,
        conversation_id: ConversationId,
        started: bool,
        origin: Option<SessionId>,
    ) -> DomainResult<()> {
        self.get(user, conversation_id).await?;
        let name = if started { "typing:start" } else { "typing:stop" };
        self.publish(
            conversation_id,
            RealtimeEvent::new(
                name,
                json!({ "conversation_id": conversation_id, "user_id": user.user_id }),
            ),
            origin,
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use carhire_testing::recorders::RecordingBroadcaster;
    use carhire_testing::{ManualClock, SequentialIdGenerator, at, fixtures};

    struct Harness {
        chat: ChatService,
        broadcaster: Arc<RecordingBroadcaster>,
        clock: Arc<ManualClock>,
        alice: Principal,
        bob: Principal,
        carol: Principal,
    }

    async fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        let clock = Arc::new(ManualClock::new(at("2025-03-01T09:00:00Z")));
        let alice = fixtures::user(1, &[Role::Customer]);
        let bob = fixtures::user(2, &[Role::Driver]);
        let carol = fixtures::user(3, &[Role::Agent]);
        for user in [&alice, &bob, &carol] {
            UserRepository::insert(store.as_ref(), user.clone()).await.unwrap();
        }
        Harness {
            chat: ChatService::new(
                store.clone(),
                store.clone(),
                store,
                broadcaster.clone(),
                clock.clone(),
                Arc::new(SequentialIdGenerator::new()),
            ),
            broadcaster,
            clock,
            alice: fixtures::principal(&alice),
            bob: fixtures::principal(&bob),
            carol: fixtures::principal(&carol),
        }
    }

    fn direct_with(other: &Principal) -> NewConversation {
        NewConversation {
            participant_ids: vec![other.user_id],
            kind: None,
            title: None,
            context: ConversationContext::General,
        }
    }

    fn text(content: &str) -> NewMessage {
        NewMessage {
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    #[tokio::test]
    async fn direct_conversation_is_deduplicated() {
        let h = harness().await;
        let first = h.chat.create_conversation(&h.alice, direct_with(&h.bob)).await.unwrap();
        assert_eq!(first.kind, ConversationKind::Direct);
        assert_eq!(first.participants.len(), 2);
        let bob_entry = first.participants.iter().find(|p| p.user_id == h.bob.user_id).unwrap();
        assert_eq!(bob_entry.role, Role::Driver);

        let again = h.chat.create_conversation(&h.bob, direct_with(&h.alice)).await.unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(h.broadcaster.events_in(&rooms::user(h.bob.user_id), "chat:conversation_created").len(), 1);
    }

    #[tokio::test]
    async fn conversation_needs_two_members() {
        let h = harness().await;
        let err = h.chat.create_conversation(&h.alice, direct_with(&h.alice)).await.unwrap_err();
        assert_eq!(err.code(), codes::VALIDATION_ERROR);

        let err = h
            .chat
            .create_conversation(
                &h.alice,
                NewConversation {
                    participant_ids: vec![h.bob.user_id, h.carol.user_id],
                    kind: Some(ConversationKind::Direct),
                    title: None,
                    context: ConversationContext::General,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::VALIDATION_ERROR);

        let err = h
            .chat
            .create_conversation(&h.alice, direct_with(&fixtures::principal(&fixtures::user(9, &[Role::Customer]))))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn send_updates_preview_and_read_by() {
        let h = harness().await;
        let conv = h.chat.create_conversation(&h.alice, direct_with(&h.bob)).await.unwrap();
        let message = h.chat.send_message(&h.alice, conv.id, text("  hello  ")).await.unwrap();
        assert_eq!(message.content, "hello");
        assert!(message.read_by.contains(&h.alice.user_id));

        let conv = h.chat.get(&h.bob, conv.id).await.unwrap();
        assert_eq!(conv.last_message_preview.as_deref(), Some("hello"));
        assert_eq!(conv.last_message_at, Some(at("2025-03-01T09:00:00Z")));

        let events = h.broadcaster.events_in(&rooms::conversation(conv.id), "chat:message_created");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data["id"], json!(message.id));
    }

    #[tokio::test]
    async fn message_validation() {
        let h = harness().await;
        let conv = h.chat.create_conversation(&h.alice, direct_with(&h.bob)).await.unwrap();

        let err = h.chat.send_message(&h.alice, conv.id, text("   ")).await.unwrap_err();
        assert_eq!(err.code(), codes::EMPTY_MESSAGE);

        let long = "x".repeat(MAX_MESSAGE_CHARS + 1);
        let err = h.chat.send_message(&h.alice, conv.id, text(&long)).await.unwrap_err();
        assert_eq!(err.code(), codes::MESSAGE_TOO_LONG);

        let err = h.chat.send_message(&h.carol, conv.id, text("hi")).await.unwrap_err();
        assert_eq!(err.code(), codes::NOT_A_PARTICIPANT);
    }

    #[tokio::test]
    async fn attachment_only_message_previews_kind() {
        let h = harness().await;
        let conv = h.chat.create_conversation(&h.alice, direct_with(&h.bob)).await.unwrap();
        let photo = Attachment {
            url: "https://files.test/a.jpg".into(),
            mime_type: "image/jpeg".into(),
            name: None,
            size: Some(1024),
        };
        h.chat
            .send_message(&h.alice, conv.id, NewMessage { content: String::new(), attachments: vec![photo] })
            .await
            .unwrap();
        let conv = h.chat.get(&h.alice, conv.id).await.unwrap();
        assert_eq!(conv.last_message_preview.as_deref(), Some("[Image]"));

        let long = "y".repeat(300);
        assert_eq!(preview(&long, &[]).chars().count(), PREVIEW_CHARS);
    }

    #[tokio::test]
    async fn mark_read_is_idempotent() {
        let h = harness().await;
        let conv = h.chat.create_conversation(&h.alice, direct_with(&h.bob)).await.unwrap();
        let message = h.chat.send_message(&h.alice, conv.id, text("hi")).await.unwrap();

        let read = h.chat.mark_read(&h.bob, message.id).await.unwrap();
        assert!(read.read_by.contains(&h.bob.user_id));
        h.chat.mark_read(&h.bob, message.id).await.unwrap();
        assert_eq!(h.broadcaster.events_in(&rooms::conversation(conv.id), "chat:message_read").len(), 1);

        let err = h.chat.mark_read(&h.carol, message.id).await.unwrap_err();
        assert_eq!(err.code(), codes::NOT_A_PARTICIPANT);
    }

    #[tokio::test]
    async fn only_sender_deletes() {
        let h = harness().await;
        let conv = h.chat.create_conversation(&h.alice, direct_with(&h.bob)).await.unwrap();
        let message = h.chat.send_message(&h.alice, conv.id, text("oops")).await.unwrap();

        let err = h.chat.delete_message(&h.bob, message.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        h.clock.advance(chrono::Duration::minutes(1));
        let deleted = h.chat.delete_message(&h.alice, message.id).await.unwrap();
        assert!(deleted.is_deleted);
        assert_eq!(deleted.content, "");
        assert_eq!(deleted.deleted_at, Some(at("2025-03-01T09:01:00Z")));
        h.chat.delete_message(&h.alice, message.id).await.unwrap();
        assert_eq!(h.broadcaster.events_in(&rooms::conversation(conv.id), "chat:message_deleted").len(), 1);
    }

    #[tokio::test]
    async fn listing_and_archive() {
        let h = harness().await;
        let with_bob = h.chat.create_conversation(&h.alice, direct_with(&h.bob)).await.unwrap();
        h.clock.advance(chrono::Duration::minutes(1));
        let with_carol = h.chat.create_conversation(&h.alice, direct_with(&h.carol)).await.unwrap();
        h.clock.advance(chrono::Duration::minutes(1));
        h.chat.send_message(&h.alice, with_bob.id, text("latest")).await.unwrap();

        let listed: Vec<_> = h.chat.list_conversations(&h.alice).await.unwrap().iter().map(|c| c.id).collect();
        assert_eq!(listed, vec![with_bob.id, with_carol.id]);

        h.chat.archive(&h.alice, with_bob.id).await.unwrap();
        let listed = h.chat.list_conversations(&h.alice).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(h.chat.list_conversations(&h.bob).await.unwrap().is_empty());
        let err = h.chat.send_message(&h.bob, with_bob.id, text("hello?")).await.unwrap_err();
        assert_eq!(err.code(), codes::CONVERSATION_ARCHIVED);
    }

    #[tokio::test]
    async fn message_pages_are_bounded() {
        let h = harness().await;
        let conv = h.chat.create_conversation(&h.alice, direct_with(&h.bob)).await.unwrap();
        for i in 0..5 {
            h.clock.advance(chrono::Duration::seconds(1));
            h.chat.send_message(&h.alice, conv.id, text(&format!("m{i}"))).await.unwrap();
        }
        let page = h.chat.list_messages(&h.bob, conv.id, None, Some(2)).await.unwrap();
        assert_eq!(page.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(), ["m4", "m3"]);
        let older = h
            .chat
            .list_messages(&h.bob, conv.id, Some(page[1].created_at), Some(500))
            .await
            .unwrap();
        assert_eq!(older.len(), 3);
    }

    #[tokio::test]
    async fn typing_excludes_origin() {
        let h = harness().await;
        let conv = h.chat.create_conversation(&h.alice, direct_with(&h.bob)).await.unwrap();
        h.chat.typing(&h.alice, conv.id, true, None).await.unwrap();
        let events = h.broadcaster.events_in(&rooms::conversation(conv.id), "typing:start");
        assert_eq!(events[0].data["user_id"], json!(h.alice.user_id));

        let err = h.chat.typing(&h.carol, conv.id, false, None).await.unwrap_err();
        assert_eq!(err.code(), codes::NOT_A_PARTICIPANT);
    }
}
