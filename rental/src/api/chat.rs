//! Chat REST endpoints. Every change is also published to the websocket
//! rooms, so REST and socket clients see the same stream.
//!
//! - POST /api/v1/chats/conversations - Open a conversation
//! - GET /api/v1/chats/conversations - Caller's conversations
//! - GET /api/v1/chats/conversations/:id - One conversation
//! - POST /api/v1/chats/conversations/:id/archive - Archive
//! - GET /api/v1/chats/conversations/:id/messages?before&limit - Page of messages
//! - POST /api/v1/chats/conversations/:id/messages - Send
//! - POST /api/v1/chats/messages/:id/read - Read receipt
//! - DELETE /api/v1/chats/messages/:id - Soft-delete an own message

use axum::{
    Json,
    extract::{Path, Query, State},
};
use carhire_core::types::{Conversation, ConversationId, Message, MessageId};
use carhire_web::{ApiResponse, WebResult};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::chat::{NewConversation, NewMessage};
use crate::server::AppState;

/// Message page cursor.
#[derive(Debug, Default, Deserialize)]
pub struct MessagePage {
    /// Only messages sent strictly before this instant.
    pub before: Option<DateTime<Utc>>,
    /// Page size, clamped to 1..=100.
    pub limit: Option<usize>,
}

/// Open a conversation; a direct one is reused when it already exists.
pub async fn create_conversation(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(input): Json<NewConversation>,
) -> WebResult<ApiResponse<Conversation>> {
    let conversation = state
        .realtime
        .chat
        .create_conversation(&principal, input)
        .await?;
    Ok(ApiResponse::created(conversation))
}

/// Caller's conversations.
pub async fn list_conversations(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> WebResult<ApiResponse<Vec<Conversation>>> {
    Ok(ApiResponse::ok(
        state.realtime.chat.list_conversations(&principal).await?,
    ))
}

/// One conversation.
pub async fn get_conversation(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<ConversationId>,
) -> WebResult<ApiResponse<Conversation>> {
    Ok(ApiResponse::ok(state.realtime.chat.get(&principal, id).await?))
}

/// Archive a conversation.
pub async fn archive_conversation(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<ConversationId>,
) -> WebResult<ApiResponse<Conversation>> {
    Ok(ApiResponse::ok(state.realtime.chat.archive(&principal, id).await?))
}

/// Newest-first page of messages.
pub async fn list_messages(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<ConversationId>,
    Query(page): Query<MessagePage>,
) -> WebResult<ApiResponse<Vec<Message>>> {
    let messages = state
        .realtime
        .chat
        .list_messages(&principal, id, page.before, page.limit)
        .await?;
    Ok(ApiResponse::ok(messages))
}

/// Send a message.
pub async fn send_message(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<ConversationId>,
    Json(input): Json<NewMessage>,
) -> WebResult<ApiResponse<Message>> {
    let message = state.realtime.chat.send_message(&principal, id, input).await?;
    Ok(ApiResponse::created(message))
}

/// Read receipt.
pub async fn mark_read(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<MessageId>,
) -> WebResult<ApiResponse<Message>> {
    Ok(ApiResponse::ok(state.realtime.chat.mark_read(&principal, id).await?))
}

/// Soft-delete an own message.
pub async fn delete_message(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<MessageId>,
) -> WebResult<ApiResponse<Message>> {
    Ok(ApiResponse::ok(
        state.realtime.chat.delete_message(&principal, id).await?,
    ))
}
