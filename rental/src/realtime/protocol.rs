//! Websocket frames.
//!
//! Client to server: `{"event": "...", "ref": "...", "data": {...}}` where
//! `ref` is optional and echoed on the reply. Server to client:
//! `{"event": "...", "data": {...}}`, plus `ack` and `error` replies.

use carhire_core::broadcast::RealtimeEvent;
use carhire_core::error::{DomainError, DomainResult};
use carhire_core::types::{Attachment, ConversationId, MessageId, VehicleId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::tracking::LocationReport;

/// Inbound frame with an untyped payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientFrame {
    /// Event name.
    pub event: String,
    /// Correlation reference chosen by the client.
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    /// Payload.
    #[serde(default)]
    pub data: Value,
}

/// Requests a session can make.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientCommand {
    /// Join `conversation:<id>`.
    #[serde(rename = "chat:join")]
    Join {
        /// Conversation.
        conversation_id: ConversationId,
    },
    /// Leave `conversation:<id>`.
    #[serde(rename = "chat:leave")]
    Leave {
        /// Conversation.
        conversation_id: ConversationId,
    },
    /// Post a message.
    #[serde(rename = "chat:send_message")]
    SendMessage {
        /// Conversation.
        conversation_id: ConversationId,
        /// Text.
        #[serde(default)]
        content: String,
        /// Files.
        #[serde(default)]
        attachments: Vec<Attachment>,
    },
    /// Read receipt.
    #[serde(rename = "chat:mark_read")]
    MarkRead {
        /// Message.
        message_id: MessageId,
    },
    /// Soft-delete an own message.
    #[serde(rename = "chat:delete_message")]
    DeleteMessage {
        /// Message.
        message_id: MessageId,
    },
    /// Typing indicator on.
    #[serde(rename = "typing:start")]
    TypingStart {
        /// Conversation.
        conversation_id: ConversationId,
    },
    /// Typing indicator off.
    #[serde(rename = "typing:stop")]
    TypingStop {
        /// Conversation.
        conversation_id: ConversationId,
    },
    /// Bind the tracker to a vehicle and join its room.
    #[serde(rename = "tracker:attach_vehicle")]
    AttachVehicle {
        /// Vehicle.
        vehicle_id: VehicleId,
    },
    /// Report a fix.
    #[serde(rename = "tracker:location_update")]
    LocationUpdate(LocationReport),
    /// Unbind the tracker.
    #[serde(rename = "tracker:detach_vehicle")]
    DetachVehicle {},
    /// Follow a vehicle.
    #[serde(rename = "vehicle:subscribe")]
    Subscribe {
        /// Vehicle.
        vehicle_id: VehicleId,
    },
    /// Stop following a vehicle.
    #[serde(rename = "vehicle:unsubscribe")]
    Unsubscribe {
        /// Vehicle.
        vehicle_id: VehicleId,
    },
}

impl ClientFrame {
    /// Parse a text frame.
    ///
    /// # Errors
    ///
    /// `VALIDATION_ERROR` for malformed JSON.
    pub fn parse(text: &str) -> DomainResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| DomainError::invalid_input(format!("malformed frame: {e}")))
    }

    /// The typed command. A missing payload reads as an empty object.
    ///
    /// # Errors
    ///
    /// `VALIDATION_ERROR` for an unknown event or a bad payload.
    pub fn command(&self) -> DomainResult<ClientCommand> {
        let data = if self.data.is_null() {
            Value::Object(Map::new())
        } else {
            self.data.clone()
        };
        serde_json::from_value(json!({ "event": self.event, "data": data }))
            .map_err(|e| DomainError::invalid_input(format!("{}: {e}", self.event)))
    }
}

/// Outbound frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerFrame {
    /// Event name, `ack` or `error`.
    pub event: String,
    /// Echo of the client reference.
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Error code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ServerFrame {
    /// Successful reply to a request.
    #[must_use]
    pub fn ack(reference: Option<String>, data: Value) -> Self {
        Self {
            event: "ack".to_string(),
            reference,
            data: Some(data),
            code: None,
            message: None,
        }
    }

    /// Failed reply to a request.
    #[must_use]
    pub fn error(reference: Option<String>, error: &DomainError) -> Self {
        Self {
            event: "error".to_string(),
            reference,
            data: None,
            code: Some(error.code().to_string()),
            message: Some(error.message().to_string()),
        }
    }
}

impl From<RealtimeEvent> for ServerFrame {
    fn from(event: RealtimeEvent) -> Self {
        Self {
            event: event.event,
            reference: None,
            data: Some(event.data),
            code: None,
            message: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use carhire_core::error::codes;
    use uuid::Uuid;

    #[test]
    fn parses_typed_commands() {
        let id = Uuid::from_u128(5);
        let frame = ClientFrame::parse(&format!(
            r#"{{"event":"chat:send_message","ref":"r1","data":{{"conversation_id":"{id}","content":"hello"}}}}"#
        ))
        .unwrap();
        assert_eq!(frame.reference.as_deref(), Some("r1"));
        assert_eq!(
            frame.command().unwrap(),
            ClientCommand::SendMessage {
                conversation_id: ConversationId::from_uuid(id),
                content: "hello".into(),
                attachments: Vec::new(),
            }
        );
    }

    #[test]
    fn payload_may_be_omitted() {
        let frame = ClientFrame::parse(r#"{"event":"tracker:detach_vehicle"}"#).unwrap();
        assert_eq!(frame.command().unwrap(), ClientCommand::DetachVehicle {});
    }

    #[test]
    fn location_accepts_long_names() {
        let frame = ClientFrame::parse(
            r#"{"event":"tracker:location_update","data":{"latitude":-17.8,"longitude":31.05,"speed":12.5}}"#,
        )
        .unwrap();
        let ClientCommand::LocationUpdate(report) = frame.command().unwrap() else {
            unreachable!("location frame parsed as another command");
        };
        assert_eq!((report.lat, report.lon, report.speed), (-17.8, 31.05, Some(12.5)));
        assert_eq!(report.at, None);
    }

    #[test]
    fn unknown_event_is_a_validation_error() {
        let frame = ClientFrame::parse(r#"{"event":"chat:shout","data":{}}"#).unwrap();
        assert_eq!(frame.command().unwrap_err().code(), codes::VALIDATION_ERROR);
        assert_eq!(ClientFrame::parse("not json").unwrap_err().code(), codes::VALIDATION_ERROR);
    }

    #[test]
    fn server_frames_skip_absent_fields() {
        let event: ServerFrame = RealtimeEvent::new("typing:start", json!({"user_id": 1})).into();
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"event": "typing:start", "data": {"user_id": 1}})
        );

        let error = ServerFrame::error(
            Some("r2".into()),
            &DomainError::validation(codes::EMPTY_MESSAGE, "empty"),
        );
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({"event": "error", "ref": "r2", "code": "EMPTY_MESSAGE", "message": "empty"})
        );
    }
}
