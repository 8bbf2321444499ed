//! Websocket session loop.
//!
//! One connection runs three tasks: a writer draining the session queue, a
//! pinger, and a reader that handles client frames one at a time. When any
//! of them ends the others are aborted and the session leaves every room.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use carhire_core::broadcast::{Namespace, RealtimeEvent, SessionId, rooms};
use carhire_core::error::{DomainError, DomainResult};
use carhire_core::types::{Principal, TrackerId};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tokio::time::{Instant, interval, sleep};
use tracing::{debug, info, warn};

use super::Realtime;
use super::protocol::{ClientCommand, ClientFrame, ServerFrame};
use crate::auth::{AuthUser, Caller};
use crate::chat::NewMessage;

/// `GET /ws/chat`: user sessions of the chat namespace.
pub async fn chat_socket(
    ws: WebSocketUpgrade,
    State(realtime): State<Realtime>,
    AuthUser(principal): AuthUser,
) -> Response {
    ws.on_upgrade(move |socket| serve(socket, realtime, Namespace::Chat, Caller::User(principal)))
}

/// `GET /ws/tracking`: tracker devices and vehicle subscribers.
pub async fn tracking_socket(
    ws: WebSocketUpgrade,
    State(realtime): State<Realtime>,
    caller: Caller,
) -> Response {
    ws.on_upgrade(move |socket| serve(socket, realtime, Namespace::Tracking, caller))
}

/// Run one session until the client leaves or goes quiet.
pub async fn serve(socket: WebSocket, realtime: Realtime, namespace: Namespace, caller: Caller) {
    let id = SessionId::from_uuid(realtime.ids.next_uuid());
    let mut outbound = realtime.fabric.register(namespace, id);
    let session = Session {
        id,
        namespace,
        caller,
        realtime: realtime.clone(),
    };
    session.open().await;
    info!(session_id = %id, %namespace, "WebSocket session established");

    let (sender, mut receiver) = socket.split();
    let sender = Arc::new(Mutex::new(sender));

    let writer = sender.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let Ok(text) = serde_json::to_string(&frame) else {
                continue;
            };
            if writer.lock().await.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        debug!("WebSocket send task terminated");
    });

    let ping_sender = sender.clone();
    let mut ping_interval = interval(realtime.config.ping_interval);
    let mut ping_task = tokio::spawn(async move {
        ping_interval.tick().await;
        loop {
            ping_interval.tick().await;
            if ping_sender.lock().await.send(Message::Ping(Vec::new())).await.is_err() {
                break;
            }
        }
        debug!("WebSocket ping task terminated");
    });

    let idle_timeout = realtime.config.idle_timeout;
    let mut recv_task = tokio::spawn(async move {
        let timeout = sleep(idle_timeout);
        tokio::pin!(timeout);

        loop {
            tokio::select! {
                msg = receiver.next() => {
                    timeout.as_mut().reset(Instant::now() + idle_timeout);
                    match msg {
                        Some(Ok(Message::Text(text))) => session.handle_text(&text).await,
                        Some(Ok(Message::Close(_))) | None => {
                            info!(session_id = %session.id, "Client closed the session");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            debug!(session_id = %session.id, error = %e, "WebSocket receive failed");
                            break;
                        }
                    }
                }
                () = &mut timeout => {
                    warn!(session_id = %session.id, "WebSocket idle timeout");
                    break;
                }
            }
        }
        debug!("WebSocket receive task terminated");
    });

    tokio::select! {
        _ = (&mut send_task) => {
            ping_task.abort();
            recv_task.abort();
        },
        _ = (&mut ping_task) => {
            send_task.abort();
            recv_task.abort();
        },
        _ = (&mut recv_task) => {
            send_task.abort();
            ping_task.abort();
        },
    }

    realtime.fabric.disconnect(id);
    info!(session_id = %id, %namespace, "WebSocket session closed");
}

/// Per-connection state; owned by the reader task.
struct Session {
    id: SessionId,
    namespace: Namespace,
    caller: Caller,
    realtime: Realtime,
}

impl Session {
    /// Default rooms and the `connected` greeting.
    async fn open(&self) {
        let fabric = &self.realtime.fabric;
        match (&self.caller, self.namespace) {
            (Caller::User(principal), Namespace::Chat) => {
                fabric.join(self.id, rooms::BROADCAST);
                fabric.join(self.id, &rooms::user(principal.user_id));
                for role in &principal.roles {
                    fabric.join(self.id, &rooms::role(*role));
                }
            }
            (Caller::Tracker(tracker), Namespace::Tracking) => {
                match self.realtime.tracking.device(*tracker).await {
                    Ok(device) => {
                        fabric.bind_device(self.id, *tracker, device.vehicle_id);
                    }
                    Err(e) => warn!(tracker_id = %tracker, error = %e, "Tracker session without a tracker"),
                }
            }
            _ => {}
        }
        fabric.send(
            self.id,
            ServerFrame::from(RealtimeEvent::new(
                "connected",
                json!({
                    "session_id": self.id,
                    "namespace": self.namespace,
                    "rooms": fabric.rooms_of(self.id),
                }),
            )),
        );
    }

    fn reply(&self, frame: ServerFrame) {
        self.realtime.fabric.send(self.id, frame);
    }

    async fn handle_text(&self, text: &str) {
        let frame = match ClientFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                self.reply(ServerFrame::error(None, &e));
                return;
            }
        };
        let reference = frame.reference.clone();
        let result = match frame.command() {
            Ok(command) => self.dispatch(command).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(data) => {
                if reference.is_some() {
                    self.reply(ServerFrame::ack(reference, data));
                }
            }
            Err(e) => {
                debug!(session_id = %self.id, event = %frame.event, code = e.code(), "Session request failed");
                self.reply(ServerFrame::error(reference, &e));
            }
        }
    }

    fn chat_user(&self) -> DomainResult<&Principal> {
        match (&self.caller, self.namespace) {
            (Caller::User(principal), Namespace::Chat) => Ok(principal),
            _ => Err(DomainError::forbidden("chat events need a user session on /ws/chat")),
        }
    }

    fn tracker(&self) -> DomainResult<TrackerId> {
        match (&self.caller, self.namespace) {
            (Caller::Tracker(id), Namespace::Tracking) => Ok(*id),
            _ => Err(DomainError::forbidden("tracker events need a device session")),
        }
    }

    fn subscriber(&self) -> DomainResult<()> {
        match (&self.caller, self.namespace) {
            (Caller::User(_), Namespace::Tracking) => Ok(()),
            _ => Err(DomainError::forbidden("vehicle subscriptions need a user session on /ws/tracking")),
        }
    }

    async fn dispatch(&self, command: ClientCommand) -> DomainResult<Value> {
        let chat = &self.realtime.chat;
        let fabric = &self.realtime.fabric;
        match command {
            ClientCommand::Join { conversation_id } => {
                chat.get(self.chat_user()?, conversation_id).await?;
                fabric.join(self.id, &rooms::conversation(conversation_id));
                Ok(json!({ "conversation_id": conversation_id }))
            }
            ClientCommand::Leave { conversation_id } => {
                self.chat_user()?;
                fabric.leave(self.id, &rooms::conversation(conversation_id));
                Ok(json!({ "conversation_id": conversation_id }))
            }
            ClientCommand::SendMessage {
                conversation_id,
                content,
                attachments,
            } => {
                let message = chat
                    .send_message(
                        self.chat_user()?,
                        conversation_id,
                        NewMessage {
                            content,
                            attachments,
                        },
                    )
                    .await?;
                Ok(json!(message))
            }
            ClientCommand::MarkRead { message_id } => {
                Ok(json!(chat.mark_read(self.chat_user()?, message_id).await?))
            }
            ClientCommand::DeleteMessage { message_id } => {
                Ok(json!(chat.delete_message(self.chat_user()?, message_id).await?))
            }
            ClientCommand::TypingStart { conversation_id } => {
                chat.typing(self.chat_user()?, conversation_id, true, Some(self.id))
                    .await?;
                Ok(json!({ "conversation_id": conversation_id }))
            }
            ClientCommand::TypingStop { conversation_id } => {
                chat.typing(self.chat_user()?, conversation_id, false, Some(self.id))
                    .await?;
                Ok(json!({ "conversation_id": conversation_id }))
            }
            ClientCommand::AttachVehicle { vehicle_id } => {
                let tracker = self.realtime.attach_tracker(self.tracker()?, vehicle_id).await?;
                Ok(json!(tracker))
            }
            ClientCommand::LocationUpdate(report) => {
                let tracker = self
                    .realtime
                    .tracking
                    .record_location(self.tracker()?, report)
                    .await?;
                Ok(json!({ "tracker_id": tracker.id, "location": tracker.last_location }))
            }
            ClientCommand::DetachVehicle {} => {
                let (tracker, _) = self.realtime.detach_tracker(self.tracker()?).await?;
                Ok(json!(tracker))
            }
            ClientCommand::Subscribe { vehicle_id } => {
                self.subscriber()?;
                fabric.join(self.id, &rooms::vehicle(vehicle_id));
                let last_known = self.realtime.tracking.last_known(vehicle_id).await.ok();
                Ok(json!({ "vehicle_id": vehicle_id, "last_known": last_known }))
            }
            ClientCommand::Unsubscribe { vehicle_id } => {
                self.subscriber()?;
                fabric.leave(self.id, &rooms::vehicle(vehicle_id));
                Ok(json!({ "vehicle_id": vehicle_id }))
            }
        }
    }
}
