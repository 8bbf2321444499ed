//! Broadcaster and mailer that record what they were asked to deliver.

use async_trait::async_trait;
use carhire_core::broadcast::{Broadcaster, Namespace, RealtimeEvent, SessionId};
use carhire_core::mail::{Email, MailError, Mailer};
use std::sync::{Arc, Mutex, PoisonError};

/// One recorded publish call.
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    /// Namespace.
    pub namespace: Namespace,
    /// Room.
    pub room: String,
    /// Event.
    pub event: RealtimeEvent,
    /// Excluded session.
    pub exclude: Option<SessionId>,
}

/// Broadcaster that keeps every publish in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingBroadcaster {
    published: Arc<Mutex<Vec<Published>>>,
}

impl RecordingBroadcaster {
    /// Empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far.
    #[must_use]
    pub fn published(&self) -> Vec<Published> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events with `name` published to `room`.
    #[must_use]
    pub fn events_in(&self, room: &str, name: &str) -> Vec<RealtimeEvent> {
        self.published()
            .into_iter()
            .filter(|p| p.room == room && p.event.event == name)
            .map(|p| p.event)
            .collect()
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn publish(
        &self,
        namespace: Namespace,
        room: &str,
        event: RealtimeEvent,
        exclude: Option<SessionId>,
    ) -> usize {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Published {
                namespace,
                room: room.to_string(),
                event,
                exclude,
            });
        0
    }
}

/// Mailer that keeps every email in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<Email>>>,
}

impl RecordingMailer {
    /// Empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emails sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(email);
        Ok(())
    }
}
