//! Notification fanout.
//!
//! Staff author notifications; users see the ones [`visible_to`] them. A
//! notification is delivered once, when it becomes `sent`: in-app through the
//! realtime rooms of its audience, by email through the [`Mailer`]. Other
//! channels are accepted and logged as not configured.

use std::sync::Arc;

use carhire_core::broadcast::{Broadcaster, Namespace, RealtimeEvent, rooms};
use carhire_core::environment::{Clock, IdGenerator};
use carhire_core::error::{DomainError, DomainResult, codes};
use carhire_core::mail::{Email, Mailer};
use carhire_core::repository::{NotificationFilter, NotificationRepository, UserRepository};
use carhire_core::types::{
    Acknowledgement, Audience, Notification, NotificationChannel, NotificationId,
    NotificationKind, NotificationPriority, NotificationStatus, Principal, Role, visible_to,
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::metrics;

/// Action label used when the client sends none.
pub const DEFAULT_ACTION: &str = "clicked";

/// A notification to author.
#[derive(Debug, Clone, Deserialize)]
pub struct NewNotification {
    /// Title.
    pub title: String,
    /// Body.
    pub body: String,
    /// Category.
    #[serde(default)]
    pub kind: NotificationKind,
    /// Urgency.
    #[serde(default)]
    pub priority: NotificationPriority,
    /// Addressees.
    pub audience: Audience,
    /// Channels; in-app when empty.
    #[serde(default)]
    pub channels: Vec<NotificationChannel>,
    /// Schedule for later.
    pub send_at: Option<DateTime<Utc>>,
    /// Hide after.
    pub expires_at: Option<DateTime<Utc>>,
    /// Client payload.
    pub data: Option<Value>,
    /// Deliver immediately.
    #[serde(default)]
    pub send_now: bool,
}

/// Editable fields of a draft or scheduled notification.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationUpdate {
    /// Title.
    pub title: Option<String>,
    /// Body.
    pub body: Option<String>,
    /// Category.
    pub kind: Option<NotificationKind>,
    /// Urgency.
    pub priority: Option<NotificationPriority>,
    /// Addressees.
    pub audience: Option<Audience>,
    /// Channels.
    pub channels: Option<Vec<NotificationChannel>>,
    /// Hide after.
    pub expires_at: Option<DateTime<Utc>>,
    /// Client payload.
    pub data: Option<Value>,
}

/// A notification as one user sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationView {
    /// The notification, without other users' acknowledgements.
    #[serde(flatten)]
    pub notification: Notification,
    /// The caller's acknowledgement.
    pub ack: Option<Acknowledgement>,
    /// Whether the caller has read it.
    pub is_read: bool,
}

impl NotificationView {
    fn for_user(mut notification: Notification, principal: &Principal) -> Self {
        let ack = notification.ack_for(principal.user_id).cloned();
        notification.acknowledgements.clear();
        Self {
            is_read: ack.as_ref().is_some_and(|a| a.read_at.is_some()),
            notification,
            ack,
        }
    }
}

fn require_staff(actor: &Principal) -> DomainResult<()> {
    if actor.is_staff() {
        Ok(())
    } else {
        Err(DomainError::forbidden("notifications are managed by staff"))
    }
}

fn roles_of(principal: &Principal) -> Vec<Role> {
    principal.roles.iter().copied().collect()
}

fn wrong_status(n: &Notification, operation: &str) -> DomainError {
    DomainError::invalid_state(
        codes::INVALID_NOTIFICATION_STATUS,
        format!("cannot {operation} a {} notification", status_name(n.status)),
    )
}

const fn status_name(status: NotificationStatus) -> &'static str {
    match status {
        NotificationStatus::Draft => "draft",
        NotificationStatus::Scheduled => "scheduled",
        NotificationStatus::Sent => "sent",
        NotificationStatus::Cancelled => "cancelled",
    }
}

fn non_empty(field: &str, value: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(DomainError::invalid_input(format!("{field} must not be empty")))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Authoring, delivery and acknowledgement of notifications.
#[derive(Clone)]
pub struct NotificationService {
    notifications: Arc<dyn NotificationRepository>,
    users: Arc<dyn UserRepository>,
    broadcaster: Arc<dyn Broadcaster>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl NotificationService {
    /// Service over its collaborators.
    #[must_use]
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        users: Arc<dyn UserRepository>,
        broadcaster: Arc<dyn Broadcaster>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            notifications,
            users,
            broadcaster,
            mailer,
            clock,
            ids,
        }
    }

    async fn load(&self, id: NotificationId) -> DomainResult<Notification> {
        self.notifications
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Notification", id))
    }

    /// Author a notification: a draft, scheduled when `send_at` is given,
    /// or delivered at once with `send_now`.
    ///
    /// # Errors
    ///
    /// `FORBIDDEN` for non-staff, `VALIDATION_ERROR` for empty text or an
    /// expiry before the send time.
    pub async fn create(&self, actor: &Principal, input: NewNotification) -> DomainResult<Notification> {
        require_staff(actor)?;
        let title = non_empty("title", &input.title)?;
        let body = non_empty("body", &input.body)?;
        if let (Some(send_at), Some(expires_at)) = (input.send_at, input.expires_at) {
            if expires_at <= send_at {
                return Err(DomainError::invalid_input("expires_at must be after send_at"));
            }
        }

        let now = self.clock.now();
        let mut channels = input.channels;
        if channels.is_empty() {
            channels.push(NotificationChannel::InApp);
        }
        channels.dedup();
        let status = match (input.send_now, input.send_at) {
            (true, _) => NotificationStatus::Sent,
            (false, Some(_)) => NotificationStatus::Scheduled,
            (false, None) => NotificationStatus::Draft,
        };
        let notification = Notification {
            id: NotificationId::from_uuid(self.ids.next_uuid()),
            title,
            body,
            kind: input.kind,
            priority: input.priority,
            audience: input.audience,
            channels,
            send_at: input.send_at,
            sent_at: (status == NotificationStatus::Sent).then_some(now),
            expires_at: input.expires_at,
            status,
            is_active: true,
            acknowledgements: Vec::new(),
            data: input.data,
            created_by: actor.user_id,
            created_at: now,
            updated_at: now,
        };
        let stored = self.notifications.insert(notification).await?;
        tracing::info!(notification_id = %stored.id, status = status_name(stored.status), "Notification created");
        if stored.status == NotificationStatus::Sent {
            self.deliver(&stored).await;
        }
        Ok(stored)
    }

    /// One notification. Staff see any; others only what is visible to them.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`.
    pub async fn get(&self, actor: &Principal, id: NotificationId) -> DomainResult<NotificationView> {
        let notification = self.load(id).await?;
        if actor.is_staff() {
            return Ok(NotificationView {
                ack: notification.ack_for(actor.user_id).cloned(),
                is_read: notification
                    .ack_for(actor.user_id)
                    .is_some_and(|a| a.read_at.is_some()),
                notification,
            });
        }
        if !visible_to(&notification, actor.user_id, &roles_of(actor), self.clock.now()) {
            return Err(DomainError::not_found("Notification", id));
        }
        Ok(NotificationView::for_user(notification, actor))
    }

    /// All notifications, for staff.
    ///
    /// # Errors
    ///
    /// `FORBIDDEN` for non-staff.
    pub async fn list(&self, actor: &Principal, filter: NotificationFilter) -> DomainResult<Vec<Notification>> {
        require_staff(actor)?;
        self.notifications.list(filter).await
    }

    /// Notifications visible to the caller now, newest first.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    pub async fn list_for_user(&self, actor: &Principal) -> DomainResult<Vec<NotificationView>> {
        let now = self.clock.now();
        let roles = roles_of(actor);
        let all = self.notifications.list(NotificationFilter::default()).await?;
        Ok(all
            .into_iter()
            .filter(|n| visible_to(n, actor.user_id, &roles, now))
            .map(|n| NotificationView::for_user(n, actor))
            .collect())
    }

    /// How many visible notifications the caller has not read.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    pub async fn unread_count(&self, actor: &Principal) -> DomainResult<usize> {
        Ok(self
            .list_for_user(actor)
            .await?
            .iter()
            .filter(|v| !v.is_read)
            .count())
    }

    /// Edit a draft or scheduled notification.
    ///
    /// # Errors
    ///
    /// `FORBIDDEN`, `NOT_FOUND`, `INVALID_NOTIFICATION_STATUS`,
    /// `CONCURRENT_UPDATE`.
    pub async fn update(
        &self,
        actor: &Principal,
        id: NotificationId,
        changes: NotificationUpdate,
    ) -> DomainResult<Notification> {
        require_staff(actor)?;
        let current = self.load(id).await?;
        if !matches!(current.status, NotificationStatus::Draft | NotificationStatus::Scheduled) {
            return Err(wrong_status(&current, "edit"));
        }
        let expected = current.status;
        let mut updated = current;
        if let Some(title) = changes.title {
            updated.title = non_empty("title", &title)?;
        }
        if let Some(body) = changes.body {
            updated.body = non_empty("body", &body)?;
        }
        if let Some(kind) = changes.kind {
            updated.kind = kind;
        }
        if let Some(priority) = changes.priority {
            updated.priority = priority;
        }
        if let Some(audience) = changes.audience {
            updated.audience = audience;
        }
        if let Some(channels) = changes.channels.filter(|c| !c.is_empty()) {
            updated.channels = channels;
        }
        if changes.expires_at.is_some() {
            updated.expires_at = changes.expires_at;
        }
        if changes.data.is_some() {
            updated.data = changes.data;
        }
        updated.updated_at = self.clock.now();
        self.notifications.update_if_status(updated, expected).await
    }

    /// Soft delete.
    ///
    /// # Errors
    ///
    /// `FORBIDDEN`, `NOT_FOUND`, `CONCURRENT_UPDATE`.
    pub async fn deactivate(&self, actor: &Principal, id: NotificationId) -> DomainResult<Notification> {
        require_staff(actor)?;
        let current = self.load(id).await?;
        if !current.is_active {
            return Ok(current);
        }
        let expected = current.status;
        let mut updated = current;
        updated.is_active = false;
        updated.updated_at = self.clock.now();
        let stored = self.notifications.update_if_status(updated, expected).await?;
        tracing::info!(notification_id = %id, "Notification deactivated");
        Ok(stored)
    }

    /// Schedule for `send_at`.
    ///
    /// # Errors
    ///
    /// `INVALID_NOTIFICATION_STATUS` when sent or cancelled.
    pub async fn schedule(
        &self,
        actor: &Principal,
        id: NotificationId,
        send_at: DateTime<Utc>,
    ) -> DomainResult<Notification> {
        require_staff(actor)?;
        let current = self.load(id).await?;
        if matches!(current.status, NotificationStatus::Sent | NotificationStatus::Cancelled) {
            return Err(wrong_status(&current, "schedule"));
        }
        if current.expires_at.is_some_and(|exp| exp <= send_at) {
            return Err(DomainError::invalid_input("send_at must be before expires_at"));
        }
        let expected = current.status;
        let mut updated = current;
        updated.status = NotificationStatus::Scheduled;
        updated.send_at = Some(send_at);
        updated.updated_at = self.clock.now();
        self.notifications.update_if_status(updated, expected).await
    }

    /// Deliver now. Sending an already sent notification changes nothing.
    ///
    /// # Errors
    ///
    /// `INVALID_NOTIFICATION_STATUS` when cancelled.
    pub async fn send_now(&self, actor: &Principal, id: NotificationId) -> DomainResult<Notification> {
        require_staff(actor)?;
        let current = self.load(id).await?;
        match current.status {
            NotificationStatus::Cancelled => Err(wrong_status(&current, "send")),
            NotificationStatus::Sent => Ok(current),
            NotificationStatus::Draft | NotificationStatus::Scheduled => {
                self.release(current, self.clock.now()).await
            }
        }
    }

    /// Withdraw a notification that was not sent yet.
    ///
    /// # Errors
    ///
    /// `INVALID_NOTIFICATION_STATUS` when already sent.
    pub async fn cancel(&self, actor: &Principal, id: NotificationId) -> DomainResult<Notification> {
        require_staff(actor)?;
        let current = self.load(id).await?;
        match current.status {
            NotificationStatus::Sent => Err(wrong_status(&current, "cancel")),
            NotificationStatus::Cancelled => Ok(current),
            NotificationStatus::Draft | NotificationStatus::Scheduled => {
                let expected = current.status;
                let mut updated = current;
                updated.status = NotificationStatus::Cancelled;
                updated.updated_at = self.clock.now();
                self.notifications.update_if_status(updated, expected).await
            }
        }
    }

    async fn visible(&self, actor: &Principal, id: NotificationId) -> DomainResult<()> {
        let notification = self.load(id).await?;
        if visible_to(&notification, actor.user_id, &roles_of(actor), self.clock.now()) {
            Ok(())
        } else {
            Err(DomainError::not_found("Notification", id))
        }
    }

    /// Mark read for the caller. Keeps the first read time.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` when the notification is not visible to the caller.
    pub async fn mark_read(&self, actor: &Principal, id: NotificationId) -> DomainResult<NotificationView> {
        self.visible(actor, id).await?;
        let now = self.clock.now();
        let stored = self
            .notifications
            .record_ack(id, actor.user_id, Box::new(move |ack| ack.mark_read(now)))
            .await?;
        Ok(NotificationView::for_user(stored, actor))
    }

    /// Record an action for the caller, `clicked` by default. Also marks
    /// the notification read.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` when the notification is not visible to the caller.
    pub async fn mark_action(
        &self,
        actor: &Principal,
        id: NotificationId,
        action: Option<String>,
    ) -> DomainResult<NotificationView> {
        self.visible(actor, id).await?;
        let now = self.clock.now();
        let action = action
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| DEFAULT_ACTION.to_string());
        let stored = self
            .notifications
            .record_ack(
                id,
                actor.user_id,
                Box::new(move |ack| ack.mark_action(&action, now)),
            )
            .await?;
        Ok(NotificationView::for_user(stored, actor))
    }

    /// Release scheduled notifications that are due. Returns how many were
    /// sent.
    ///
    /// # Errors
    ///
    /// Transient storage failure while listing.
    pub async fn dispatch_due(&self, now: DateTime<Utc>) -> DomainResult<usize> {
        let mut sent = 0;
        for notification in self.notifications.list_due(now).await? {
            let id = notification.id;
            match self.release(notification, now).await {
                Ok(_) => sent += 1,
                Err(e) if e.code() == codes::CONCURRENT_UPDATE => {
                    tracing::debug!(notification_id = %id, "Notification changed before dispatch");
                }
                Err(e) => tracing::error!(notification_id = %id, error = %e, "Dispatch failed"),
            }
        }
        Ok(sent)
    }

    async fn release(&self, current: Notification, now: DateTime<Utc>) -> DomainResult<Notification> {
        let expected = current.status;
        let mut updated = current;
        updated.status = NotificationStatus::Sent;
        updated.sent_at = Some(now);
        updated.updated_at = now;
        let stored = self.notifications.update_if_status(updated, expected).await?;
        self.deliver(&stored).await;
        Ok(stored)
    }

    async fn deliver(&self, notification: &Notification) {
        metrics::record_notification_sent();
        for channel in &notification.channels {
            match channel {
                NotificationChannel::InApp => self.deliver_in_app(notification),
                NotificationChannel::Email => self.deliver_email(notification).await,
                NotificationChannel::Sms | NotificationChannel::Push => {
                    tracing::info!(notification_id = %notification.id, ?channel, "Channel not configured, skipped");
                }
            }
        }
    }

    fn deliver_in_app(&self, notification: &Notification) {
        let event = RealtimeEvent::new(
            "notification:new",
            json!({
                "id": notification.id,
                "title": notification.title,
                "body": notification.body,
                "kind": notification.kind,
                "priority": notification.priority,
                "data": notification.data,
                "sent_at": notification.sent_at,
            }),
        );
        let targets: Vec<String> = match &notification.audience {
            Audience::All => vec![rooms::BROADCAST.to_string()],
            Audience::User { user_id } => vec![rooms::user(*user_id)],
            Audience::Roles { roles } => roles.iter().map(|r| rooms::role(*r)).collect(),
        };
        let mut reached = 0;
        for room in &targets {
            reached += self
                .broadcaster
                .publish(Namespace::Chat, room, event.clone(), None);
        }
        tracing::debug!(notification_id = %notification.id, rooms = targets.len(), sessions = reached, "In-app notification published");
    }

    async fn deliver_email(&self, notification: &Notification) {
        let users = match self.users.list().await {
            Ok(users) => users,
            Err(e) => {
                tracing::error!(notification_id = %notification.id, error = %e, "Email recipients unavailable");
                return;
            }
        };
        let sends = users
            .into_iter()
            .filter(|u| u.is_active())
            .filter(|u| {
                let roles: Vec<Role> = u.roles.iter().copied().collect();
                notification.audience.includes(u.id, &roles)
            })
            .map(|u| {
                let user_id = u.id;
                let email = Email {
                    to: u.email,
                    subject: notification.title.clone(),
                    body: notification.body.clone(),
                };
                async move { (user_id, self.mailer.send(email).await) }
            });
        let results = join_all(sends).await;
        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        for (user_id, result) in &results {
            if let Err(e) = result {
                tracing::warn!(notification_id = %notification.id, %user_id, error = %e, "Notification email not delivered");
            }
        }
        tracing::info!(notification_id = %notification.id, recipients = results.len(), failed, "Notification emailed");
    }
}
