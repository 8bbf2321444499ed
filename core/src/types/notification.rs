use super::ids::{NotificationId, UserId};
use super::user::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who a notification addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Audience {
    /// Everyone.
    All,
    /// A single user.
    User {
        /// Addressee.
        user_id: UserId,
    },
    /// Holders of any of the roles.
    Roles {
        /// Addressed roles.
        roles: Vec<Role>,
    },
}

impl Audience {
    /// Whether the audience includes this user.
    #[must_use]
    pub fn includes(&self, user: UserId, roles: &[Role]) -> bool {
        match self {
            Self::All => true,
            Self::User { user_id } => *user_id == user,
            Self::Roles { roles: wanted } => wanted.iter().any(|r| roles.contains(r)),
        }
    }
}

/// Notification category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// General information.
    #[default]
    Info,
    /// Booking updates.
    Booking,
    /// Payment updates.
    Payment,
    /// Marketing.
    Promotion,
    /// Platform notices.
    System,
    /// Needs attention.
    Alert,
}

/// Urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    /// Low.
    Low,
    /// Normal.
    #[default]
    Normal,
    /// High.
    High,
    /// Urgent.
    Urgent,
}

/// Delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    /// Realtime in-app delivery.
    InApp,
    /// Email through the mailer.
    Email,
    /// SMS, not configured.
    Sms,
    /// Mobile push, not configured.
    Push,
}

/// Lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    /// Being edited.
    Draft,
    /// Will be sent at `send_at`.
    Scheduled,
    /// Delivered.
    Sent,
    /// Withdrawn.
    Cancelled,
}

/// Per-user acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    /// Acknowledging user.
    pub user_id: UserId,
    /// First read.
    pub read_at: Option<DateTime<Utc>>,
    /// Latest action.
    pub acted_at: Option<DateTime<Utc>>,
    /// Latest action label.
    pub action: Option<String>,
}

impl Acknowledgement {
    /// Empty acknowledgement for a user.
    #[must_use]
    pub const fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            read_at: None,
            acted_at: None,
            action: None,
        }
    }

    /// Set `read_at` if absent.
    pub fn mark_read(&mut self, now: DateTime<Utc>) {
        if self.read_at.is_none() {
            self.read_at = Some(now);
        }
    }

    /// Record an action; `acted_at` never moves backwards.
    pub fn mark_action(&mut self, action: &str, now: DateTime<Utc>) {
        self.acted_at = Some(self.acted_at.map_or(now, |prev| prev.max(now)));
        self.action = Some(action.to_string());
        self.mark_read(now);
    }
}

/// Audience-addressed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Identifier.
    pub id: NotificationId,
    /// Title.
    pub title: String,
    /// Body.
    pub body: String,
    /// Category.
    pub kind: NotificationKind,
    /// Urgency.
    pub priority: NotificationPriority,
    /// Addressees.
    pub audience: Audience,
    /// Delivery channels.
    pub channels: Vec<NotificationChannel>,
    /// Scheduled send time.
    pub send_at: Option<DateTime<Utc>>,
    /// Actual send time.
    pub sent_at: Option<DateTime<Utc>>,
    /// Hidden after this time.
    pub expires_at: Option<DateTime<Utc>>,
    /// Lifecycle status.
    pub status: NotificationStatus,
    /// Soft delete flag.
    pub is_active: bool,
    /// Unique by user.
    pub acknowledgements: Vec<Acknowledgement>,
    /// Client payload, e.g. a deep link.
    pub data: Option<Value>,
    /// Author.
    pub created_by: UserId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update.
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    /// The acknowledgement for `user`, if any.
    #[must_use]
    pub fn ack_for(&self, user: UserId) -> Option<&Acknowledgement> {
        self.acknowledgements.iter().find(|a| a.user_id == user)
    }

    /// Upsert the acknowledgement for `user` and apply `f` to it.
    pub fn upsert_ack(&mut self, user: UserId, f: impl FnOnce(&mut Acknowledgement)) {
        if let Some(ack) = self.acknowledgements.iter_mut().find(|a| a.user_id == user) {
            f(ack);
        } else {
            let mut ack = Acknowledgement::new(user);
            f(&mut ack);
            self.acknowledgements.push(ack);
        }
    }
}

/// Whether `user` (holding `roles`) can see `n` at `now`.
#[must_use]
pub fn visible_to(n: &Notification, user: UserId, roles: &[Role], now: DateTime<Utc>) -> bool {
    let released = match n.status {
        NotificationStatus::Sent => true,
        NotificationStatus::Scheduled => n.send_at.is_some_and(|at| at <= now),
        NotificationStatus::Draft | NotificationStatus::Cancelled => false,
    };
    n.is_active
        && released
        && n.expires_at.is_none_or(|exp| exp > now)
        && n.audience.includes(user, roles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).single().unwrap_or_default()
    }

    fn user(n: u128) -> UserId {
        UserId::from_uuid(Uuid::from_u128(n))
    }

    fn sample(audience: Audience, status: NotificationStatus) -> Notification {
        Notification {
            id: NotificationId::from_uuid(Uuid::from_u128(99)),
            title: "t".into(),
            body: "b".into(),
            kind: NotificationKind::Info,
            priority: NotificationPriority::Normal,
            audience,
            channels: vec![NotificationChannel::InApp],
            send_at: None,
            sent_at: None,
            expires_at: None,
            status,
            is_active: true,
            acknowledgements: Vec::new(),
            data: None,
            created_by: user(0),
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn sent_notification_for_everyone() {
        let n = sample(Audience::All, NotificationStatus::Sent);
        assert!(visible_to(&n, user(1), &[Role::Customer], now()));
    }

    #[test]
    fn scheduled_becomes_visible_at_send_time() {
        let mut n = sample(Audience::All, NotificationStatus::Scheduled);
        n.send_at = Some(now() + Duration::minutes(5));
        assert!(!visible_to(&n, user(1), &[], now()));
        assert!(visible_to(&n, user(1), &[], now() + Duration::minutes(5)));
    }

    #[test]
    fn expired_inactive_and_drafts_hidden() {
        let mut n = sample(Audience::All, NotificationStatus::Sent);
        n.expires_at = Some(now());
        assert!(!visible_to(&n, user(1), &[], now()));
        let mut n = sample(Audience::All, NotificationStatus::Sent);
        n.is_active = false;
        assert!(!visible_to(&n, user(1), &[], now()));
        let n = sample(Audience::All, NotificationStatus::Draft);
        assert!(!visible_to(&n, user(1), &[], now()));
    }

    #[test]
    fn audience_predicates() {
        let n = sample(Audience::User { user_id: user(1) }, NotificationStatus::Sent);
        assert!(visible_to(&n, user(1), &[], now()));
        assert!(!visible_to(&n, user(2), &[], now()));
        let n = sample(
            Audience::Roles { roles: vec![Role::Driver] },
            NotificationStatus::Sent,
        );
        assert!(visible_to(&n, user(2), &[Role::Customer, Role::Driver], now()));
        assert!(!visible_to(&n, user(2), &[Role::Customer], now()));
    }

    #[test]
    fn read_is_idempotent_and_action_monotonic() {
        let mut n = sample(Audience::All, NotificationStatus::Sent);
        n.upsert_ack(user(1), |a| a.mark_read(now()));
        n.upsert_ack(user(1), |a| a.mark_read(now() + Duration::hours(1)));
        assert_eq!(n.acknowledgements.len(), 1);
        assert_eq!(n.ack_for(user(1)).and_then(|a| a.read_at), Some(now()));

        n.upsert_ack(user(1), |a| a.mark_action("clicked", now() + Duration::hours(2)));
        n.upsert_ack(user(1), |a| a.mark_action("clicked", now() + Duration::hours(1)));
        let ack = n.ack_for(user(1)).cloned();
        assert_eq!(ack.as_ref().and_then(|a| a.acted_at), Some(now() + Duration::hours(2)));
        assert_eq!(ack.and_then(|a| a.read_at), Some(now()));
    }
}
