//! In-memory repositories.
//!
//! One mutex per entity table. Every uniqueness and exclusion rule is checked
//! and applied under the same lock as the write, so concurrent inserts and
//! compare-and-set updates linearise per table. A poisoned lock is reported
//! as a transient storage failure.

use async_trait::async_trait;
use carhire_core::error::{DomainError, DomainResult, codes};
use carhire_core::repository::{
    ConversationRepository, DriverBookingFilter, DriverBookingRepository, MessageRepository,
    NotificationFilter, NotificationRepository, PaymentRepository, PromoRepository,
    ReservationFilter, ReservationRepository, TrackerRepository, UserRepository,
};
use carhire_core::types::{
    Acknowledgement, Conversation, ConversationContext, ConversationId, ConversationKind,
    DriverBooking, DriverBookingId, DriverBookingStatus, DriverProfile, Message, MessageId,
    Notification, NotificationId, NotificationStatus, Payment, PaymentId, PaymentTarget, PromoCode,
    PromoCodeId, Reservation, ReservationId, ReservationStatus, TimeWindow, TrackerId,
    TrackerStatus, User, UserId, VehicleId, VehicleTracker,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

fn lock<T>(table: &Mutex<T>) -> DomainResult<MutexGuard<'_, T>> {
    table
        .lock()
        .map_err(|_| DomainError::storage("in-memory table lock poisoned"))
}

fn overlaps(start: DateTime<Utc>, end: DateTime<Utc>, window: TimeWindow) -> bool {
    start < window.end() && end > window.start()
}

/// Every repository over process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    reservations: Mutex<HashMap<ReservationId, Reservation>>,
    driver_bookings: Mutex<HashMap<DriverBookingId, DriverBooking>>,
    payments: Mutex<HashMap<PaymentId, Payment>>,
    promos: Mutex<HashMap<PromoCodeId, PromoCode>>,
    users: Mutex<HashMap<UserId, User>>,
    driver_profiles: Mutex<HashMap<UserId, DriverProfile>>,
    conversations: Mutex<HashMap<ConversationId, Conversation>>,
    messages: Mutex<HashMap<MessageId, Message>>,
    trackers: Mutex<HashMap<TrackerId, VehicleTracker>>,
    notifications: Mutex<HashMap<NotificationId, Notification>>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// False once any table lock has been poisoned.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        !(self.reservations.is_poisoned()
            || self.driver_bookings.is_poisoned()
            || self.payments.is_poisoned()
            || self.promos.is_poisoned()
            || self.users.is_poisoned()
            || self.driver_profiles.is_poisoned()
            || self.conversations.is_poisoned()
            || self.messages.is_poisoned()
            || self.trackers.is_poisoned()
            || self.notifications.is_poisoned())
    }
}

fn vehicle_conflict(
    table: &HashMap<ReservationId, Reservation>,
    candidate: &Reservation,
) -> DomainResult<()> {
    let Some(vehicle) = candidate.vehicle_id.filter(|_| candidate.blocks_vehicle()) else {
        return Ok(());
    };
    let window = candidate.window()?;
    let clash = table.values().any(|r| {
        r.id != candidate.id
            && r.vehicle_id == Some(vehicle)
            && r.status.is_blocking()
            && overlaps(r.pickup.at, r.dropoff.at, window)
    });
    if clash {
        return Err(DomainError::conflict(
            codes::VEHICLE_TIME_CONFLICT,
            format!("vehicle {vehicle} is already reserved for an overlapping period"),
        ));
    }
    Ok(())
}

fn driver_conflict(
    table: &HashMap<DriverBookingId, DriverBooking>,
    candidate: &DriverBooking,
) -> DomainResult<()> {
    if !candidate.status.is_blocking() {
        return Ok(());
    }
    let window = candidate.window()?;
    let clash = table.values().any(|b| {
        b.id != candidate.id
            && b.driver_id == candidate.driver_id
            && b.status.is_blocking()
            && overlaps(b.start_at, b.end_at, window)
    });
    if clash {
        return Err(DomainError::conflict(
            codes::DRIVER_TIME_CONFLICT,
            "driver already has a booking for an overlapping period",
        ));
    }
    Ok(())
}

#[async_trait]
impl ReservationRepository for MemoryStore {
    async fn insert(&self, reservation: Reservation) -> DomainResult<Reservation> {
        let mut table = lock(&self.reservations)?;
        if table.values().any(|r| r.code == reservation.code) {
            return Err(DomainError::conflict(
                codes::DUPLICATE_BOOKING_CODE,
                format!("booking code {} already exists", reservation.code),
            ));
        }
        vehicle_conflict(&table, &reservation)?;
        table.insert(reservation.id, reservation.clone());
        Ok(reservation)
    }

    async fn get(&self, id: ReservationId) -> DomainResult<Option<Reservation>> {
        Ok(lock(&self.reservations)?.get(&id).cloned())
    }

    async fn compare_and_set(
        &self,
        updated: Reservation,
        expected: ReservationStatus,
    ) -> DomainResult<Reservation> {
        let mut table = lock(&self.reservations)?;
        let current = table
            .get(&updated.id)
            .ok_or_else(|| DomainError::not_found("Reservation", updated.id))?;
        if current.status != expected {
            return Err(DomainError::concurrent_update("Reservation", updated.id));
        }
        vehicle_conflict(&table, &updated)?;
        table.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn list(&self, filter: ReservationFilter) -> DomainResult<Vec<Reservation>> {
        let table = lock(&self.reservations)?;
        let mut found: Vec<Reservation> = table
            .values()
            .filter(|r| filter.customer_id.is_none_or(|c| r.customer_id == c))
            .filter(|r| filter.vehicle_id.is_none_or(|v| r.vehicle_id == Some(v)))
            .filter(|r| filter.status.is_none_or(|s| r.status == s))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn blocking_overlaps(
        &self,
        vehicle: VehicleId,
        window: TimeWindow,
        exclude: Option<ReservationId>,
    ) -> DomainResult<Vec<Reservation>> {
        let table = lock(&self.reservations)?;
        Ok(table
            .values()
            .filter(|r| Some(r.id) != exclude)
            .filter(|r| r.vehicle_id == Some(vehicle) && r.status.is_blocking())
            .filter(|r| overlaps(r.pickup.at, r.dropoff.at, window))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DriverBookingRepository for MemoryStore {
    async fn insert(&self, booking: DriverBooking) -> DomainResult<DriverBooking> {
        let mut table = lock(&self.driver_bookings)?;
        if table.values().any(|b| b.code == booking.code) {
            return Err(DomainError::conflict(
                codes::DUPLICATE_BOOKING_CODE,
                format!("booking code {} already exists", booking.code),
            ));
        }
        driver_conflict(&table, &booking)?;
        table.insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn get(&self, id: DriverBookingId) -> DomainResult<Option<DriverBooking>> {
        Ok(lock(&self.driver_bookings)?.get(&id).cloned())
    }

    async fn compare_and_set(
        &self,
        updated: DriverBooking,
        expected: DriverBookingStatus,
    ) -> DomainResult<DriverBooking> {
        let mut table = lock(&self.driver_bookings)?;
        let current = table
            .get(&updated.id)
            .ok_or_else(|| DomainError::not_found("DriverBooking", updated.id))?;
        if current.status != expected {
            return Err(DomainError::concurrent_update("DriverBooking", updated.id));
        }
        driver_conflict(&table, &updated)?;
        table.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn list(&self, filter: DriverBookingFilter) -> DomainResult<Vec<DriverBooking>> {
        let table = lock(&self.driver_bookings)?;
        let wanted = filter.status.map(DriverBookingStatus::normalized);
        let mut found: Vec<DriverBooking> = table
            .values()
            .filter(|b| filter.customer_id.is_none_or(|c| b.customer_id == c))
            .filter(|b| filter.driver_id.is_none_or(|d| b.driver_id == d))
            .filter(|b| wanted.is_none_or(|s| b.status.normalized() == s))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn blocking_overlaps(
        &self,
        driver: UserId,
        window: TimeWindow,
        exclude: Option<DriverBookingId>,
    ) -> DomainResult<Vec<DriverBooking>> {
        let table = lock(&self.driver_bookings)?;
        Ok(table
            .values()
            .filter(|b| Some(b.id) != exclude)
            .filter(|b| b.driver_id == driver && b.status.is_blocking())
            .filter(|b| overlaps(b.start_at, b.end_at, window))
            .cloned()
            .collect())
    }

    async fn find_expirable(
        &self,
        now: DateTime<Utc>,
        requested_before: DateTime<Utc>,
    ) -> DomainResult<Vec<DriverBooking>> {
        let table = lock(&self.driver_bookings)?;
        Ok(table
            .values()
            .filter(|b| {
                b.payment_window_elapsed(now)
                    || (b.status == DriverBookingStatus::Requested
                        && b.created_at < requested_before)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PaymentRepository for MemoryStore {
    async fn insert_exclusive(&self, payment: Payment) -> DomainResult<Payment> {
        let mut table = lock(&self.payments)?;
        if let Some(active) = table
            .values()
            .find(|p| p.target == payment.target && p.status.is_active())
        {
            return Err(DomainError::conflict(
                codes::PAYMENT_ALREADY_ACTIVE,
                format!("{} already has active payment {}", payment.target, active.id),
            )
            .with_details(serde_json::json!({ "payment_id": active.id })));
        }
        table.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn get(&self, id: PaymentId) -> DomainResult<Option<Payment>> {
        Ok(lock(&self.payments)?.get(&id).cloned())
    }

    async fn update(&self, payment: Payment) -> DomainResult<Payment> {
        let mut table = lock(&self.payments)?;
        let current = table
            .get(&payment.id)
            .ok_or_else(|| DomainError::not_found("Payment", payment.id))?;
        if current.version != payment.version {
            return Err(DomainError::concurrent_update("Payment", payment.id));
        }
        let mut stored = payment;
        stored.version += 1;
        table.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_by_provider_ref(&self, provider_ref: &str) -> DomainResult<Option<Payment>> {
        let table = lock(&self.payments)?;
        Ok(table
            .values()
            .find(|p| p.provider_ref.as_deref() == Some(provider_ref))
            .cloned())
    }

    async fn find_by_merchant_reference(&self, reference: &str) -> DomainResult<Option<Payment>> {
        let table = lock(&self.payments)?;
        Ok(table
            .values()
            .find(|p| p.merchant_reference == reference)
            .cloned())
    }

    async fn find_active_for_target(&self, target: PaymentTarget) -> DomainResult<Option<Payment>> {
        let table = lock(&self.payments)?;
        Ok(table
            .values()
            .find(|p| p.target == target && p.status.is_active())
            .cloned())
    }

    async fn list_non_terminal(&self) -> DomainResult<Vec<Payment>> {
        let table = lock(&self.payments)?;
        let mut found: Vec<Payment> = table
            .values()
            .filter(|p| p.status.is_active())
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }
}

#[async_trait]
impl PromoRepository for MemoryStore {
    async fn find_by_code(&self, code: &str) -> DomainResult<Option<PromoCode>> {
        let wanted = PromoCode::normalize_code(code);
        let table = lock(&self.promos)?;
        Ok(table
            .values()
            .find(|p| PromoCode::normalize_code(&p.code) == wanted)
            .cloned())
    }

    async fn insert(&self, promo: PromoCode) -> DomainResult<PromoCode> {
        let mut table = lock(&self.promos)?;
        let code = PromoCode::normalize_code(&promo.code);
        if table
            .values()
            .any(|p| PromoCode::normalize_code(&p.code) == code)
        {
            return Err(DomainError::conflict(
                codes::DUPLICATE_PROMO_CODE,
                format!("promo code {code} already exists"),
            ));
        }
        table.insert(promo.id, promo.clone());
        Ok(promo)
    }

    async fn increment_usage(&self, id: PromoCodeId) -> DomainResult<PromoCode> {
        let mut table = lock(&self.promos)?;
        let promo = table
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("PromoCode", id))?;
        if promo.is_exhausted() {
            return Err(DomainError::conflict(
                codes::PROMO_USAGE_EXCEEDED,
                format!("promo code {} reached its usage limit", promo.code),
            ));
        }
        promo.used_count += 1;
        Ok(promo.clone())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn get(&self, id: UserId) -> DomainResult<Option<User>> {
        Ok(lock(&self.users)?.get(&id).cloned())
    }

    async fn insert(&self, user: User) -> DomainResult<User> {
        let mut table = lock(&self.users)?;
        if table
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(DomainError::conflict(
                codes::DUPLICATE_EMAIL,
                format!("email {} is already registered", user.email),
            ));
        }
        table.insert(user.id, user.clone());
        Ok(user)
    }

    async fn list(&self) -> DomainResult<Vec<User>> {
        let mut users: Vec<User> = lock(&self.users)?.values().cloned().collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(users)
    }

    async fn driver_profile(&self, user: UserId) -> DomainResult<Option<DriverProfile>> {
        Ok(lock(&self.driver_profiles)?.get(&user).cloned())
    }

    async fn upsert_driver_profile(&self, profile: DriverProfile) -> DomainResult<DriverProfile> {
        lock(&self.driver_profiles)?.insert(profile.user_id, profile.clone());
        Ok(profile)
    }
}

#[async_trait]
impl ConversationRepository for MemoryStore {
    async fn insert(&self, conversation: Conversation) -> DomainResult<Conversation> {
        lock(&self.conversations)?.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn get(&self, id: ConversationId) -> DomainResult<Option<Conversation>> {
        Ok(lock(&self.conversations)?.get(&id).cloned())
    }

    async fn update(&self, conversation: Conversation) -> DomainResult<Conversation> {
        let mut table = lock(&self.conversations)?;
        if !table.contains_key(&conversation.id) {
            return Err(DomainError::not_found("Conversation", conversation.id));
        }
        table.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn list_for_user(&self, user: UserId) -> DomainResult<Vec<Conversation>> {
        let table = lock(&self.conversations)?;
        let mut found: Vec<Conversation> = table
            .values()
            .filter(|c| !c.is_archived && c.has_participant(user))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            let a_at = a.last_message_at.unwrap_or(a.created_at);
            let b_at = b.last_message_at.unwrap_or(b.created_at);
            b_at.cmp(&a_at)
        });
        Ok(found)
    }

    async fn find_direct(
        &self,
        a: UserId,
        b: UserId,
        context: ConversationContext,
    ) -> DomainResult<Option<Conversation>> {
        let pair: BTreeSet<UserId> = [a, b].into_iter().collect();
        let table = lock(&self.conversations)?;
        Ok(table
            .values()
            .find(|c| {
                c.kind == ConversationKind::Direct
                    && !c.is_archived
                    && c.context == context
                    && c.participant_ids() == pair
            })
            .cloned())
    }

    async fn touch_last_message(
        &self,
        id: ConversationId,
        at: DateTime<Utc>,
        preview: String,
    ) -> DomainResult<Conversation> {
        let mut table = lock(&self.conversations)?;
        let conversation = table
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Conversation", id))?;
        if conversation.last_message_at.is_none_or(|last| at >= last) {
            conversation.last_message_at = Some(at);
            conversation.last_message_preview = Some(preview);
        }
        Ok(conversation.clone())
    }
}

#[async_trait]
impl MessageRepository for MemoryStore {
    async fn insert(&self, message: Message) -> DomainResult<Message> {
        lock(&self.messages)?.insert(message.id, message.clone());
        Ok(message)
    }

    async fn get(&self, id: MessageId) -> DomainResult<Option<Message>> {
        Ok(lock(&self.messages)?.get(&id).cloned())
    }

    async fn list(
        &self,
        conversation: ConversationId,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> DomainResult<Vec<Message>> {
        let table = lock(&self.messages)?;
        let mut found: Vec<Message> = table
            .values()
            .filter(|m| m.conversation_id == conversation)
            .filter(|m| before.is_none_or(|b| m.created_at < b))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        found.truncate(limit);
        Ok(found)
    }

    async fn add_reader(&self, id: MessageId, user: UserId) -> DomainResult<(Message, bool)> {
        let mut table = lock(&self.messages)?;
        let message = table
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Message", id))?;
        let changed = message.read_by.insert(user);
        Ok((message.clone(), changed))
    }

    async fn soft_delete(&self, id: MessageId, at: DateTime<Utc>) -> DomainResult<(Message, bool)> {
        let mut table = lock(&self.messages)?;
        let message = table
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Message", id))?;
        if message.is_deleted {
            return Ok((message.clone(), false));
        }
        message.is_deleted = true;
        message.content.clear();
        message.deleted_at = Some(at);
        Ok((message.clone(), true))
    }
}

fn duplicate_device(device_id: &str) -> DomainError {
    DomainError::conflict(
        codes::DUPLICATE_DEVICE,
        format!("device {device_id} is already registered"),
    )
}

#[async_trait]
impl TrackerRepository for MemoryStore {
    async fn insert(&self, tracker: VehicleTracker) -> DomainResult<VehicleTracker> {
        let mut table = lock(&self.trackers)?;
        if table.values().any(|t| t.device_id == tracker.device_id) {
            return Err(duplicate_device(&tracker.device_id));
        }
        table.insert(tracker.id, tracker.clone());
        Ok(tracker)
    }

    async fn get(&self, id: TrackerId) -> DomainResult<Option<VehicleTracker>> {
        Ok(lock(&self.trackers)?.get(&id).cloned())
    }

    async fn find_by_device(&self, device_id: &str) -> DomainResult<Option<VehicleTracker>> {
        let table = lock(&self.trackers)?;
        Ok(table.values().find(|t| t.device_id == device_id).cloned())
    }

    async fn find_by_vehicle(&self, vehicle: VehicleId) -> DomainResult<Option<VehicleTracker>> {
        let table = lock(&self.trackers)?;
        Ok(table
            .values()
            .filter(|t| t.vehicle_id == Some(vehicle))
            .max_by_key(|t| (t.status == TrackerStatus::Active, t.last_seen_at))
            .cloned())
    }

    async fn list(&self) -> DomainResult<Vec<VehicleTracker>> {
        let mut trackers: Vec<VehicleTracker> = lock(&self.trackers)?.values().cloned().collect();
        trackers.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(trackers)
    }

    async fn update(&self, tracker: VehicleTracker) -> DomainResult<VehicleTracker> {
        let mut table = lock(&self.trackers)?;
        let current = table
            .get(&tracker.id)
            .ok_or_else(|| DomainError::not_found("VehicleTracker", tracker.id))?;
        if current.version != tracker.version {
            return Err(DomainError::concurrent_update("VehicleTracker", tracker.id));
        }
        if table
            .values()
            .any(|t| t.id != tracker.id && t.device_id == tracker.device_id)
        {
            return Err(duplicate_device(&tracker.device_id));
        }
        let mut stored = tracker;
        stored.version += 1;
        table.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, id: TrackerId) -> DomainResult<()> {
        lock(&self.trackers)?
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| DomainError::not_found("VehicleTracker", id))
    }
}

#[async_trait]
impl NotificationRepository for MemoryStore {
    async fn insert(&self, notification: Notification) -> DomainResult<Notification> {
        lock(&self.notifications)?.insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn get(&self, id: NotificationId) -> DomainResult<Option<Notification>> {
        Ok(lock(&self.notifications)?.get(&id).cloned())
    }

    async fn list(&self, filter: NotificationFilter) -> DomainResult<Vec<Notification>> {
        let table = lock(&self.notifications)?;
        let mut found: Vec<Notification> = table
            .values()
            .filter(|n| filter.include_inactive || n.is_active)
            .filter(|n| filter.status.is_none_or(|s| n.status == s))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn update_if_status(
        &self,
        updated: Notification,
        expected: NotificationStatus,
    ) -> DomainResult<Notification> {
        let mut table = lock(&self.notifications)?;
        let current = table
            .get(&updated.id)
            .ok_or_else(|| DomainError::not_found("Notification", updated.id))?;
        if current.status != expected {
            return Err(DomainError::concurrent_update("Notification", updated.id));
        }
        table.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn record_ack(
        &self,
        id: NotificationId,
        user: UserId,
        apply: Box<dyn for<'a> FnOnce(&'a mut Acknowledgement) + Send>,
    ) -> DomainResult<Notification> {
        let mut table = lock(&self.notifications)?;
        let notification = table
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Notification", id))?;
        notification.upsert_ack(user, apply);
        Ok(notification.clone())
    }

    async fn list_due(&self, now: DateTime<Utc>) -> DomainResult<Vec<Notification>> {
        let table = lock(&self.notifications)?;
        Ok(table
            .values()
            .filter(|n| n.is_active && n.status == NotificationStatus::Scheduled)
            .filter(|n| n.send_at.is_some_and(|at| at <= now))
            .cloned()
            .collect())
    }
}
