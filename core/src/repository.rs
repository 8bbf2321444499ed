//! Persistence seams.
//!
//! Each entity is owned by exactly one repository. Implementations must honour
//! the storage-level guarantees documented on each method: unique keys,
//! exclusion of overlapping blocking intervals, the single active payment per
//! target and compare-and-set updates. Storage failures surface as
//! [`ErrorKind::Transient`](crate::error::ErrorKind::Transient).

use crate::error::DomainResult;
use crate::types::{
    Conversation, ConversationContext, ConversationId, DriverBooking, DriverBookingId,
    DriverBookingStatus, DriverProfile, Message, MessageId, Notification, NotificationId,
    NotificationStatus, Payment, PaymentId, PaymentTarget, PromoCode, PromoCodeId, Reservation,
    ReservationId, ReservationStatus, TimeWindow, TrackerId, User, UserId, VehicleId,
    VehicleTracker,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Reservation listing filter.
#[derive(Debug, Clone, Default)]
pub struct ReservationFilter {
    /// Only this customer's reservations.
    pub customer_id: Option<UserId>,
    /// Only this vehicle.
    pub vehicle_id: Option<VehicleId>,
    /// Only this status.
    pub status: Option<ReservationStatus>,
}

/// Driver booking listing filter.
#[derive(Debug, Clone, Default)]
pub struct DriverBookingFilter {
    /// Only this customer's bookings.
    pub customer_id: Option<UserId>,
    /// Only this driver's bookings.
    pub driver_id: Option<UserId>,
    /// Only this status (aliases normalised).
    pub status: Option<DriverBookingStatus>,
}

/// Notification listing filter.
#[derive(Debug, Clone, Default)]
pub struct NotificationFilter {
    /// Only this status.
    pub status: Option<NotificationStatus>,
    /// Include soft-deleted notifications.
    pub include_inactive: bool,
}

/// Vehicle reservations.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Insert a new reservation.
    ///
    /// # Errors
    ///
    /// - `DUPLICATE_BOOKING_CODE` when the code exists
    /// - `VEHICLE_TIME_CONFLICT` when it blocks a vehicle already reserved for an overlapping interval
    async fn insert(&self, reservation: Reservation) -> DomainResult<Reservation>;

    /// Fetch by id.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn get(&self, id: ReservationId) -> DomainResult<Option<Reservation>>;

    /// Replace the stored reservation if its status still equals `expected`.
    ///
    /// # Errors
    ///
    /// - `NOT_FOUND` for unknown ids
    /// - `CONCURRENT_UPDATE` when the stored status differs
    /// - `VEHICLE_TIME_CONFLICT` when the update would overlap another blocking reservation
    async fn compare_and_set(
        &self,
        updated: Reservation,
        expected: ReservationStatus,
    ) -> DomainResult<Reservation>;

    /// List matching reservations, newest first.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn list(&self, filter: ReservationFilter) -> DomainResult<Vec<Reservation>>;

    /// Blocking reservations for `vehicle` overlapping `window`.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn blocking_overlaps(
        &self,
        vehicle: VehicleId,
        window: TimeWindow,
        exclude: Option<ReservationId>,
    ) -> DomainResult<Vec<Reservation>>;
}

/// Driver bookings.
#[async_trait]
pub trait DriverBookingRepository: Send + Sync {
    /// Insert a new booking.
    ///
    /// # Errors
    ///
    /// - `DUPLICATE_BOOKING_CODE` when the code exists
    /// - `DRIVER_TIME_CONFLICT` when a blocking booking of the same driver overlaps
    async fn insert(&self, booking: DriverBooking) -> DomainResult<DriverBooking>;

    /// Fetch by id.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn get(&self, id: DriverBookingId) -> DomainResult<Option<DriverBooking>>;

    /// Replace the stored booking if its status still equals `expected`.
    ///
    /// # Errors
    ///
    /// - `NOT_FOUND`, `CONCURRENT_UPDATE`
    /// - `DRIVER_TIME_CONFLICT` when the update would overlap another blocking booking
    async fn compare_and_set(
        &self,
        updated: DriverBooking,
        expected: DriverBookingStatus,
    ) -> DomainResult<DriverBooking>;

    /// List matching bookings, newest first.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn list(&self, filter: DriverBookingFilter) -> DomainResult<Vec<DriverBooking>>;

    /// Blocking bookings of `driver` overlapping `window`.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn blocking_overlaps(
        &self,
        driver: UserId,
        window: TimeWindow,
        exclude: Option<DriverBookingId>,
    ) -> DomainResult<Vec<DriverBooking>>;

    /// Accepted bookings whose deadline passed before `now`, and requested
    /// bookings created before `requested_before`.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn find_expirable(
        &self,
        now: DateTime<Utc>,
        requested_before: DateTime<Utc>,
    ) -> DomainResult<Vec<DriverBooking>>;
}

/// Payments.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Insert, enforcing one active payment per target.
    ///
    /// # Errors
    ///
    /// `PAYMENT_ALREADY_ACTIVE` when the target has a non-terminal payment.
    async fn insert_exclusive(&self, payment: Payment) -> DomainResult<Payment>;

    /// Fetch by id.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn get(&self, id: PaymentId) -> DomainResult<Option<Payment>>;

    /// Optimistic update: succeeds when the stored version equals
    /// `payment.version`; the stored copy gets `version + 1`.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `CONCURRENT_UPDATE`.
    async fn update(&self, payment: Payment) -> DomainResult<Payment>;

    /// Resolve by gateway reference.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn find_by_provider_ref(&self, provider_ref: &str) -> DomainResult<Option<Payment>>;

    /// Resolve by our merchant reference.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn find_by_merchant_reference(&self, reference: &str) -> DomainResult<Option<Payment>>;

    /// The non-terminal payment of `target`, if any.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn find_active_for_target(&self, target: PaymentTarget) -> DomainResult<Option<Payment>>;

    /// All non-terminal payments.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn list_non_terminal(&self) -> DomainResult<Vec<Payment>>;
}

/// Promo codes.
#[async_trait]
pub trait PromoRepository: Send + Sync {
    /// Case-insensitive lookup.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn find_by_code(&self, code: &str) -> DomainResult<Option<PromoCode>>;

    /// Insert a promo.
    ///
    /// # Errors
    ///
    /// Conflict when the code exists.
    async fn insert(&self, promo: PromoCode) -> DomainResult<PromoCode>;

    /// Atomically count one redemption.
    ///
    /// # Errors
    ///
    /// `PROMO_USAGE_EXCEEDED` at the limit, `NOT_FOUND` for unknown ids.
    async fn increment_usage(&self, id: PromoCodeId) -> DomainResult<PromoCode>;
}

/// Users and driver profiles (read side plus seeding).
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fetch a user.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn get(&self, id: UserId) -> DomainResult<Option<User>>;

    /// Insert a user.
    ///
    /// # Errors
    ///
    /// Conflict on duplicate email.
    async fn insert(&self, user: User) -> DomainResult<User>;

    /// All users (for email fanout).
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn list(&self) -> DomainResult<Vec<User>>;

    /// Driver profile of `user`.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn driver_profile(&self, user: UserId) -> DomainResult<Option<DriverProfile>>;

    /// Insert or replace a driver profile.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn upsert_driver_profile(&self, profile: DriverProfile) -> DomainResult<DriverProfile>;
}

/// Conversations.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Insert.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn insert(&self, conversation: Conversation) -> DomainResult<Conversation>;

    /// Fetch by id.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn get(&self, id: ConversationId) -> DomainResult<Option<Conversation>>;

    /// Replace.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`.
    async fn update(&self, conversation: Conversation) -> DomainResult<Conversation>;

    /// Non-archived conversations of `user`, most recent activity first.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn list_for_user(&self, user: UserId) -> DomainResult<Vec<Conversation>>;

    /// Existing direct conversation between exactly `a` and `b` in `context`.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn find_direct(
        &self,
        a: UserId,
        b: UserId,
        context: ConversationContext,
    ) -> DomainResult<Option<Conversation>>;

    /// Record the latest message; `last_message_at` never moves backwards.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`.
    async fn touch_last_message(
        &self,
        id: ConversationId,
        at: DateTime<Utc>,
        preview: String,
    ) -> DomainResult<Conversation>;
}

/// Chat messages.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Insert.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn insert(&self, message: Message) -> DomainResult<Message>;

    /// Fetch by id.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn get(&self, id: MessageId) -> DomainResult<Option<Message>>;

    /// Messages of a conversation created strictly before `before`, newest
    /// first, at most `limit`.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn list(
        &self,
        conversation: ConversationId,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> DomainResult<Vec<Message>>;

    /// Atomically add `user` to `read_by`. Returns the message and whether it changed.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`.
    async fn add_reader(&self, id: MessageId, user: UserId) -> DomainResult<(Message, bool)>;

    /// Atomically soft-delete: clear text, keep attachments. Returns the
    /// message and whether it changed.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`.
    async fn soft_delete(&self, id: MessageId, at: DateTime<Utc>) -> DomainResult<(Message, bool)>;
}

/// Vehicle trackers.
#[async_trait]
pub trait TrackerRepository: Send + Sync {
    /// Insert.
    ///
    /// # Errors
    ///
    /// `DUPLICATE_DEVICE` when the device id is registered.
    async fn insert(&self, tracker: VehicleTracker) -> DomainResult<VehicleTracker>;

    /// Fetch by id.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn get(&self, id: TrackerId) -> DomainResult<Option<VehicleTracker>>;

    /// Fetch by hardware id.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn find_by_device(&self, device_id: &str) -> DomainResult<Option<VehicleTracker>>;

    /// The tracker currently attached to `vehicle`, most recently seen first.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn find_by_vehicle(&self, vehicle: VehicleId) -> DomainResult<Option<VehicleTracker>>;

    /// All trackers.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn list(&self) -> DomainResult<Vec<VehicleTracker>>;

    /// Optimistic update on `tracker.version`.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `CONCURRENT_UPDATE`, `DUPLICATE_DEVICE`.
    async fn update(&self, tracker: VehicleTracker) -> DomainResult<VehicleTracker>;

    /// Remove.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`.
    async fn delete(&self, id: TrackerId) -> DomainResult<()>;
}

/// Notifications.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Insert.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn insert(&self, notification: Notification) -> DomainResult<Notification>;

    /// Fetch by id.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn get(&self, id: NotificationId) -> DomainResult<Option<Notification>>;

    /// List, newest first.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn list(&self, filter: NotificationFilter) -> DomainResult<Vec<Notification>>;

    /// Replace if the stored status equals `expected`.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `CONCURRENT_UPDATE`.
    async fn update_if_status(
        &self,
        updated: Notification,
        expected: NotificationStatus,
    ) -> DomainResult<Notification>;

    /// Atomically upsert the acknowledgement of `user`.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`.
    async fn record_ack(
        &self,
        id: NotificationId,
        user: UserId,
        apply: Box<dyn for<'a> FnOnce(&'a mut crate::types::Acknowledgement) + Send>,
    ) -> DomainResult<Notification>;

    /// Active scheduled notifications with `send_at <= now`.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    async fn list_due(&self, now: DateTime<Utc>) -> DomainResult<Vec<Notification>>;
}
