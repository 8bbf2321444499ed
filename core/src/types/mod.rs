//! Domain entities and their state machines.

mod chat;
mod driver_booking;
mod ids;
mod money;
mod notification;
mod payment;
mod promo;
mod reservation;
mod time;
mod tracking;
mod user;

pub use chat::{
    Attachment, Conversation, ConversationContext, ConversationKind, Message, Participant,
};
pub use driver_booking::{BookingActor, DriverBooking, DriverBookingStatus, DriverPricing};
pub use ids::{
    BranchId, ConversationId, DriverBookingId, DriverProfileId, MessageId, NotificationId,
    PaymentId, PromoCodeId, ReservationId, TrackerId, UserId, VehicleId, VehicleModelId,
};
pub use money::{Currency, round_money};
pub use notification::{
    Acknowledgement, Audience, Notification, NotificationChannel, NotificationKind,
    NotificationPriority, NotificationStatus, visible_to,
};
pub use payment::{
    Payment, PaymentMethod, PaymentProvider, PaymentStatus, PaymentTarget, PromoSnapshot, Refund,
    StatusChange,
};
pub use promo::{PromoCode, PromoConstraints, PromoScope, PromoType};
pub use reservation::{
    PaymentSummary, Place, Reservation, ReservationPricing, ReservationStatus,
};
pub use time::TimeWindow;
pub use tracking::{LocationSnapshot, LocationSource, TrackerStatus, VehicleTracker};
pub use user::{
    DriverProfile, DriverProfileStatus, Principal, Profile, Role, RoleProfile, User, UserStatus,
};
