use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Wrap an existing UUID.
            #[must_use]
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

define_id!(
    /// User identifier.
    UserId
);
define_id!(
    /// Reservation identifier.
    ReservationId
);
define_id!(
    /// Driver booking identifier.
    DriverBookingId
);
define_id!(
    /// Driver profile identifier.
    DriverProfileId
);
define_id!(
    /// Payment identifier.
    PaymentId
);
define_id!(
    /// Promo code identifier.
    PromoCodeId
);
define_id!(
    /// Conversation identifier.
    ConversationId
);
define_id!(
    /// Chat message identifier.
    MessageId
);
define_id!(
    /// Vehicle tracker identifier.
    TrackerId
);
define_id!(
    /// Vehicle unit identifier.
    VehicleId
);
define_id!(
    /// Vehicle model identifier.
    VehicleModelId
);
define_id!(
    /// Branch identifier.
    BranchId
);
define_id!(
    /// Notification identifier.
    NotificationId
);
