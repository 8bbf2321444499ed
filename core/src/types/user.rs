use super::ids::{BranchId, DriverProfileId, UserId};
use super::money::Currency;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Marketplace roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Rents vehicles and drivers.
    Customer,
    /// Branch staff.
    Agent,
    /// Branch manager.
    Manager,
    /// Platform administrator.
    Admin,
    /// Offers driving time.
    Driver,
}

impl Role {
    /// Stable lowercase name, used for `role:<name>` rooms.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Agent => "agent",
            Self::Manager => "manager",
            Self::Admin => "admin",
            Self::Driver => "driver",
        }
    }

    /// Agents, managers and admins.
    #[must_use]
    pub const fn is_staff(self) -> bool {
        matches!(self, Self::Agent | Self::Manager | Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "agent" => Ok(Self::Agent),
            "manager" => Ok(Self::Manager),
            "admin" => Ok(Self::Admin),
            "driver" => Ok(Self::Driver),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// Registered, email not verified yet.
    Pending,
    /// May use the platform.
    Active,
    /// Temporarily blocked.
    Suspended,
    /// Soft deleted.
    Deleted,
}

/// Platform user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Identifier.
    pub id: UserId,
    /// Unique email.
    pub email: String,
    /// Display name.
    pub full_name: String,
    /// Contact phone, used for mobile payments.
    pub phone: Option<String>,
    /// Non-empty role set.
    pub roles: BTreeSet<Role>,
    /// Account status.
    pub status: UserStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Whether the user holds `role`.
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Only active users take part in business operations.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// Authenticated caller as seen by services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Caller id.
    pub user_id: UserId,
    /// Caller roles.
    pub roles: BTreeSet<Role>,
}

impl Principal {
    /// Build a principal.
    #[must_use]
    pub fn new(user_id: UserId, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            user_id,
            roles: roles.into_iter().collect(),
        }
    }

    /// Whether the caller holds `role`.
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Whether the caller holds any of `roles`.
    #[must_use]
    pub fn has_any(&self, roles: &[Role]) -> bool {
        roles.iter().any(|r| self.roles.contains(r))
    }

    /// Agent, manager or admin.
    #[must_use]
    pub fn is_staff(&self) -> bool {
        self.roles.iter().any(|r| r.is_staff())
    }

    /// Manager or admin.
    #[must_use]
    pub fn is_manager_or_admin(&self) -> bool {
        self.has_any(&[Role::Manager, Role::Admin])
    }
}

/// Role-specific profile data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum RoleProfile {
    /// Customer details.
    Customer {
        /// Driving licence number.
        licence_number: Option<String>,
    },
    /// Agent attached to a branch.
    Agent {
        /// Home branch.
        branch_id: BranchId,
    },
    /// Manager of a branch.
    Manager {
        /// Managed branch.
        branch_id: BranchId,
    },
    /// Platform admin.
    Admin,
}

impl RoleProfile {
    /// The role this variant describes.
    #[must_use]
    pub const fn role(&self) -> Role {
        match self {
            Self::Customer { .. } => Role::Customer,
            Self::Agent { .. } => Role::Agent,
            Self::Manager { .. } => Role::Manager,
            Self::Admin => Role::Admin,
        }
    }
}

/// Common profile fields plus a tagged role variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Owner.
    pub user_id: UserId,
    /// Display name.
    pub display_name: String,
    /// Role-specific data.
    pub role_data: RoleProfile,
}

impl Profile {
    /// A profile is consistent when its owner holds the variant's role.
    #[must_use]
    pub fn is_consistent_with(&self, user: &User) -> bool {
        self.user_id == user.id && user.has_role(self.role_data.role())
    }
}

/// Review status of a driver profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverProfileStatus {
    /// Awaiting review.
    Pending,
    /// May be booked.
    Approved,
    /// Rejected by staff.
    Rejected,
}

/// Driver record, one per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverProfile {
    /// Identifier.
    pub id: DriverProfileId,
    /// Owning user.
    pub user_id: UserId,
    /// Review status.
    pub status: DriverProfileStatus,
    /// Accepting new bookings.
    pub is_available: bool,
    /// Non-negative hourly rate.
    pub hourly_rate: Decimal,
    /// Rate currency.
    pub currency: Currency,
}

impl DriverProfile {
    /// Approved and available.
    #[must_use]
    pub fn is_bookable(&self) -> bool {
        self.status == DriverProfileStatus::Approved && self.is_available
    }
}
