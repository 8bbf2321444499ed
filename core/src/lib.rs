//! # Carhire Core
//!
//! Domain types and collaborator seams for the car-rental marketplace.
//!
//! This crate is deliberately free of I/O. It defines:
//!
//! - **Entities**: reservations, driver bookings, payments, promo codes,
//!   conversations, messages, trackers and notifications
//! - **State machines**: the legal status transitions of each entity as pure functions
//! - **Errors**: [`error::DomainError`] with a stable code and an [`error::ErrorKind`]
//! - **Environment**: [`environment::Clock`] and [`environment::IdGenerator`]
//! - **Seams**: repository traits, the payment gateway, the realtime broadcaster
//!   and the mailer
//!
//! Everything stateful lives behind a trait so the application crate can wire
//! production implementations and tests can wire deterministic ones.
//!
//! ## Example
//!
//! ```
//! use carhire_core::types::{DriverBookingStatus, BookingActor};
//!
//! let from = DriverBookingStatus::Requested;
//! assert!(from.can_transition_to(DriverBookingStatus::AcceptedByDriver, BookingActor::Driver));
//! assert!(!from.can_transition_to(DriverBookingStatus::Completed, BookingActor::Driver));
//! ```

pub mod broadcast;
pub mod environment;
pub mod error;
pub mod gateway;
pub mod mail;
pub mod repository;
pub mod types;

pub use error::{DomainError, DomainResult, ErrorKind};
