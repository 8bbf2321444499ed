//! Carhire - the core of a car-rental marketplace
//!
//! Customers reserve vehicles and book drivers, pay through a Paynow
//! compatible gateway, chat with staff and drivers, and follow vehicles
//! live. The crate holds the coordinators behind those flows and the HTTP
//! and websocket surface over them.
//!
//! # Architecture
//!
//! ```text
//!   HTTP /api/v1            /ws/chat  /ws/tracking
//!        │                        │
//!        ▼                        ▼
//! ┌──────────────┐        ┌──────────────┐
//! │   Handlers   │        │   Sessions   │──── rooms ────┐
//! └──────────────┘        └──────────────┘               │
//!        │                        │                      │
//!        ▼                        ▼                      │
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐   │
//! │   Booking    │◄─│   Payment    │  │ Chat/Tracking│   │
//! │ Coordinators │  │ Orchestrator │  │ Notification │   │
//! └──────────────┘  └──────────────┘  └──────────────┘   │
//!        │                 │                 │           │
//!        ▼                 ▼                 └─ publish ─┘
//! ┌──────────────┐  ┌──────────────┐
//! │ Repositories │  │   Gateway    │
//! └──────────────┘  └──────────────┘
//! ```
//!
//! # Key Features
//!
//! ## 1. Conflict-free bookings
//!
//! A vehicle or driver never holds two blocking bookings whose half-open
//! windows overlap. The check runs in the coordinator and again in storage,
//! so a lost race surfaces as a conflict instead of a double booking.
//!
//! ## 2. Forward-only payments
//!
//! Payment status only moves forward. Webhooks, polls and the reconcile
//! sweep may report the same status any number of times; the first capture
//! confirms the booking and redeems the promo, replays change nothing.
//!
//! ## 3. Rooms
//!
//! Every change is published to named rooms (`user:<id>`,
//! `conversation:<id>`, `vehicle:<id>`, ...) of the chat or tracking
//! namespace. Slow sessions drop frames instead of slowing publishers.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod auth;
pub mod availability;
pub mod booking;
pub mod chat;
pub mod config;
pub mod mail;
pub mod metrics;
pub mod notification;
pub mod payment;
pub mod pricing;
pub mod promo;
pub mod realtime;
pub mod server;
pub mod store;
pub mod sweepers;
pub mod tracking;

pub use config::Config;
pub use server::{AppState, Dependencies, build_router};
