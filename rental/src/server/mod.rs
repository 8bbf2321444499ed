//! HTTP server module for the carhire platform.
//!
//! - Application state and service wiring
//! - Readiness check
//! - Router configuration

pub mod health;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::{AppState, Dependencies};
