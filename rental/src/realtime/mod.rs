//! Realtime sessions over websockets.
//!
//! - [`fabric`]: session registry, rooms and the [`Broadcaster`] implementation
//! - [`protocol`]: JSON frames exchanged with clients
//! - [`socket`]: the `/ws/chat` and `/ws/tracking` handlers and session loop
//!
//! [`Broadcaster`]: carhire_core::broadcast::Broadcaster

pub mod fabric;
pub mod protocol;
pub mod socket;

use std::sync::Arc;

use carhire_core::environment::IdGenerator;
use carhire_core::error::DomainResult;
use carhire_core::types::{TrackerId, VehicleId, VehicleTracker};

use crate::chat::ChatService;
use crate::config::RealtimeConfig;
use crate::tracking::TrackingService;

pub use fabric::SessionFabric;
pub use protocol::{ClientCommand, ClientFrame, ServerFrame};

/// Everything a websocket session needs.
#[derive(Clone)]
pub struct Realtime {
    /// Rooms and sessions.
    pub fabric: SessionFabric,
    /// Chat operations.
    pub chat: ChatService,
    /// Tracker operations.
    pub tracking: TrackingService,
    /// Session ids.
    pub ids: Arc<dyn IdGenerator>,
    /// Keep-alive settings.
    pub config: RealtimeConfig,
}

impl Realtime {
    /// Attach `tracker` to `vehicle` and move its live sessions to the
    /// vehicle's room.
    ///
    /// # Errors
    ///
    /// `TRACKER_NOT_FOUND`, `TRACKER_DISABLED`.
    pub async fn attach_tracker(&self, tracker: TrackerId, vehicle: VehicleId) -> DomainResult<VehicleTracker> {
        let attached = self.tracking.attach(tracker, vehicle).await?;
        self.fabric.move_device(tracker, attached.vehicle_id);
        Ok(attached)
    }

    /// Detach `tracker` and take its live sessions out of the vehicle room.
    ///
    /// # Errors
    ///
    /// `TRACKER_NOT_FOUND`.
    pub async fn detach_tracker(&self, tracker: TrackerId) -> DomainResult<(VehicleTracker, Option<VehicleId>)> {
        let detached = self.tracking.detach(tracker).await?;
        self.fabric.move_device(tracker, None);
        Ok(detached)
    }
}
