//! Vehicle trackers and live location.
//!
//! Devices log in with their hardware id and receive a device token. An
//! attached tracker reports fixes that are kept as the vehicle's last known
//! location and published to the `vehicle:<id>` room of the tracking
//! namespace.

use std::sync::Arc;

use carhire_core::broadcast::{Broadcaster, Namespace, RealtimeEvent, rooms};
use carhire_core::environment::{Clock, IdGenerator};
use carhire_core::error::{DomainError, DomainResult, ErrorKind, codes};
use carhire_core::repository::TrackerRepository;
use carhire_core::types::{
    LocationSnapshot, LocationSource, Principal, TrackerId, TrackerStatus, VehicleId,
    VehicleTracker,
};
use carhire_runtime::{RetryPolicy, retry_with_predicate};
use carhire_web::TokenService;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::metrics;

/// A tracker to register.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTracker {
    /// Unique hardware id.
    pub device_id: String,
    /// Human label.
    pub label: Option<String>,
    /// Initial vehicle.
    pub vehicle_id: Option<VehicleId>,
    /// Initial status.
    #[serde(default)]
    pub status: TrackerStatus,
}

/// Editable tracker fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackerUpdate {
    /// Human label.
    pub label: Option<String>,
    /// Device status.
    pub status: Option<TrackerStatus>,
}

/// One fix as reported by a device.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LocationReport {
    /// Latitude in degrees.
    #[serde(alias = "latitude")]
    pub lat: f64,
    /// Longitude in degrees.
    #[serde(alias = "lng", alias = "longitude")]
    pub lon: f64,
    /// Speed in km/h.
    pub speed: Option<f64>,
    /// Heading in degrees.
    pub heading: Option<f64>,
    /// Accuracy radius in metres.
    pub accuracy: Option<f64>,
    /// Origin of the fix.
    #[serde(default)]
    pub source: LocationSource,
    /// Fix time; server time when absent.
    pub at: Option<DateTime<Utc>>,
}

/// Result of a device login.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSession {
    /// Bearer token for the device.
    pub token: String,
    /// The tracker it is bound to.
    pub tracker: VehicleTracker,
}

/// Last known location of a vehicle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleLocation {
    /// Vehicle.
    pub vehicle_id: VehicleId,
    /// Reporting tracker.
    pub tracker_id: TrackerId,
    /// Latest fix, if any arrived.
    pub location: Option<LocationSnapshot>,
    /// Last contact with the tracker.
    pub last_seen_at: Option<DateTime<Utc>>,
}

fn invalid_location(message: impl Into<String>) -> DomainError {
    DomainError::validation(codes::INVALID_LOCATION, message)
}

fn tracker_not_found(what: impl std::fmt::Display) -> DomainError {
    DomainError::new(
        ErrorKind::NotFound,
        codes::TRACKER_NOT_FOUND,
        format!("no tracker for {what}"),
    )
}

fn tracker_disabled(tracker: &VehicleTracker) -> DomainError {
    DomainError::new(
        ErrorKind::Forbidden,
        codes::TRACKER_DISABLED,
        format!("tracker {} is in maintenance", tracker.device_id),
    )
}

fn require_fleet_admin(actor: &Principal) -> DomainResult<()> {
    if actor.is_manager_or_admin() {
        Ok(())
    } else {
        Err(DomainError::forbidden("trackers are managed by managers and admins"))
    }
}

impl LocationReport {
    fn validate(&self) -> DomainResult<()> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(invalid_location("latitude must be within [-90, 90]"));
        }
        if !self.lon.is_finite() || !(-180.0..=180.0).contains(&self.lon) {
            return Err(invalid_location("longitude must be within [-180, 180]"));
        }
        for (name, value) in [("speed", self.speed), ("accuracy", self.accuracy)] {
            if value.is_some_and(|v| !v.is_finite() || v < 0.0) {
                return Err(invalid_location(format!("{name} must be a non-negative number")));
            }
        }
        if self.heading.is_some_and(|h| !h.is_finite()) {
            return Err(invalid_location("heading must be a number"));
        }
        Ok(())
    }

    fn snapshot(&self, now: DateTime<Utc>) -> LocationSnapshot {
        LocationSnapshot {
            lat: self.lat,
            lon: self.lon,
            speed: self.speed,
            heading: self.heading.map(|h| h.rem_euclid(360.0)),
            accuracy: self.accuracy,
            source: self.source,
            at: self.at.unwrap_or(now),
        }
    }
}

/// Tracker administration, device sessions and location ingest.
#[derive(Clone)]
pub struct TrackingService {
    trackers: Arc<dyn TrackerRepository>,
    tokens: TokenService,
    broadcaster: Arc<dyn Broadcaster>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl TrackingService {
    /// Service over its collaborators.
    #[must_use]
    pub fn new(
        trackers: Arc<dyn TrackerRepository>,
        tokens: TokenService,
        broadcaster: Arc<dyn Broadcaster>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            trackers,
            tokens,
            broadcaster,
            clock,
            ids,
        }
    }

    fn publish(&self, vehicle: VehicleId, event: RealtimeEvent) {
        self.broadcaster
            .publish(Namespace::Tracking, &rooms::vehicle(vehicle), event, None);
    }

    /// A tracker by id, without an access check.
    ///
    /// # Errors
    ///
    /// `TRACKER_NOT_FOUND`.
    pub async fn device(&self, id: TrackerId) -> DomainResult<VehicleTracker> {
        self.trackers
            .get(id)
            .await?
            .ok_or_else(|| tracker_not_found(id))
    }

    /// Load, change and store a tracker, retrying on a concurrent update.
    /// Returns the stored tracker and the vehicle it was attached to before
    /// the change.
    async fn modify<F>(&self, id: TrackerId, change: F) -> DomainResult<(VehicleTracker, Option<VehicleId>)>
    where
        F: Fn(&mut VehicleTracker) -> DomainResult<()> + Sync,
    {
        retry_with_predicate(
            &RetryPolicy::compare_and_set(),
            || self.try_modify(id, &change),
            |e: &DomainError| e.code() == codes::CONCURRENT_UPDATE,
        )
        .await
    }

    async fn try_modify<F>(&self, id: TrackerId, change: &F) -> DomainResult<(VehicleTracker, Option<VehicleId>)>
    where
        F: Fn(&mut VehicleTracker) -> DomainResult<()> + Sync,
    {
        let mut tracker = self.device(id).await?;
        let before = tracker.vehicle_id;
        change(&mut tracker)?;
        tracker.updated_at = self.clock.now();
        let stored = self.trackers.update(tracker).await?;
        Ok((stored, before))
    }

    /// Register a device.
    ///
    /// # Errors
    ///
    /// `FORBIDDEN`, `VALIDATION_ERROR` for a blank device id, `DUPLICATE_DEVICE`.
    pub async fn register(&self, actor: &Principal, input: NewTracker) -> DomainResult<VehicleTracker> {
        require_fleet_admin(actor)?;
        let device_id = input.device_id.trim().to_string();
        if device_id.is_empty() {
            return Err(DomainError::invalid_input("device_id must not be empty"));
        }
        let now = self.clock.now();
        let tracker = VehicleTracker {
            id: TrackerId::from_uuid(self.ids.next_uuid()),
            device_id,
            label: input.label,
            vehicle_id: input.vehicle_id,
            status: input.status,
            last_location: None,
            last_seen_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        let stored = self.trackers.insert(tracker).await?;
        tracing::info!(tracker_id = %stored.id, device_id = %stored.device_id, "Tracker registered");
        Ok(stored)
    }

    /// All trackers.
    ///
    /// # Errors
    ///
    /// `FORBIDDEN`.
    pub async fn list(&self, actor: &Principal) -> DomainResult<Vec<VehicleTracker>> {
        require_fleet_admin(actor)?;
        self.trackers.list().await
    }

    /// One tracker.
    ///
    /// # Errors
    ///
    /// `FORBIDDEN`, `TRACKER_NOT_FOUND`.
    pub async fn get(&self, actor: &Principal, id: TrackerId) -> DomainResult<VehicleTracker> {
        require_fleet_admin(actor)?;
        self.device(id).await
    }

    /// Change label or status.
    ///
    /// # Errors
    ///
    /// `FORBIDDEN`, `TRACKER_NOT_FOUND`, `CONCURRENT_UPDATE`.
    pub async fn update(
        &self,
        actor: &Principal,
        id: TrackerId,
        input: TrackerUpdate,
    ) -> DomainResult<VehicleTracker> {
        require_fleet_admin(actor)?;
        let (updated, _) = self
            .modify(id, |tracker| {
                if let Some(label) = &input.label {
                    tracker.label = Some(label.trim().to_string()).filter(|l| !l.is_empty());
                }
                if let Some(status) = input.status {
                    tracker.status = status;
                }
                Ok(())
            })
            .await?;
        tracing::info!(tracker_id = %id, status = ?updated.status, "Tracker updated");
        Ok(updated)
    }

    /// Remove a tracker.
    ///
    /// # Errors
    ///
    /// `FORBIDDEN`, `NOT_FOUND`.
    pub async fn delete(&self, actor: &Principal, id: TrackerId) -> DomainResult<()> {
        require_fleet_admin(actor)?;
        self.trackers.delete(id).await?;
        tracing::info!(tracker_id = %id, "Tracker deleted");
        Ok(())
    }

    /// Exchange a hardware id for a device token and mark the tracker seen.
    ///
    /// # Errors
    ///
    /// `TRACKER_NOT_FOUND`, `TRACKER_DISABLED` for trackers in maintenance.
    pub async fn login(&self, device_id: &str) -> DomainResult<DeviceSession> {
        let device_id = device_id.trim();
        let tracker = self
            .trackers
            .find_by_device(device_id)
            .await?
            .ok_or_else(|| tracker_not_found(format!("device {device_id}")))?;
        if tracker.status == TrackerStatus::Maintenance {
            return Err(tracker_disabled(&tracker));
        }

        let now = self.clock.now();
        let (tracker, _) = self
            .modify(tracker.id, |t| {
                if t.status == TrackerStatus::Maintenance {
                    return Err(tracker_disabled(t));
                }
                t.status = TrackerStatus::Active;
                t.last_seen_at = Some(now);
                Ok(())
            })
            .await?;
        let token = self
            .tokens
            .issue_device(tracker.id, now)
            .map_err(|e| DomainError::internal(e.to_string()))?;
        tracing::info!(tracker_id = %tracker.id, "Tracker logged in");
        Ok(DeviceSession { token, tracker })
    }

    /// Bind a tracker to a vehicle. Moving to another vehicle publishes a
    /// detach on the old room first.
    ///
    /// # Errors
    ///
    /// `TRACKER_NOT_FOUND`, `TRACKER_DISABLED`.
    pub async fn attach(&self, id: TrackerId, vehicle: VehicleId) -> DomainResult<VehicleTracker> {
        let now = self.clock.now();
        let (tracker, before) = self
            .modify(id, |t| {
                if t.status == TrackerStatus::Maintenance {
                    return Err(tracker_disabled(t));
                }
                t.vehicle_id = Some(vehicle);
                t.status = TrackerStatus::Active;
                t.last_seen_at = Some(now);
                Ok(())
            })
            .await?;

        if let Some(old) = before.filter(|v| *v != vehicle) {
            self.publish(
                old,
                RealtimeEvent::new(
                    "vehicle:tracker_detached",
                    json!({ "vehicle_id": old, "tracker_id": id }),
                ),
            );
        }
        self.publish(
            vehicle,
            RealtimeEvent::new(
                "vehicle:tracker_attached",
                json!({ "vehicle_id": vehicle, "tracker_id": id, "at": now }),
            ),
        );
        tracing::info!(tracker_id = %id, vehicle_id = %vehicle, "Tracker attached");
        Ok(tracker)
    }

    /// Unbind a tracker. Returns the tracker and the vehicle it left.
    ///
    /// # Errors
    ///
    /// `TRACKER_NOT_FOUND`.
    pub async fn detach(&self, id: TrackerId) -> DomainResult<(VehicleTracker, Option<VehicleId>)> {
        let now = self.clock.now();
        let (tracker, left) = self
            .modify(id, |t| {
                t.vehicle_id = None;
                t.last_seen_at = Some(now);
                Ok(())
            })
            .await?;
        if let Some(vehicle) = left {
            self.publish(
                vehicle,
                RealtimeEvent::new(
                    "vehicle:tracker_detached",
                    json!({ "vehicle_id": vehicle, "tracker_id": id, "at": now }),
                ),
            );
            tracing::info!(tracker_id = %id, vehicle_id = %vehicle, "Tracker detached");
        }
        Ok((tracker, left))
    }

    /// Store a fix and publish it to the attached vehicle's room. A fix older
    /// than the stored one is published but does not replace it.
    ///
    /// # Errors
    ///
    /// `INVALID_LOCATION`, `TRACKER_NOT_FOUND`, `TRACKER_DISABLED`.
    pub async fn record_location(&self, id: TrackerId, report: LocationReport) -> DomainResult<VehicleTracker> {
        report.validate()?;
        let now = self.clock.now();
        let snapshot = report.snapshot(now);
        let (tracker, _) = self
            .modify(id, |t| {
                if t.status == TrackerStatus::Maintenance {
                    return Err(tracker_disabled(t));
                }
                if t.last_location.as_ref().is_none_or(|l| l.at <= snapshot.at) {
                    t.last_location = Some(snapshot.clone());
                }
                t.last_seen_at = Some(now);
                Ok(())
            })
            .await?;

        metrics::record_location_update();
        if let Some(vehicle) = tracker.vehicle_id {
            self.publish(
                vehicle,
                RealtimeEvent::new(
                    "vehicle:location_update",
                    json!({ "vehicle_id": vehicle, "tracker_id": id, "location": snapshot }),
                ),
            );
        } else {
            tracing::debug!(tracker_id = %id, "Location from unattached tracker stored only");
        }
        Ok(tracker)
    }

    /// Last known location of a vehicle, from its attached tracker.
    ///
    /// # Errors
    ///
    /// `TRACKER_NOT_FOUND` when no tracker is attached.
    pub async fn last_known(&self, vehicle: VehicleId) -> DomainResult<VehicleLocation> {
        let tracker = self
            .trackers
            .find_by_vehicle(vehicle)
            .await?
            .ok_or_else(|| tracker_not_found(format!("vehicle {vehicle}")))?;
        Ok(VehicleLocation {
            vehicle_id: vehicle,
            tracker_id: tracker.id,
            location: tracker.last_location,
            last_seen_at: tracker.last_seen_at,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use carhire_core::types::Role;
    use carhire_testing::recorders::RecordingBroadcaster;
    use carhire_testing::{ManualClock, SequentialIdGenerator, at, fixtures};
    use carhire_web::Authenticated;
    use chrono::Duration;
    use uuid::Uuid;

    struct Harness {
        tracking: TrackingService,
        tokens: TokenService,
        broadcaster: Arc<RecordingBroadcaster>,
        clock: Arc<ManualClock>,
        admin: Principal,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        let clock = Arc::new(ManualClock::new(at("2025-03-01T09:00:00Z")));
        let tokens = TokenService::new(b"secret", Duration::hours(1), Duration::days(30));
        Harness {
            tracking: TrackingService::new(
                store,
                tokens.clone(),
                broadcaster.clone(),
                clock.clone(),
                Arc::new(SequentialIdGenerator::new()),
            ),
            tokens,
            broadcaster,
            clock,
            admin: fixtures::principal(&fixtures::user(1, &[Role::Admin])),
        }
    }

    fn vehicle(n: u128) -> VehicleId {
        VehicleId::from_uuid(Uuid::from_u128(1000 + n))
    }

    fn fix(lat: f64, lon: f64) -> LocationReport {
        LocationReport {
            lat,
            lon,
            speed: Some(42.0),
            heading: Some(370.0),
            accuracy: None,
            source: LocationSource::Gps,
            at: None,
        }
    }

    fn new_tracker(device: &str) -> NewTracker {
        NewTracker {
            device_id: device.into(),
            label: Some("Hilux #3".into()),
            vehicle_id: None,
            status: TrackerStatus::Inactive,
        }
    }

    #[tokio::test]
    async fn register_requires_fleet_admin_and_unique_device() {
        let h = harness();
        let agent = fixtures::principal(&fixtures::user(2, &[Role::Agent]));
        let err = h.tracking.register(&agent, new_tracker("GPS-1")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        h.tracking.register(&h.admin, new_tracker(" GPS-1 ")).await.unwrap();
        let err = h.tracking.register(&h.admin, new_tracker("GPS-1")).await.unwrap_err();
        assert_eq!(err.code(), codes::DUPLICATE_DEVICE);
    }

    #[tokio::test]
    async fn login_issues_device_token() {
        let h = harness();
        let tracker = h.tracking.register(&h.admin, new_tracker("GPS-1")).await.unwrap();
        let session = h.tracking.login("GPS-1").await.unwrap();
        assert_eq!(session.tracker.status, TrackerStatus::Active);
        assert_eq!(session.tracker.last_seen_at, Some(at("2025-03-01T09:00:00Z")));
        assert_eq!(
            h.tokens.verify(&session.token, h.clock.now()),
            Ok(Authenticated::Tracker(tracker.id))
        );

        let err = h.tracking.login("GPS-404").await.unwrap_err();
        assert_eq!(err.code(), codes::TRACKER_NOT_FOUND);
    }

    #[tokio::test]
    async fn maintenance_tracker_cannot_log_in() {
        let h = harness();
        let tracker = h.tracking.register(&h.admin, new_tracker("GPS-1")).await.unwrap();
        h.tracking
            .update(&h.admin, tracker.id, TrackerUpdate { label: None, status: Some(TrackerStatus::Maintenance) })
            .await
            .unwrap();
        let err = h.tracking.login("GPS-1").await.unwrap_err();
        assert_eq!(err.code(), codes::TRACKER_DISABLED);
    }

    #[tokio::test]
    async fn location_flows_to_vehicle_room() {
        let h = harness();
        let tracker = h.tracking.register(&h.admin, new_tracker("GPS-1")).await.unwrap();
        h.tracking.attach(tracker.id, vehicle(1)).await.unwrap();
        let room = rooms::vehicle(vehicle(1));
        assert_eq!(h.broadcaster.events_in(&room, "vehicle:tracker_attached").len(), 1);

        h.clock.advance(Duration::seconds(5));
        let updated = h.tracking.record_location(tracker.id, fix(-17.8292, 31.0522)).await.unwrap();
        let stored = updated.last_location.unwrap();
        assert_eq!(stored.at, at("2025-03-01T09:00:05Z"));
        assert_eq!(stored.heading, Some(10.0));

        let events = h.broadcaster.events_in(&room, "vehicle:location_update");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data["location"]["lat"], json!(-17.8292));

        let last = h.tracking.last_known(vehicle(1)).await.unwrap();
        assert_eq!(last.tracker_id, tracker.id);
        assert_eq!(last.location.map(|l| l.lon), Some(31.0522));
    }

    #[tokio::test]
    async fn invalid_coordinates_rejected() {
        let h = harness();
        let tracker = h.tracking.register(&h.admin, new_tracker("GPS-1")).await.unwrap();
        for report in [fix(91.0, 0.0), fix(0.0, -180.5), fix(f64::NAN, 0.0)] {
            let err = h.tracking.record_location(tracker.id, report).await.unwrap_err();
            assert_eq!(err.code(), codes::INVALID_LOCATION);
        }
    }

    #[tokio::test]
    async fn older_fix_does_not_replace_newer() {
        let h = harness();
        let tracker = h.tracking.register(&h.admin, new_tracker("GPS-1")).await.unwrap();
        let mut late = fix(1.0, 1.0);
        late.at = Some(at("2025-03-01T08:59:00Z"));
        h.tracking.record_location(tracker.id, fix(2.0, 2.0)).await.unwrap();
        let kept = h.tracking.record_location(tracker.id, late).await.unwrap();
        assert_eq!(kept.last_location.map(|l| l.lat), Some(2.0));
    }

    #[tokio::test]
    async fn moving_and_detaching() {
        let h = harness();
        let tracker = h.tracking.register(&h.admin, new_tracker("GPS-1")).await.unwrap();
        h.tracking.attach(tracker.id, vehicle(1)).await.unwrap();
        h.tracking.attach(tracker.id, vehicle(2)).await.unwrap();
        assert_eq!(
            h.broadcaster.events_in(&rooms::vehicle(vehicle(1)), "vehicle:tracker_detached").len(),
            1
        );

        let (detached, left) = h.tracking.detach(tracker.id).await.unwrap();
        assert_eq!(left, Some(vehicle(2)));
        assert_eq!(detached.vehicle_id, None);
        let err = h.tracking.last_known(vehicle(2)).await.unwrap_err();
        assert_eq!(err.code(), codes::TRACKER_NOT_FOUND);
    }

    /// Loses the first `conflicts` updates to a concurrent writer.
    struct Contended {
        inner: MemoryStore,
        conflicts: AtomicUsize,
    }

    #[async_trait]
    impl TrackerRepository for Contended {
        async fn insert(&self, tracker: VehicleTracker) -> DomainResult<VehicleTracker> {
            TrackerRepository::insert(&self.inner, tracker).await
        }

        async fn get(&self, id: TrackerId) -> DomainResult<Option<VehicleTracker>> {
            TrackerRepository::get(&self.inner, id).await
        }

        async fn find_by_device(&self, device_id: &str) -> DomainResult<Option<VehicleTracker>> {
            TrackerRepository::find_by_device(&self.inner, device_id).await
        }

        async fn find_by_vehicle(&self, vehicle: VehicleId) -> DomainResult<Option<VehicleTracker>> {
            TrackerRepository::find_by_vehicle(&self.inner, vehicle).await
        }

        async fn list(&self) -> DomainResult<Vec<VehicleTracker>> {
            TrackerRepository::list(&self.inner).await
        }

        async fn update(&self, tracker: VehicleTracker) -> DomainResult<VehicleTracker> {
            let lost = self
                .conflicts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if lost {
                return Err(DomainError::concurrent_update("tracker", tracker.id));
            }
            TrackerRepository::update(&self.inner, tracker).await
        }

        async fn delete(&self, id: TrackerId) -> DomainResult<()> {
            TrackerRepository::delete(&self.inner, id).await
        }
    }

    fn contended(conflicts: usize) -> (TrackingService, Principal) {
        let store = Arc::new(Contended {
            inner: MemoryStore::new(),
            conflicts: AtomicUsize::new(conflicts),
        });
        let tracking = TrackingService::new(
            store,
            TokenService::new(b"secret", Duration::hours(1), Duration::days(30)),
            Arc::new(RecordingBroadcaster::new()),
            Arc::new(ManualClock::new(at("2025-03-01T09:00:00Z"))),
            Arc::new(SequentialIdGenerator::new()),
        );
        (tracking, fixtures::principal(&fixtures::user(1, &[Role::Admin])))
    }

    #[tokio::test]
    async fn lost_update_races_are_retried() {
        let (tracking, admin) = contended(2);
        let tracker = tracking.register(&admin, new_tracker("GPS-1")).await.unwrap();
        let attached = tracking.attach(tracker.id, vehicle(1)).await.unwrap();
        assert_eq!(attached.vehicle_id, Some(vehicle(1)));
        assert_eq!(attached.status, TrackerStatus::Active);
    }

    #[tokio::test]
    async fn persistent_contention_surfaces_as_conflict() {
        let (tracking, admin) = contended(usize::MAX);
        let tracker = tracking.register(&admin, new_tracker("GPS-1")).await.unwrap();
        let err = tracking.attach(tracker.id, vehicle(1)).await.unwrap_err();
        assert_eq!(err.code(), codes::CONCURRENT_UPDATE);
        assert_eq!(tracking.device(tracker.id).await.unwrap().vehicle_id, None);
    }
}
