//! In-process session registry and room fanout.
//!
//! Every session owns a bounded outbound queue. Publishing enqueues with
//! `try_send` under the registry lock and never waits: a full queue drops the
//! frame for that session only. Since a session's events are handled one at a
//! time and enqueued synchronously, frames from one source reach each room
//! member in order; frames from different sources interleave in the order
//! they take the lock.
//!
//! Tracker sessions are bound to their device. Whatever changes a tracker's
//! vehicle moves every live session of that device to the new `vehicle:` room.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use carhire_core::broadcast::{Broadcaster, Namespace, RealtimeEvent, SessionId, rooms};
use carhire_core::types::{TrackerId, VehicleId};
use tokio::sync::mpsc::{self, error::TrySendError};

use super::protocol::ServerFrame;
use crate::metrics;

struct Session {
    namespace: Namespace,
    rooms: BTreeSet<String>,
    outbound: mpsc::Sender<ServerFrame>,
    device: Option<Device>,
}

/// The tracker behind a device session and the vehicle room it sits in.
struct Device {
    tracker: TrackerId,
    room: Option<String>,
}

#[derive(Default)]
struct Registry {
    sessions: HashMap<SessionId, Session>,
    rooms: HashMap<(Namespace, String), BTreeSet<SessionId>>,
}

impl Registry {
    fn join(&mut self, id: SessionId, room: &str) -> bool {
        let Some(session) = self.sessions.get_mut(&id) else {
            return false;
        };
        if !session.rooms.insert(room.to_string()) {
            return false;
        }
        let key = (session.namespace, room.to_string());
        self.rooms.entry(key).or_default().insert(id);
        true
    }

    fn leave(&mut self, id: SessionId, room: &str) -> bool {
        let Some(session) = self.sessions.get_mut(&id) else {
            return false;
        };
        if !session.rooms.remove(room) {
            return false;
        }
        let key = (session.namespace, room.to_string());
        remove_member(&mut self.rooms, &key, id);
        true
    }

    /// Move a device session from its current vehicle room to `next`.
    fn place(&mut self, id: SessionId, next: Option<String>) {
        let Some(device) = self.sessions.get_mut(&id).and_then(|s| s.device.as_mut()) else {
            return;
        };
        let current = std::mem::replace(&mut device.room, next.clone());
        if current == next {
            return;
        }
        if let Some(room) = current {
            self.leave(id, &room);
        }
        if let Some(room) = next {
            self.join(id, &room);
        }
    }
}

/// Rooms and sessions of both namespaces.
#[derive(Clone)]
pub struct SessionFabric {
    registry: Arc<Mutex<Registry>>,
    queue_depth: usize,
}

impl SessionFabric {
    /// Fabric whose sessions buffer up to `queue_depth` outbound frames.
    #[must_use]
    pub fn new(queue_depth: usize) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            queue_depth: queue_depth.max(1),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a session and return the receiving end of its queue.
    pub fn register(&self, namespace: Namespace, id: SessionId) -> mpsc::Receiver<ServerFrame> {
        let (outbound, receiver) = mpsc::channel(self.queue_depth);
        let replaced = self.registry().sessions.insert(
            id,
            Session {
                namespace,
                rooms: BTreeSet::new(),
                outbound,
                device: None,
            },
        );
        if replaced.is_none() {
            metrics::record_session_delta(namespace, 1);
        }
        tracing::debug!(session_id = %id, %namespace, "Session registered");
        receiver
    }

    /// Put a session in a room of its namespace. Returns false when the
    /// session is unknown or already a member.
    pub fn join(&self, id: SessionId, room: &str) -> bool {
        let joined = self.registry().join(id, room);
        if joined {
            tracing::debug!(session_id = %id, room, "Joined room");
        }
        joined
    }

    /// Take a session out of a room. Returns false when it was not a member.
    pub fn leave(&self, id: SessionId, room: &str) -> bool {
        let left = self.registry().leave(id, room);
        if left {
            tracing::debug!(session_id = %id, room, "Left room");
        }
        left
    }

    /// Mark a session as the live connection of `tracker` and put it in the
    /// room of the vehicle the tracker is attached to.
    pub fn bind_device(&self, id: SessionId, tracker: TrackerId, vehicle: Option<VehicleId>) -> bool {
        let mut registry = self.registry();
        let Some(session) = registry.sessions.get_mut(&id) else {
            return false;
        };
        session.device = Some(Device { tracker, room: None });
        registry.place(id, vehicle.map(rooms::vehicle));
        tracing::debug!(session_id = %id, tracker_id = %tracker, "Device session bound");
        true
    }

    /// Move every live session of `tracker` to the room of `vehicle`, or out
    /// of its vehicle room when `None`. Returns how many sessions it touched.
    pub fn move_device(&self, tracker: TrackerId, vehicle: Option<VehicleId>) -> usize {
        let mut registry = self.registry();
        let bound: Vec<SessionId> = registry
            .sessions
            .iter()
            .filter(|(_, s)| s.device.as_ref().is_some_and(|d| d.tracker == tracker))
            .map(|(id, _)| *id)
            .collect();
        let next = vehicle.map(rooms::vehicle);
        for id in &bound {
            registry.place(*id, next.clone());
        }
        if !bound.is_empty() {
            tracing::debug!(tracker_id = %tracker, sessions = bound.len(), room = ?next, "Device sessions moved");
        }
        bound.len()
    }

    /// Remove a session from every room and close its queue. Frames still
    /// queued for it are dropped with the receiver.
    pub fn disconnect(&self, id: SessionId) {
        let mut registry = self.registry();
        let Some(session) = registry.sessions.remove(&id) else {
            return;
        };
        for room in &session.rooms {
            remove_member(&mut registry.rooms, &(session.namespace, room.clone()), id);
        }
        drop(registry);
        metrics::record_session_delta(session.namespace, -1);
        tracing::debug!(session_id = %id, rooms = session.rooms.len(), "Session disconnected");
    }

    /// Queue a frame for one session. Returns whether it was queued.
    pub fn send(&self, id: SessionId, frame: ServerFrame) -> bool {
        let registry = self.registry();
        registry
            .sessions
            .get(&id)
            .is_some_and(|session| enqueue(id, &session.outbound, frame))
    }

    /// Rooms a session is in.
    #[must_use]
    pub fn rooms_of(&self, id: SessionId) -> Vec<String> {
        self.registry()
            .sessions
            .get(&id)
            .map(|s| s.rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Sessions in a room.
    #[must_use]
    pub fn members(&self, namespace: Namespace, room: &str) -> usize {
        self.registry()
            .rooms
            .get(&(namespace, room.to_string()))
            .map_or(0, BTreeSet::len)
    }

    /// Connected sessions of a namespace.
    #[must_use]
    pub fn session_count(&self, namespace: Namespace) -> usize {
        self.registry()
            .sessions
            .values()
            .filter(|s| s.namespace == namespace)
            .count()
    }
}

fn remove_member(
    rooms: &mut HashMap<(Namespace, String), BTreeSet<SessionId>>,
    key: &(Namespace, String),
    id: SessionId,
) {
    if let Some(members) = rooms.get_mut(key) {
        members.remove(&id);
        if members.is_empty() {
            rooms.remove(key);
        }
    }
}

fn enqueue(id: SessionId, outbound: &mpsc::Sender<ServerFrame>, frame: ServerFrame) -> bool {
    match outbound.try_send(frame) {
        Ok(()) => true,
        Err(TrySendError::Full(frame)) => {
            tracing::warn!(session_id = %id, event = %frame.event, "Session queue full, frame dropped");
            false
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

impl Broadcaster for SessionFabric {
    fn publish(
        &self,
        namespace: Namespace,
        room: &str,
        event: RealtimeEvent,
        exclude: Option<SessionId>,
    ) -> usize {
        let registry = self.registry();
        let Some(members) = registry.rooms.get(&(namespace, room.to_string())) else {
            return 0;
        };
        let frame = ServerFrame::from(event);
        members
            .iter()
            .filter(|id| Some(**id) != exclude)
            .filter_map(|id| registry.sessions.get(id).map(|s| (id, s)))
            .filter(|(id, session)| enqueue(**id, &session.outbound, frame.clone()))
            .count()
    }
}
