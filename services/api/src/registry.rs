//! In-memory registry of live connections
//!
//! One handle per user: a reconnect overwrites the previous entry, and any
//! disconnect for the user removes it. Rooms are tracked per connection so a
//! closed socket only releases its own memberships.

use std::{collections::HashMap, fmt, sync::Arc};

use tokio::sync::{
    RwLock,
    mpsc::{self, error::TrySendError},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{notification::LiveEvent, user::Role};

/// Events a slow connection may have queued before new ones are dropped
pub const LIVE_QUEUE_CAPACITY: usize = 64;

/// Outbound side of a live connection
pub type LiveSender = mpsc::Sender<LiveEvent>;

/// Inbound side of a live connection, drained by its socket task
pub type LiveReceiver = mpsc::Receiver<LiveEvent>;

/// Bounded queue for one live connection
pub fn live_channel() -> (LiveSender, LiveReceiver) {
    mpsc::channel(LIVE_QUEUE_CAPACITY)
}

/// Broadcast group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    User(Uuid),
    Admins,
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::User(id) => write!(f, "user:{}", id),
            Room::Admins => f.write_str("admins"),
        }
    }
}

/// Addressable live connection
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: Uuid,
    sender: LiveSender,
}

impl ConnectionHandle {
    pub fn new(sender: LiveSender) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
        }
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    handles: HashMap<Uuid, ConnectionHandle>,
    rooms: HashMap<Room, HashMap<Uuid, LiveSender>>,
}

/// Process-wide connection registry, cheap to clone
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the handle for `user_id`, returning the one it replaced
    pub async fn register(
        &self,
        user_id: Uuid,
        handle: ConnectionHandle,
    ) -> Option<ConnectionHandle> {
        self.inner.write().await.handles.insert(user_id, handle)
    }

    /// Remove the handle for `user_id`. Removing an absent entry is a no-op.
    pub async fn unregister(&self, user_id: Uuid) -> bool {
        self.inner.write().await.handles.remove(&user_id).is_some()
    }

    pub async fn lookup(&self, user_id: Uuid) -> Option<ConnectionHandle> {
        self.inner.read().await.handles.get(&user_id).cloned()
    }

    pub async fn join(&self, room: Room, handle: &ConnectionHandle) {
        self.inner
            .write()
            .await
            .rooms
            .entry(room)
            .or_default()
            .insert(handle.id, handle.sender.clone());
    }

    pub async fn leave(&self, room: Room, connection_id: Uuid) {
        let mut inner = self.inner.write().await;
        if let Some(members) = inner.rooms.get_mut(&room) {
            members.remove(&connection_id);
            if members.is_empty() {
                inner.rooms.remove(&room);
            }
        }
    }

    /// Queue `event` on every connection in `room`, returning how many accepted
    /// it. A connection whose queue is full misses the event.
    pub async fn emit_to(&self, room: Room, event: &LiveEvent) -> usize {
        let inner = self.inner.read().await;
        let Some(members) = inner.rooms.get(&room) else {
            return 0;
        };

        members
            .iter()
            .filter(|(connection_id, sender)| match sender.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        "Live queue of connection {} in {} is full, dropping event",
                        connection_id, room
                    );
                    false
                }
                Err(TrySendError::Closed(_)) => false,
            })
            .count()
    }

    /// Push `event` to each recipient that currently has a registered handle.
    /// Recipients without one are skipped.
    pub async fn push(&self, recipients: &[Uuid], event: &LiveEvent) -> usize {
        let mut delivered = 0;
        for &user_id in recipients {
            if self.lookup(user_id).await.is_none() {
                debug!("No live connection for user {}, skipping push", user_id);
                continue;
            }
            delivered += self.emit_to(Room::User(user_id), event).await;
        }
        delivered
    }

    /// Register a freshly verified connection and join its rooms
    pub async fn connect(&self, user_id: Uuid, role: Role, sender: LiveSender) -> ConnectionHandle {
        let handle = ConnectionHandle::new(sender);

        if let Some(previous) = self.register(user_id, handle.clone()).await {
            debug!(
                "Connection {} replaces {} for user {}",
                handle.id, previous.id, user_id
            );
        }

        self.join(Room::User(user_id), &handle).await;
        if role == Role::Admin {
            self.join(Room::Admins, &handle).await;
        }

        info!("User {} connected ({})", user_id, handle.id);
        handle
    }

    /// Drop the user's registry entry and release this connection's rooms
    pub async fn disconnect(&self, user_id: Uuid, handle: &ConnectionHandle) {
        let removed = self.unregister(user_id).await;

        self.leave(Room::User(user_id), handle.id).await;
        self.leave(Room::Admins, handle.id).await;

        info!(
            "User {} disconnected ({}), entry removed: {}",
            user_id, handle.id, removed
        );
    }

    /// Number of users with a registered handle
    pub async fn connected_users(&self) -> usize {
        self.inner.read().await.handles.len()
    }
}
