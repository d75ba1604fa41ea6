//! Voice connections, at most one per room

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{PlayerError, Result};
use crate::room::RoomHandle;
use crate::sink::{VoiceConnection, VoiceGateway};
use crate::{ChannelId, RoomId};

/// Default time allowed for a connection to become ready
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type Slot = Arc<tokio::sync::Mutex<Option<Arc<dyn VoiceConnection>>>>;

/// Owns the voice connection of every room
///
/// Connecting a room that already has a connection tears the old one down
/// first. A connection closed by the remote side counts as absent. Operations
/// on the same room are serialized; different rooms never wait on each other.
pub struct SessionManager {
    gateway: Arc<dyn VoiceGateway>,
    slots: Mutex<HashMap<RoomId, Slot>>,
    ready_timeout: Duration,
}

impl SessionManager {
    pub fn new(gateway: Arc<dyn VoiceGateway>) -> Self {
        Self {
            gateway,
            slots: Mutex::new(HashMap::new()),
            ready_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn ready_timeout(&self) -> Duration {
        self.ready_timeout
    }

    fn slot(&self, room: RoomId) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(room).or_default())
    }

    /// Connects the room to `channel` and binds its sink
    ///
    /// The sink is bound as soon as the connection exists; if it is not
    /// ready within the timeout it is unbound and destroyed.
    pub async fn try_connect(&self, room: &RoomHandle, channel: ChannelId) -> Result<()> {
        let room_id = room.room();
        let slot = self.slot(room_id);
        let mut current = slot.lock().await;

        if let Some(old) = current.take() {
            info!(room = room_id, channel = old.channel(), "Replacing voice connection");
            let unbound = room.unbind().await;
            old.destroy().await;
            unbound?;
        }

        let connection = self.gateway.join(room_id, channel).await?;
        if let Err(e) = room.bind(Arc::clone(&connection)).await {
            connection.destroy().await;
            return Err(e);
        }

        let failure = match tokio::time::timeout(self.ready_timeout, connection.ready()).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(_) => Some(PlayerError::connection(format!(
                "channel {channel} not ready after {}s",
                self.ready_timeout.as_secs_f32()
            ))),
        };

        if let Some(error) = failure {
            warn!(room = room_id, channel, error = %error, "Voice connection failed");
            if let Err(e) = room.unbind().await {
                debug!(room = room_id, error = %e, "Room already closed");
            }
            connection.destroy().await;
            return Err(error);
        }

        info!(room = room_id, channel, connection = connection.id(), "Voice connection ready");
        *current = Some(connection);
        Ok(())
    }

    /// Same as [`try_connect`](Self::try_connect), errors are logged
    pub async fn connect(&self, room: &RoomHandle, channel: ChannelId) -> bool {
        match self.try_connect(room, channel).await {
            Ok(()) => true,
            Err(e) => {
                debug!(room = room.room(), channel, error = %e, "connect failed");
                false
            }
        }
    }

    /// Unbinds the sink and destroys the connection; the queue is kept
    pub async fn disconnect(&self, room: &RoomHandle) -> bool {
        let slot = self.slot(room.room());
        let mut current = slot.lock().await;
        let Some(connection) = current.take() else {
            return false;
        };

        if let Err(e) = room.unbind().await {
            debug!(room = room.room(), error = %e, "Room already closed");
        }
        connection.destroy().await;
        info!(room = room.room(), "Voice connection closed");
        true
    }

    /// Channel of the room's live connection
    ///
    /// A connection found closed is released from the slot.
    pub async fn channel(&self, room: RoomId) -> Option<ChannelId> {
        let slot = self.slot(room);
        let mut current = slot.lock().await;
        if let Some(dead) = current.take_if(|c| !c.is_alive()) {
            info!(room, channel = dead.channel(), "Voice connection closed remotely");
            dead.destroy().await;
        }
        current.as_ref().map(|c| c.channel())
    }

    pub async fn is_connected(&self, room: RoomId) -> bool {
        self.channel(room).await.is_some()
    }

    /// Rooms that currently hold a connection slot
    pub fn rooms(&self) -> Vec<RoomId> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.keys().copied().collect()
    }
}
