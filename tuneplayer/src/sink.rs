//! Audio sink and voice transport seams
//!
//! A room owns one [`AudioSink`]. The sink is bound to at most one
//! [`VoiceConnection`] and tags every playback with an id; events the
//! connection reports for an older id are stale and dropped by the room.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;
use tunecatalog::Track;

use crate::error::{PlayerError, Result};
use crate::{ChannelId, RoomId};

/// Playable audio backed by a materialized cache file
#[derive(Debug, Clone)]
pub struct AudioResource {
    path: PathBuf,
    track: Track,
    size: u64,
    volume: f32,
}

impl AudioResource {
    /// Fails with a playback error when the file is missing or empty
    pub async fn from_file(path: impl Into<PathBuf>, track: Track, volume: f32) -> Result<Self> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| PlayerError::playback(format!("{}: {e}", path.display())))?;

        if !metadata.is_file() || metadata.len() == 0 {
            return Err(PlayerError::playback(format!(
                "{} is not playable audio",
                path.display()
            )));
        }

        Ok(Self {
            path,
            track,
            size: metadata.len(),
            volume: volume.clamp(0.0, 1.0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    /// Playback reached the end or was halted
    Finished,
    Failed(String),
    NoListeners,
    ListenersReturned,
    /// The connection was closed under the playback
    Disconnected,
}

/// Handle a connection uses to report events for one playback
#[derive(Debug, Clone)]
pub struct SinkReporter {
    play_id: u64,
    tx: mpsc::UnboundedSender<(u64, SinkEvent)>,
}

impl SinkReporter {
    pub fn new(play_id: u64, tx: mpsc::UnboundedSender<(u64, SinkEvent)>) -> Self {
        Self { play_id, tx }
    }

    pub fn play_id(&self) -> u64 {
        self.play_id
    }

    /// Returns false once the room is gone
    pub fn report(&self, event: SinkEvent) -> bool {
        self.tx.send((self.play_id, event)).is_ok()
    }
}

/// Voice transport used to reach a channel
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    /// Opens a connection to `channel`; it may not be ready yet
    async fn join(&self, room: RoomId, channel: ChannelId) -> Result<Arc<dyn VoiceConnection>>;
}

#[async_trait]
pub trait VoiceConnection: Send + Sync {
    fn id(&self) -> &str;

    fn channel(&self) -> ChannelId;

    /// Resolves once the connection can carry audio
    async fn ready(&self) -> Result<()>;

    /// Starts playing `resource`; events go through `reporter`
    fn transmit(&self, resource: AudioResource, reporter: SinkReporter) -> Result<()>;

    /// Stops the current playback, which then reports `Finished`
    fn halt(&self);

    /// Number of listeners in the channel
    fn listeners(&self) -> usize;

    /// False once the connection is closed, locally or by the remote side
    fn is_alive(&self) -> bool;

    /// Closes the connection; calling it again is a no-op
    async fn destroy(&self);
}

/// Per-room audio output
pub struct AudioSink {
    room: RoomId,
    connection: Option<Arc<dyn VoiceConnection>>,
    play_id: u64,
    active: bool,
    events: mpsc::UnboundedSender<(u64, SinkEvent)>,
}

impl AudioSink {
    pub fn new(room: RoomId, events: mpsc::UnboundedSender<(u64, SinkEvent)>) -> Self {
        Self {
            room,
            connection: None,
            play_id: 0,
            active: false,
            events,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.connection.is_some()
    }

    /// Bound to a connection that can still carry audio
    pub fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(|c| c.is_alive())
    }

    pub fn connection(&self) -> Option<&Arc<dyn VoiceConnection>> {
        self.connection.as_ref()
    }

    /// Binds the sink to a new connection, dropping any playback on the old one
    pub fn bind(&mut self, connection: Arc<dyn VoiceConnection>) {
        self.stop();
        debug!(room = self.room, connection = connection.id(), "Sink bound");
        self.connection = Some(connection);
    }

    pub fn unbind(&mut self) -> Option<Arc<dyn VoiceConnection>> {
        self.stop();
        let connection = self.connection.take();
        if let Some(conn) = &connection {
            debug!(room = self.room, connection = conn.id(), "Sink unbound");
        }
        connection
    }

    /// Hands a resource to the connection and returns its playback id
    pub fn play(&mut self, resource: AudioResource) -> Result<u64> {
        let connection = self
            .connection
            .as_ref()
            .ok_or_else(|| PlayerError::connection("no voice connection bound"))?;

        self.play_id += 1;
        let reporter = SinkReporter::new(self.play_id, self.events.clone());
        connection.transmit(resource, reporter)?;
        self.active = true;
        Ok(self.play_id)
    }

    /// Halts the current playback; the connection reports `Finished` for it
    pub fn halt(&mut self) -> bool {
        match (&self.connection, self.active) {
            (Some(connection), true) => {
                connection.halt();
                true
            }
            _ => false,
        }
    }

    /// Halts and invalidates the current playback so its events are ignored
    pub fn stop(&mut self) {
        self.halt();
        self.play_id += 1;
        self.active = false;
    }

    /// Marks the playback `play_id` as over; false if the id is stale
    pub fn complete(&mut self, play_id: u64) -> bool {
        if self.is_current(play_id) {
            self.active = false;
            return true;
        }
        false
    }

    pub fn is_current(&self, play_id: u64) -> bool {
        self.active && play_id == self.play_id
    }
}
