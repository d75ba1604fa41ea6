//! Entry point used by the chat layer

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, info};
use tunecatalog::{format_duration, Track};

use crate::error::{PlayerError, Result};
use crate::materializer::Materializer;
use crate::resolver::TrackResolver;
use crate::room::{QueueSnapshot, RoomHandle, RoomSettings, DEFAULT_PRELOAD_WINDOW, DEFAULT_VOLUME};
use crate::session::{SessionManager, DEFAULT_CONNECT_TIMEOUT};
use crate::sink::VoiceGateway;
use crate::{ChannelId, RoomId};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerSettings {
    pub preload_window: usize,
    pub connect_timeout: Duration,
    pub volume: f32,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            preload_window: DEFAULT_PRELOAD_WINDOW,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            volume: DEFAULT_VOLUME,
        }
    }
}

impl PlayerSettings {
    fn room_settings(&self) -> RoomSettings {
        RoomSettings {
            preload_window: self.preload_window,
            volume: self.volume,
        }
    }
}

/// Summary of a `play` request
#[derive(Debug, Clone, PartialEq)]
pub enum Enqueued {
    Track {
        track: Track,
        /// 1-based position in the queue
        position: usize,
    },
    Playlist {
        title: String,
        added: usize,
        total_duration_secs: u64,
    },
}

impl fmt::Display for Enqueued {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Enqueued::Track { track, position } => write!(f, "Queued {track} at #{position}"),
            Enqueued::Playlist {
                title,
                added,
                total_duration_secs,
            } => write!(
                f,
                "Queued {added} tracks from {title} [{}]",
                format_duration(*total_duration_secs)
            ),
        }
    }
}

/// Rooms, their voice sessions and the shared resolver/materializer
pub struct Jukebox {
    resolver: Arc<dyn TrackResolver>,
    materializer: Arc<dyn Materializer>,
    sessions: SessionManager,
    rooms: Mutex<HashMap<RoomId, RoomHandle>>,
    settings: PlayerSettings,
}

impl Jukebox {
    pub fn new(
        resolver: Arc<dyn TrackResolver>,
        materializer: Arc<dyn Materializer>,
        gateway: Arc<dyn VoiceGateway>,
        settings: PlayerSettings,
    ) -> Self {
        Self {
            resolver,
            materializer,
            sessions: SessionManager::new(gateway).with_ready_timeout(settings.connect_timeout),
            rooms: Mutex::new(HashMap::new()),
            settings,
        }
    }

    pub fn settings(&self) -> &PlayerSettings {
        &self.settings
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Handle of the room, spawning its worker on first use
    pub fn room(&self, room: RoomId) -> RoomHandle {
        let mut rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = rooms.get(&room).filter(|h| !h.is_closed()) {
            return handle.clone();
        }

        debug!(room, "Creating room");
        let handle = RoomHandle::spawn(room, Arc::clone(&self.materializer), self.settings.room_settings());
        rooms.insert(room, handle.clone());
        handle
    }

    /// Handle of a room that already has a worker
    fn find_room(&self, room: RoomId) -> Option<RoomHandle> {
        let rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        rooms.get(&room).filter(|h| !h.is_closed()).cloned()
    }

    pub fn rooms(&self) -> Vec<RoomId> {
        let rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        rooms.keys().copied().collect()
    }

    /// Connects to `channel` if needed, resolves `query` and queues the result
    ///
    /// Playlist links queue every track of the playlist; anything else
    /// queues a single track.
    pub async fn play(&self, room: RoomId, channel: ChannelId, query: &str) -> Result<Enqueued> {
        let query = query.trim();
        if query.is_empty() {
            return Err(PlayerError::EmptyQuery);
        }

        let handle = self.room(room);
        if self.sessions.channel(room).await != Some(channel) {
            self.sessions.try_connect(&handle, channel).await?;
        }

        if self.resolver.is_playlist_query(query) {
            let playlist = self
                .resolver
                .resolve_playlist(query)
                .await
                .ok_or_else(|| PlayerError::Resolution(query.to_string()))?;

            let title = playlist.title.clone();
            let total_duration_secs = playlist.total_duration_secs();
            let added = playlist.tracks.len();
            handle.enqueue(playlist.tracks).await?;

            info!(room, playlist = %title, added, "Playlist queued");
            return Ok(Enqueued::Playlist {
                title,
                added,
                total_duration_secs,
            });
        }

        let track = self
            .resolver
            .resolve(query)
            .await
            .ok_or_else(|| PlayerError::Resolution(query.to_string()))?;
        let position = handle.enqueue(vec![track.clone()]).await?;

        info!(room, track = %track, position, "Track queued");
        Ok(Enqueued::Track { track, position })
    }

    /// Queues tracks handed over by a playlist store
    pub async fn enqueue_tracks(&self, room: RoomId, tracks: Vec<Track>) -> Result<usize> {
        let added = tracks.len();
        self.room(room).enqueue(tracks).await?;
        Ok(added)
    }

    /// Skips the current track; returns the number of tracks still queued
    pub async fn skip(&self, room: RoomId) -> Result<usize> {
        match self.find_room(room) {
            Some(handle) => handle.skip().await,
            None => Ok(0),
        }
    }

    /// Clears the queue and stops playback; returns the number of dropped tracks
    pub async fn stop(&self, room: RoomId) -> Result<usize> {
        match self.find_room(room) {
            Some(handle) => handle.stop().await,
            None => Ok(0),
        }
    }

    pub async fn queue(&self, room: RoomId) -> Result<QueueSnapshot> {
        match self.find_room(room) {
            Some(handle) => handle.snapshot().await,
            None => Ok(QueueSnapshot::empty(room)),
        }
    }

    pub async fn try_connect(&self, room: RoomId, channel: ChannelId) -> Result<()> {
        self.sessions.try_connect(&self.room(room), channel).await
    }

    pub async fn connect(&self, room: RoomId, channel: ChannelId) -> bool {
        self.sessions.connect(&self.room(room), channel).await
    }

    /// Leaves the voice channel; the queue stays as it is
    pub async fn disconnect(&self, room: RoomId) -> bool {
        match self.find_room(room) {
            Some(handle) => self.sessions.disconnect(&handle).await,
            None => false,
        }
    }

    /// Disconnects every room and stops the workers
    pub async fn shutdown(&self) {
        let rooms: Vec<RoomHandle> = {
            let mut rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
            rooms.drain().map(|(_, handle)| handle).collect()
        };

        for handle in &rooms {
            self.sessions.disconnect(handle).await;
            handle.shutdown();
        }
        info!(rooms = rooms.len(), "Jukebox shut down");
    }
}
