//! Per-room worker
//!
//! Each room is one task owning its queue, its state and its sink. Commands
//! arrive on an unbounded channel and are handled one at a time, so queue
//! mutations and advances for a room never interleave. The materialize step
//! of an advance runs on its own task and reports back as a command.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use tunecatalog::Track;

use crate::error::{PlayerError, Result};
use crate::materializer::Materializer;
use crate::queue::RoomQueue;
use crate::sink::{AudioResource, AudioSink, SinkEvent, VoiceConnection};
use crate::state::{PlaybackEvent, PlaybackState, RoomStats};
use crate::RoomId;

/// Default number of upcoming tracks preloaded after each advance
pub const DEFAULT_PRELOAD_WINDOW: usize = 3;

/// Default playback volume
pub const DEFAULT_VOLUME: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoomSettings {
    pub preload_window: usize,
    pub volume: f32,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            preload_window: DEFAULT_PRELOAD_WINDOW,
            volume: DEFAULT_VOLUME,
        }
    }
}

/// What the chat layer shows for `queue`
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub room: RoomId,
    pub state: PlaybackState,
    pub now_playing: Option<Track>,
    pub upcoming: Vec<Track>,
    pub stats: RoomStats,
    pub last_error: Option<PlayerError>,
}

impl QueueSnapshot {
    /// Snapshot of a room that never played anything
    pub fn empty(room: RoomId) -> Self {
        Self {
            room,
            state: PlaybackState::Idle,
            now_playing: None,
            upcoming: Vec::new(),
            stats: RoomStats::default(),
            last_error: None,
        }
    }

    /// Sum of the known durations of the upcoming tracks
    pub fn upcoming_duration_secs(&self) -> u64 {
        self.upcoming.iter().filter_map(|t| t.duration_secs).sum()
    }
}

enum RoomCommand {
    Enqueue {
        tracks: Vec<Track>,
        reply: oneshot::Sender<usize>,
    },
    Skip {
        reply: oneshot::Sender<usize>,
    },
    Stop {
        reply: oneshot::Sender<usize>,
    },
    Snapshot {
        reply: oneshot::Sender<QueueSnapshot>,
    },
    Bind {
        connection: Arc<dyn VoiceConnection>,
        reply: oneshot::Sender<()>,
    },
    Unbind {
        reply: oneshot::Sender<Option<Arc<dyn VoiceConnection>>>,
    },
    Advanced {
        entry_id: u64,
        generation: u64,
        outcome: Result<AudioResource>,
    },
    Shutdown,
}

/// Cloneable handle to a room worker
#[derive(Clone)]
pub struct RoomHandle {
    room: RoomId,
    tx: mpsc::UnboundedSender<RoomCommand>,
}

impl RoomHandle {
    /// Spawns the worker of `room` on the current runtime
    pub fn spawn(room: RoomId, materializer: Arc<dyn Materializer>, settings: RoomSettings) -> Self {
        let (tx, commands) = mpsc::unbounded_channel();
        let (sink_tx, sink_events) = mpsc::unbounded_channel();

        let worker = RoomWorker {
            room,
            queue: RoomQueue::new(),
            state: PlaybackState::Idle,
            sink: AudioSink::new(room, sink_tx),
            now_playing: None,
            advancing: false,
            generation: 0,
            stats: RoomStats::default(),
            last_error: None,
            settings,
            materializer,
            commands,
            sink_events,
            myself: tx.downgrade(),
        };
        tokio::spawn(worker.run());

        Self { room, tx }
    }

    pub fn room(&self) -> RoomId {
        self.room
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> RoomCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| PlayerError::RoomClosed(self.room))?;
        rx.await.map_err(|_| PlayerError::RoomClosed(self.room))
    }

    /// Appends tracks and returns the queue length afterwards
    pub async fn enqueue(&self, tracks: Vec<Track>) -> Result<usize> {
        self.request(|reply| RoomCommand::Enqueue { tracks, reply }).await
    }

    /// Halts the current track and returns how many tracks remain queued
    pub async fn skip(&self) -> Result<usize> {
        self.request(|reply| RoomCommand::Skip { reply }).await
    }

    /// Clears the queue, halts playback and returns how many tracks were dropped
    pub async fn stop(&self) -> Result<usize> {
        self.request(|reply| RoomCommand::Stop { reply }).await
    }

    pub async fn snapshot(&self) -> Result<QueueSnapshot> {
        self.request(|reply| RoomCommand::Snapshot { reply }).await
    }

    pub async fn bind(&self, connection: Arc<dyn VoiceConnection>) -> Result<()> {
        self.request(|reply| RoomCommand::Bind { connection, reply }).await
    }

    pub async fn unbind(&self) -> Result<Option<Arc<dyn VoiceConnection>>> {
        self.request(|reply| RoomCommand::Unbind { reply }).await
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(RoomCommand::Shutdown);
    }
}

struct RoomWorker {
    room: RoomId,
    queue: RoomQueue,
    state: PlaybackState,
    sink: AudioSink,
    now_playing: Option<Track>,
    /// An advance is materializing the head
    advancing: bool,
    /// Bumped by stop; advance results from an older generation are stale
    generation: u64,
    stats: RoomStats,
    last_error: Option<PlayerError>,
    settings: RoomSettings,
    materializer: Arc<dyn Materializer>,
    commands: mpsc::UnboundedReceiver<RoomCommand>,
    sink_events: mpsc::UnboundedReceiver<(u64, SinkEvent)>,
    myself: mpsc::WeakUnboundedSender<RoomCommand>,
}

impl RoomWorker {
    async fn run(mut self) {
        debug!(room = self.room, "Room worker started");
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(RoomCommand::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },
                Some((play_id, event)) = self.sink_events.recv() => {
                    self.on_sink_event(play_id, event);
                }
            }
        }

        self.sink.stop();
        debug!(room = self.room, queued = self.queue.len(), "Room worker stopped");
    }

    fn handle(&mut self, command: RoomCommand) {
        match command {
            RoomCommand::Enqueue { tracks, reply } => {
                let added = self.queue.enqueue_many(tracks);
                debug!(room = self.room, added, queued = self.queue.len(), "Enqueued");
                if self.state.is_idle() {
                    self.advance();
                }
                let _ = reply.send(self.queue.len());
            }
            RoomCommand::Skip { reply } => {
                if self.sink.halt() {
                    info!(room = self.room, remaining = self.queue.len(), "Skipping current track");
                }
                let _ = reply.send(self.queue.len());
            }
            RoomCommand::Stop { reply } => {
                let dropped = self.queue.clear();
                self.generation += 1;
                self.sink.stop();
                self.now_playing = None;
                self.apply(PlaybackEvent::Stopped);
                info!(room = self.room, dropped, "Playback stopped");
                let _ = reply.send(dropped);
            }
            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(QueueSnapshot {
                    room: self.room,
                    state: self.state,
                    now_playing: self.now_playing.clone(),
                    upcoming: self.queue.tracks(),
                    stats: self.stats,
                    last_error: self.last_error.clone(),
                });
            }
            RoomCommand::Bind { connection, reply } => {
                self.sink.bind(connection);
                self.now_playing = None;
                self.apply(PlaybackEvent::Stopped);
                if !self.queue.is_empty() {
                    self.advance();
                }
                let _ = reply.send(());
            }
            RoomCommand::Unbind { reply } => {
                let connection = self.sink.unbind();
                self.now_playing = None;
                self.apply(PlaybackEvent::Stopped);
                let _ = reply.send(connection);
            }
            RoomCommand::Advanced {
                entry_id,
                generation,
                outcome,
            } => self.on_advanced(entry_id, generation, outcome),
            RoomCommand::Shutdown => {}
        }
    }

    /// Feeds an event to the state machine; true when an advance must follow
    fn apply(&mut self, event: PlaybackEvent) -> bool {
        let transition = self.state.on(event);
        if !transition.accepted {
            debug!(room = self.room, state = %self.state, ?event, "Event ignored");
            return false;
        }

        if transition.state != self.state {
            debug!(
                room = self.room,
                from = %self.state,
                to = %transition.state,
                ?event,
                "Playback state changed"
            );
            if transition.state == PlaybackState::Error {
                self.stats.errors += 1;
            }
            self.state = transition.state;
        }
        transition.advance
    }

    fn advance(&mut self) {
        if self.advancing {
            return;
        }

        let Some(head) = self.queue.head().cloned() else {
            self.apply(PlaybackEvent::QueueExhausted);
            return;
        };

        if !self.sink.is_connected() {
            let error = if self.sink.is_bound() {
                PlayerError::connection("voice connection lost")
            } else {
                PlayerError::connection("not connected to a voice channel")
            };
            self.connection_lost(error);
            return;
        }

        self.apply(PlaybackEvent::AdvanceStarted);
        self.advancing = true;

        let materializer = Arc::clone(&self.materializer);
        let myself = self.myself.clone();
        let generation = self.generation;
        let volume = self.settings.volume;
        debug!(room = self.room, track = %head.track.title, "Buffering");

        tokio::spawn(async move {
            let outcome = match materializer.materialize(&head.track).await {
                Ok(path) => AudioResource::from_file(path, head.track, volume).await,
                Err(e) => Err(e),
            };
            if let Some(tx) = myself.upgrade() {
                let _ = tx.send(RoomCommand::Advanced {
                    entry_id: head.id,
                    generation,
                    outcome,
                });
            }
        });
    }

    fn on_advanced(&mut self, entry_id: u64, generation: u64, outcome: Result<AudioResource>) {
        self.advancing = false;

        if generation != self.generation || self.state != PlaybackState::Buffering {
            debug!(room = self.room, entry_id, "Discarding stale advance result");
            if self.state.is_idle() {
                self.advance();
            }
            return;
        }

        let resource = match outcome {
            Ok(resource) => resource,
            Err(e) => return self.fail_head(entry_id, e),
        };

        match self.sink.play(resource) {
            Ok(play_id) => {
                let entry = self.queue.pop_head_if(entry_id);
                self.now_playing = entry.map(|e| e.track);
                self.stats.played += 1;
                if let Some(track) = &self.now_playing {
                    info!(room = self.room, play_id, track = %track, "Now playing");
                }
                self.apply(PlaybackEvent::AdvanceSucceeded);
                self.preload();
            }
            Err(e @ PlayerError::Connection(_)) => self.connection_lost(e),
            Err(e) => self.fail_head(entry_id, e),
        }
    }

    /// Unbinds a dead connection and waits for a new one with the queue intact
    fn connection_lost(&mut self, error: PlayerError) {
        if let Some(connection) = self.sink.unbind() {
            info!(room = self.room, connection = connection.id(), "Unbinding closed voice connection");
        }
        warn!(room = self.room, queued = self.queue.len(), error = %error, "No voice connection, queue kept");
        self.now_playing = None;
        self.last_error = Some(error);
        self.apply(PlaybackEvent::NoConnection);
    }

    /// Drops the head after a failed play attempt and moves on
    fn fail_head(&mut self, entry_id: u64, error: PlayerError) {
        let dropped = self.queue.pop_head_if(entry_id);
        warn!(
            room = self.room,
            track = dropped.as_ref().map(|e| e.track.title.as_str()).unwrap_or_default(),
            error = %error,
            "Dropping track"
        );
        self.stats.failed += 1;
        self.last_error = Some(error);
        if self.apply(PlaybackEvent::AdvanceFailed) {
            self.advance();
        }
    }

    fn on_sink_event(&mut self, play_id: u64, event: SinkEvent) {
        match event {
            SinkEvent::Finished => {
                if !self.sink.complete(play_id) {
                    return;
                }
                if let Some(track) = self.now_playing.take() {
                    debug!(room = self.room, track = %track.title, "Track finished");
                }
                if self.apply(PlaybackEvent::SinkFinished) {
                    self.advance();
                }
            }
            SinkEvent::Failed(reason) => {
                if !self.sink.complete(play_id) {
                    return;
                }
                let track = self.now_playing.take();
                warn!(
                    room = self.room,
                    track = track.as_ref().map(|t| t.title.as_str()).unwrap_or_default(),
                    reason = %reason,
                    "Playback failed"
                );
                self.stats.failed += 1;
                self.last_error = Some(PlayerError::Playback(reason));
                if self.apply(PlaybackEvent::SinkFailed) {
                    self.advance();
                }
            }
            SinkEvent::Disconnected => {
                if !self.sink.complete(play_id) {
                    return;
                }
                self.connection_lost(PlayerError::connection("voice connection lost"));
            }
            SinkEvent::NoListeners if self.sink.is_current(play_id) => {
                info!(room = self.room, "No listeners left, pausing");
                self.apply(PlaybackEvent::ListenersGone);
            }
            SinkEvent::ListenersReturned if self.sink.is_current(play_id) => {
                info!(room = self.room, "Listeners are back, resuming");
                self.apply(PlaybackEvent::ListenersReturned);
            }
            _ => debug!(room = self.room, play_id, "Stale sink event"),
        }
    }

    fn preload(&self) {
        if self.settings.preload_window == 0 || self.queue.is_empty() {
            return;
        }
        let upcoming = self.queue.upcoming(self.settings.preload_window);
        debug!(room = self.room, count = upcoming.len(), "Preloading");
        self.materializer.preload(upcoming);
    }
}
