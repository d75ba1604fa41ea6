//! In-process voice transport
//!
//! Simulates a voice channel: playback lasts as long as the track (or a fixed
//! length), pauses while nobody listens and reports the same events a real
//! transport would. Used by the dry-run binary and by tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{PlayerError, Result};
use crate::sink::{AudioResource, SinkEvent, SinkReporter, VoiceConnection, VoiceGateway};
use crate::{ChannelId, RoomId};

/// Length used for tracks whose duration is unknown
const UNKNOWN_TRACK_LENGTH: Duration = Duration::from_secs(180);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub struct LoopbackGateway {
    ready_delay: Duration,
    never_ready: bool,
    playback_length: Option<Duration>,
    joins: AtomicUsize,
    connections: Mutex<HashMap<RoomId, Arc<LoopbackConnection>>>,
}

impl LoopbackGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay before a new connection reports ready
    pub fn with_ready_delay(mut self, delay: Duration) -> Self {
        self.ready_delay = delay;
        self
    }

    /// Connections never become ready
    pub fn unreachable(mut self) -> Self {
        self.never_ready = true;
        self
    }

    /// Every track plays for `length` instead of its own duration
    pub fn with_playback_length(mut self, length: Duration) -> Self {
        self.playback_length = Some(length);
        self
    }

    /// Number of `join` calls so far
    pub fn joins(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }

    /// Last connection opened for `room`
    pub fn connection(&self, room: RoomId) -> Option<Arc<LoopbackConnection>> {
        lock(&self.connections).get(&room).cloned()
    }
}

#[async_trait]
impl VoiceGateway for LoopbackGateway {
    async fn join(&self, room: RoomId, channel: ChannelId) -> Result<Arc<dyn VoiceConnection>> {
        self.joins.fetch_add(1, Ordering::SeqCst);
        let connection = Arc::new(LoopbackConnection::new(
            channel,
            self.ready_delay,
            self.never_ready,
            self.playback_length,
        ));
        debug!(room, channel, connection = %connection.id, "Loopback join");
        lock(&self.connections).insert(room, Arc::clone(&connection));
        Ok(connection)
    }
}

pub struct LoopbackConnection {
    id: String,
    channel: ChannelId,
    ready_delay: Duration,
    never_ready: bool,
    playback_length: Option<Duration>,
    /// Cancelled on destroy; every playback token is a child of it
    closed: CancellationToken,
    listeners: watch::Sender<usize>,
    current: Mutex<Option<CancellationToken>>,
    transmitted: Mutex<Vec<String>>,
}

impl LoopbackConnection {
    fn new(
        channel: ChannelId,
        ready_delay: Duration,
        never_ready: bool,
        playback_length: Option<Duration>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            channel,
            ready_delay,
            never_ready,
            playback_length,
            closed: CancellationToken::new(),
            listeners: watch::Sender::new(1),
            current: Mutex::new(None),
            transmitted: Mutex::new(Vec::new()),
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Changes the number of listeners in the channel
    pub fn set_listeners(&self, count: usize) {
        self.listeners.send_replace(count);
    }

    /// Titles of every track transmitted on this connection
    pub fn transmitted(&self) -> Vec<String> {
        lock(&self.transmitted).clone()
    }

    /// Whether a playback is running
    pub fn is_playing(&self) -> bool {
        lock(&self.current)
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }
}

#[async_trait]
impl VoiceConnection for LoopbackConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn channel(&self) -> ChannelId {
        self.channel
    }

    async fn ready(&self) -> Result<()> {
        if self.never_ready {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(self.ready_delay).await;
        if self.is_destroyed() {
            return Err(PlayerError::connection("connection destroyed"));
        }
        Ok(())
    }

    fn transmit(&self, resource: AudioResource, reporter: SinkReporter) -> Result<()> {
        if self.is_destroyed() {
            return Err(PlayerError::connection("connection destroyed"));
        }

        let length = self
            .playback_length
            .or_else(|| resource.track().duration())
            .unwrap_or(UNKNOWN_TRACK_LENGTH);
        let token = self.closed.child_token();
        if let Some(previous) = lock(&self.current).replace(token.clone()) {
            previous.cancel();
        }
        lock(&self.transmitted).push(resource.track().title.clone());

        info!(
            connection = %self.id,
            track = %resource.track().title,
            bytes = resource.size(),
            volume = resource.volume(),
            "Loopback playback started"
        );
        tokio::spawn(play(
            length,
            token,
            self.closed.clone(),
            self.listeners.subscribe(),
            reporter,
        ));
        Ok(())
    }

    fn halt(&self) {
        if let Some(token) = lock(&self.current).take() {
            token.cancel();
        }
    }

    fn listeners(&self) -> usize {
        *self.listeners.borrow()
    }

    fn is_alive(&self) -> bool {
        !self.is_destroyed()
    }

    async fn destroy(&self) {
        if self.is_destroyed() {
            return;
        }
        self.closed.cancel();
        lock(&self.current).take();
        debug!(connection = %self.id, "Loopback connection destroyed");
    }
}

/// Runs one playback; time only passes while someone listens
async fn play(
    length: Duration,
    token: CancellationToken,
    closed: CancellationToken,
    mut listeners: watch::Receiver<usize>,
    reporter: SinkReporter,
) {
    let mut remaining = length;

    loop {
        if *listeners.borrow_and_update() == 0 {
            reporter.report(SinkEvent::NoListeners);
            let resumed = tokio::select! {
                _ = token.cancelled() => false,
                res = listeners.wait_for(|n| *n > 0) => res.is_ok(),
            };
            if !resumed {
                break;
            }
            reporter.report(SinkEvent::ListenersReturned);
        }

        let started = Instant::now();
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(remaining) => break,
            changed = listeners.changed() => {
                if changed.is_err() {
                    break;
                }
                remaining = remaining.saturating_sub(started.elapsed());
            }
        }
    }

    if closed.is_cancelled() {
        reporter.report(SinkEvent::Disconnected);
    } else {
        reporter.report(SinkEvent::Finished);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio::sync::mpsc;
    use tunecatalog::{Provider, Track};

    async fn resource(dir: &tempfile::TempDir) -> AudioResource {
        let path = dir.path().join("a.opus");
        std::fs::File::create(&path).unwrap().write_all(b"OggS").unwrap();
        let track = Track::new("Song", "Artist", "https://youtu.be/a", Provider::YouTube);
        AudioResource::from_file(path, track, 0.5).await.unwrap()
    }

    #[tokio::test]
    async fn test_playback_finishes_after_length() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = LoopbackGateway::new().with_playback_length(Duration::from_millis(50));
        let conn = gateway.join(1, 10).await.unwrap();
        conn.ready().await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        conn.transmit(resource(&dir).await, SinkReporter::new(7, tx)).unwrap();

        assert_eq!(rx.recv().await, Some((7, SinkEvent::Finished)));
        assert_eq!(gateway.connection(1).unwrap().transmitted(), ["Song"]);
    }

    #[tokio::test]
    async fn test_halt_reports_finished() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = LoopbackGateway::new();
        let conn = gateway.join(1, 10).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        conn.transmit(resource(&dir).await, SinkReporter::new(1, tx)).unwrap();
        conn.halt();

        assert_eq!(rx.recv().await, Some((1, SinkEvent::Finished)));
    }

    #[tokio::test]
    async fn test_pauses_without_listeners() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = LoopbackGateway::new().with_playback_length(Duration::from_secs(60));
        gateway.join(1, 10).await.unwrap();
        let loopback = gateway.connection(1).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        loopback.transmit(resource(&dir).await, SinkReporter::new(1, tx)).unwrap();

        loopback.set_listeners(0);
        assert_eq!(rx.recv().await, Some((1, SinkEvent::NoListeners)));
        loopback.set_listeners(2);
        assert_eq!(rx.recv().await, Some((1, SinkEvent::ListenersReturned)));
        assert!(loopback.is_playing());
    }

    #[tokio::test]
    async fn test_destroyed_connection_refuses_audio() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = LoopbackGateway::new();
        let conn = gateway.join(1, 10).await.unwrap();
        conn.destroy().await;

        let (tx, _rx) = mpsc::unbounded_channel();
        let result = conn.transmit(resource(&dir).await, SinkReporter::new(1, tx));
        assert!(matches!(result, Err(PlayerError::Connection(_))));
        assert!(conn.ready().await.is_err());
        assert!(!conn.is_alive());
    }

    #[tokio::test]
    async fn test_destroy_during_playback_reports_disconnect() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = LoopbackGateway::new().with_playback_length(Duration::from_secs(60));
        let conn = gateway.join(1, 10).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        conn.transmit(resource(&dir).await, SinkReporter::new(3, tx)).unwrap();
        conn.destroy().await;
        conn.destroy().await;

        assert_eq!(rx.recv().await, Some((3, SinkEvent::Disconnected)));
        assert!(!gateway.connection(1).unwrap().is_playing());
    }
}
