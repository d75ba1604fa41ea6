//! Playback state machine of a room
//!
//! [`PlaybackState::on`] is the only transition function. The room worker
//! feeds it every event and runs an advance whenever the returned
//! [`Transition`] asks for one.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PauseReason {
    /// Nobody is left listening on the voice channel
    AutoPaused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum PlaybackState {
    #[default]
    Idle,
    /// The head of the queue is being materialized
    Buffering,
    Playing,
    Paused(PauseReason),
    /// Transient: the failed track has been dropped and the queue advances
    Error,
}

impl PlaybackState {
    pub fn is_idle(&self) -> bool {
        matches!(self, PlaybackState::Idle)
    }

    /// Playing or auto-paused: a track is bound to the sink
    pub fn has_track(&self) -> bool {
        matches!(self, PlaybackState::Playing | PlaybackState::Paused(_))
    }

    pub fn on(self, event: PlaybackEvent) -> Transition {
        use PlaybackEvent as E;
        use PlaybackState as S;

        match (self, event) {
            (S::Idle | S::Error, E::AdvanceStarted) => Transition::to(S::Buffering),
            (S::Buffering, E::AdvanceSucceeded) => Transition::to(S::Playing),
            (S::Buffering, E::AdvanceFailed) => Transition::to(S::Error).then_advance(),

            (S::Idle | S::Error | S::Buffering, E::QueueExhausted) => Transition::to(S::Idle),
            (_, E::NoConnection) => Transition::to(S::Idle),

            (S::Playing | S::Paused(_), E::SinkFinished) => Transition::to(S::Idle).then_advance(),
            (S::Playing | S::Paused(_), E::SinkFailed) => Transition::to(S::Error).then_advance(),

            (S::Playing, E::ListenersGone) => Transition::to(S::Paused(PauseReason::AutoPaused)),
            (S::Paused(PauseReason::AutoPaused), E::ListenersReturned) => Transition::to(S::Playing),

            (_, E::Stopped) => Transition::to(S::Idle),

            (state, _) => Transition::ignored(state),
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Idle => f.write_str("idle"),
            PlaybackState::Buffering => f.write_str("buffering"),
            PlaybackState::Playing => f.write_str("playing"),
            PlaybackState::Paused(PauseReason::AutoPaused) => f.write_str("paused (no listeners)"),
            PlaybackState::Error => f.write_str("error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// The queue has a head and the room has a connection
    AdvanceStarted,
    /// The head produced a playable resource and the sink took it
    AdvanceSucceeded,
    /// Materialization or resource creation failed for the head
    AdvanceFailed,
    QueueExhausted,
    /// No usable voice connection; the queue is kept
    NoConnection,
    SinkFinished,
    SinkFailed,
    ListenersGone,
    ListenersReturned,
    Stopped,
}

/// Result of feeding an event to a state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub state: PlaybackState,
    /// The dispatcher must advance the queue next
    pub advance: bool,
    /// False when the event does not apply to the current state
    pub accepted: bool,
}

impl Transition {
    fn to(state: PlaybackState) -> Self {
        Self {
            state,
            advance: false,
            accepted: true,
        }
    }

    fn ignored(state: PlaybackState) -> Self {
        Self {
            state,
            advance: false,
            accepted: false,
        }
    }

    fn then_advance(mut self) -> Self {
        self.advance = true;
        self
    }
}

/// Counters kept by each room
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoomStats {
    /// Tracks handed to the sink
    pub played: u64,
    /// Tracks dropped after a failed play attempt
    pub failed: u64,
    /// Transitions into [`PlaybackState::Error`]
    pub errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use PlaybackEvent as E;
    use PlaybackState as S;

    #[test]
    fn test_happy_path() {
        let t = S::Idle.on(E::AdvanceStarted);
        assert_eq!(t.state, S::Buffering);
        let t = t.state.on(E::AdvanceSucceeded);
        assert_eq!(t.state, S::Playing);
        let t = t.state.on(E::SinkFinished);
        assert_eq!(t.state, S::Idle);
        assert!(t.advance);
    }

    #[test]
    fn test_failure_goes_through_error_and_advances() {
        let t = S::Buffering.on(E::AdvanceFailed);
        assert_eq!(t, Transition { state: S::Error, advance: true, accepted: true });
        assert_eq!(t.state.on(E::AdvanceStarted).state, S::Buffering);
        assert_eq!(t.state.on(E::QueueExhausted).state, S::Idle);
        assert_eq!(S::Playing.on(E::SinkFailed).state, S::Error);
    }

    #[test]
    fn test_auto_pause() {
        let paused = S::Playing.on(E::ListenersGone).state;
        assert_eq!(paused, S::Paused(PauseReason::AutoPaused));
        assert!(paused.has_track());
        assert_eq!(paused.on(E::ListenersReturned).state, S::Playing);
        assert!(paused.on(E::SinkFinished).advance);
    }

    #[test]
    fn test_out_of_place_events_are_ignored() {
        let t = S::Idle.on(E::SinkFinished);
        assert!(!t.accepted);
        assert_eq!(t.state, S::Idle);
        assert!(!S::Buffering.on(E::ListenersGone).accepted);
        assert!(!S::Playing.on(E::AdvanceStarted).accepted);
    }

    #[test]
    fn test_lost_connection_keeps_waiting() {
        let t = S::Playing.on(E::NoConnection);
        assert_eq!(t, Transition { state: S::Idle, advance: false, accepted: true });
        assert_eq!(S::Paused(PauseReason::AutoPaused).on(E::NoConnection).state, S::Idle);
        assert!(!S::Buffering.on(E::NoConnection).advance);
    }

    #[test]
    fn test_stop_from_anywhere() {
        for state in [S::Idle, S::Buffering, S::Playing, S::Paused(PauseReason::AutoPaused), S::Error] {
            assert_eq!(state.on(E::Stopped).state, S::Idle);
        }
    }
}
