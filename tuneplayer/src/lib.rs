//! # tuneplayer
//!
//! Per-room playback for TuneBot: a queue of resolved tracks, a playback
//! state machine driven by one worker task per room, and the voice session
//! each room plays into.
//!
//! ## Pipeline
//!
//! ```text
//! query ──► TrackResolver ──► RoomQueue ──► Materializer ──► AudioSink ──► VoiceConnection
//!            (tunecatalog)                  (tunecache)
//! ```
//!
//! A track leaves its room queue only once a playable audio resource exists
//! for it, or once its play attempt failed. Failed tracks are dropped and the
//! queue moves on; a missing voice connection leaves the queue untouched.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tuneplayer::{CachedMaterializer, Jukebox, LoopbackGateway, PlayerSettings};
//!
//! let resolver = Arc::new(resolver);
//! let materializer = Arc::new(CachedMaterializer::new(resolver.clone(), cache));
//! let jukebox = Jukebox::new(resolver, materializer, Arc::new(LoopbackGateway::new()), PlayerSettings::default());
//!
//! let queued = jukebox.play(42, 7, "daft punk around the world").await?;
//! println!("{queued}");
//! ```

pub mod error;
pub mod jukebox;
pub mod loopback;
pub mod materializer;
pub mod queue;
pub mod resolver;
pub mod room;
pub mod session;
pub mod sink;
pub mod state;

#[cfg(feature = "tuneconfig")]
pub mod config_ext;

/// Identifier of a room (one guild)
pub type RoomId = u64;

/// Identifier of a voice channel
pub type ChannelId = u64;

pub use error::{PlayerError, Result};
pub use jukebox::{Enqueued, Jukebox, PlayerSettings};
pub use loopback::{LoopbackConnection, LoopbackGateway};
pub use materializer::{CachedMaterializer, Materializer};
pub use queue::{QueuedTrack, RoomQueue};
pub use resolver::TrackResolver;
pub use room::{QueueSnapshot, RoomHandle, RoomSettings};
pub use session::SessionManager;
pub use sink::{AudioResource, AudioSink, SinkEvent, SinkReporter, VoiceConnection, VoiceGateway};
pub use state::{PauseReason, PlaybackEvent, PlaybackState, RoomStats, Transition};

#[cfg(feature = "tuneconfig")]
pub use config_ext::PlayerConfigExt;
