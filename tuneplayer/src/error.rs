use thiserror::Error;

use crate::RoomId;

/// Errors reported by the playback core
///
/// The `Display` text is what the chat layer shows to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlayerError {
    #[error("Nothing to play: give a search query or a link")]
    EmptyQuery,

    /// No provider found anything for the query; the queue is untouched
    #[error("Nothing found for \"{0}\"")]
    Resolution(String),

    /// The audio could not be fetched; the track is dropped
    #[error("Download failed: {0}")]
    Download(String),

    /// Voice connection missing, refused or not ready in time; the queue is kept
    #[error("Voice connection error: {0}")]
    Connection(String),

    /// The audio resource could not be built or played; the track is dropped
    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Room {0} is closed")]
    RoomClosed(RoomId),
}

impl PlayerError {
    pub fn connection(message: impl Into<String>) -> Self {
        PlayerError::Connection(message.into())
    }

    pub fn playback(message: impl Into<String>) -> Self {
        PlayerError::Playback(message.into())
    }

    /// True when the queue moves on to the next track after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PlayerError::Download(_) | PlayerError::Playback(_))
    }
}

impl From<tunecache::CacheError> for PlayerError {
    fn from(err: tunecache::CacheError) -> Self {
        PlayerError::Download(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
