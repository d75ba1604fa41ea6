//! Data models shared by the catalog clients and the player

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Where a track's metadata comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Reference-only catalog: tracks must be re-resolved before playback
    Spotify,
    /// Directly streamable source
    YouTube,
}

impl Provider {
    pub fn name(&self) -> &'static str {
        match self {
            Provider::Spotify => "Spotify",
            Provider::YouTube => "YouTube",
        }
    }

    /// Whether a track URL from this provider can be handed to the audio cache as is
    pub fn is_directly_playable(&self) -> bool {
        matches!(self, Provider::YouTube)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A resolved track
///
/// Immutable once resolved; two tracks are the same track when their
/// canonical URLs are equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub title: String,
    pub artist: String,
    /// Duration in seconds, when the provider reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
    /// Canonical URL, also the track identity
    pub url: String,
    pub provider: Provider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

impl Track {
    pub fn new(
        title: impl Into<String>,
        artist: impl Into<String>,
        url: impl Into<String>,
        provider: Provider,
    ) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            duration_secs: None,
            url: url.into(),
            provider,
            thumbnail: None,
        }
    }

    pub fn with_duration(mut self, secs: u64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    pub fn with_thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail = Some(url.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.url
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_secs.map(Duration::from_secs)
    }

    /// Human readable duration (`3:07`, `1:02:03`), `--:--` when unknown
    pub fn duration_label(&self) -> String {
        self.duration_secs
            .map(format_duration)
            .unwrap_or_else(|| "--:--".to_string())
    }

    pub fn is_directly_playable(&self) -> bool {
        self.provider.is_directly_playable()
    }

    /// Free-text query used to find a playable source for this track
    pub fn search_query(&self) -> String {
        format!("{} {}", self.artist, self.title).trim().to_string()
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.artist.is_empty() {
            write!(f, "{} [{}]", self.title, self.duration_label())
        } else {
            write!(f, "{} - {} [{}]", self.title, self.artist, self.duration_label())
        }
    }
}

/// A playlist as returned by a catalog, or handed over by a playlist store
///
/// Catalog playlists leave `owner` and the timestamps empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub url: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    pub provider: Provider,
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Playlist {
    pub fn new(title: impl Into<String>, url: impl Into<String>, provider: Provider) -> Self {
        Self {
            title: title.into(),
            description: None,
            url: url.into(),
            thumbnail: None,
            provider,
            tracks: Vec::new(),
            owner: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Sum of the known track durations
    pub fn total_duration_secs(&self) -> u64 {
        self.tracks.iter().filter_map(|t| t.duration_secs).sum()
    }
}

/// Formats seconds as `m:ss`, or `h:mm:ss` past one hour
pub fn format_duration(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs / 60) % 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}
