//! In-memory TTL cache for resolved tracks, playlists and search hits

use crate::models::{Playlist, Track};
use moka::future::Cache as MokaCache;
use std::time::Duration;

/// Default lifetimes
pub const DEFAULT_TRACK_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_PLAYLIST_TTL: Duration = Duration::from_secs(1800);
pub const DEFAULT_SEARCH_TTL: Duration = Duration::from_secs(900);

const DEFAULT_CAPACITY: u64 = 1000;

/// Lookup results keyed by query or URL
#[derive(Clone)]
pub struct CatalogMemo {
    tracks: MokaCache<String, Track>,
    playlists: MokaCache<String, Playlist>,
    searches: MokaCache<String, Track>,
}

impl Default for CatalogMemo {
    fn default() -> Self {
        Self::new(DEFAULT_TRACK_TTL, DEFAULT_PLAYLIST_TTL, DEFAULT_SEARCH_TTL)
    }
}

impl CatalogMemo {
    pub fn new(track_ttl: Duration, playlist_ttl: Duration, search_ttl: Duration) -> Self {
        Self {
            tracks: MokaCache::builder()
                .max_capacity(DEFAULT_CAPACITY * 2)
                .time_to_live(track_ttl)
                .build(),
            playlists: MokaCache::builder()
                .max_capacity(DEFAULT_CAPACITY / 10)
                .time_to_live(playlist_ttl)
                .build(),
            searches: MokaCache::builder()
                .max_capacity(DEFAULT_CAPACITY)
                .time_to_live(search_ttl)
                .build(),
        }
    }

    pub async fn get_track(&self, url: &str) -> Option<Track> {
        self.tracks.get(url).await
    }

    pub async fn put_track(&self, url: &str, track: Track) {
        self.tracks.insert(url.to_string(), track).await;
    }

    pub async fn get_playlist(&self, url: &str) -> Option<Playlist> {
        self.playlists.get(url).await
    }

    pub async fn put_playlist(&self, url: &str, playlist: Playlist) {
        self.playlists.insert(url.to_string(), playlist).await;
    }

    /// Search hits are keyed case-insensitively
    pub async fn get_search(&self, query: &str) -> Option<Track> {
        self.searches.get(&query.to_lowercase()).await
    }

    pub async fn put_search(&self, query: &str, track: Track) {
        self.searches.insert(query.to_lowercase(), track).await;
    }

    pub fn invalidate_all(&self) {
        self.tracks.invalidate_all();
        self.playlists.invalidate_all();
        self.searches.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Provider;

    #[tokio::test]
    async fn test_search_keys_ignore_case() {
        let memo = CatalogMemo::default();
        let track = Track::new("Song", "Artist", "https://youtu.be/x", Provider::YouTube);

        memo.put_search("Daft Punk Around The World", track.clone()).await;

        assert_eq!(memo.get_search("daft punk around the world").await, Some(track));
        assert!(memo.get_track("https://youtu.be/x").await.is_none());
    }
}
