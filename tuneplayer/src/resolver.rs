use async_trait::async_trait;
use tunecatalog::{Playlist, Resolver, Track};

/// What the player needs from the metadata layer
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Option<Track>;

    async fn resolve_playlist(&self, url: &str) -> Option<Playlist>;

    /// URL the audio cache can fetch for `track`
    async fn playable_url(&self, track: &Track) -> tunecatalog::Result<String>;

    fn is_playlist_query(&self, query: &str) -> bool {
        Resolver::is_playlist_query(query)
    }
}

#[async_trait]
impl TrackResolver for Resolver {
    async fn resolve(&self, query: &str) -> Option<Track> {
        Resolver::resolve(self, query).await
    }

    async fn resolve_playlist(&self, url: &str) -> Option<Playlist> {
        Resolver::resolve_playlist(self, url).await
    }

    async fn playable_url(&self, track: &Track) -> tunecatalog::Result<String> {
        Resolver::playable_url(self, track).await
    }
}
