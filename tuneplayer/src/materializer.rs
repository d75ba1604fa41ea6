//! Turning a queued track into a local audio file

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use tunecache::AudioCache;
use tunecatalog::Track;

use crate::error::{PlayerError, Result};
use crate::resolver::TrackResolver;

#[async_trait]
pub trait Materializer: Send + Sync {
    /// Local path of the audio for `track`, downloading it if needed
    async fn materialize(&self, track: &Track) -> Result<PathBuf>;

    /// Warms the cache for upcoming tracks without waiting
    fn preload(&self, tracks: Vec<Track>);
}

/// Materializer backed by the resolver and the download cache
#[derive(Clone)]
pub struct CachedMaterializer {
    resolver: Arc<dyn TrackResolver>,
    cache: Arc<AudioCache>,
}

impl CachedMaterializer {
    pub fn new(resolver: Arc<dyn TrackResolver>, cache: Arc<AudioCache>) -> Self {
        Self { resolver, cache }
    }

    pub fn cache(&self) -> &Arc<AudioCache> {
        &self.cache
    }

    async fn source_url(&self, track: &Track) -> Result<String> {
        self.resolver
            .playable_url(track)
            .await
            .map_err(|e| PlayerError::playback(format!("no playable source for {}: {e}", track.title)))
    }
}

#[async_trait]
impl Materializer for CachedMaterializer {
    async fn materialize(&self, track: &Track) -> Result<PathBuf> {
        let url = self.source_url(track).await?;
        debug!(track = %track.title, url = %url, "Materializing");
        Ok(self.cache.materialize(&url).await?)
    }

    fn preload(&self, tracks: Vec<Track>) {
        let this = self.clone();
        tokio::spawn(async move {
            let mut urls = Vec::with_capacity(tracks.len());
            for track in &tracks {
                match this.source_url(track).await {
                    Ok(url) => urls.push(url),
                    Err(e) => warn!(track = %track.title, error = %e, "Skipping preload"),
                }
            }
            debug!(count = urls.len(), "Preloading upcoming tracks");
            this.cache.preload(urls);
        });
    }
}
