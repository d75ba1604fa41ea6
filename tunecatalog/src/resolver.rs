//! Query → track resolution across catalogs and search providers

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::error::{CatalogError, Result};
use crate::memo::CatalogMemo;
use crate::models::{Playlist, Provider, Track};

/// A catalog that can look up tracks and playlists from its own links
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    fn provider(&self) -> Provider;

    /// Whether this catalog recognizes the URL
    fn owns(&self, url: &Url) -> bool;

    async fn lookup_track(&self, url: &Url) -> Result<Track>;

    async fn lookup_playlist(&self, url: &Url) -> Result<Playlist>;
}

/// A provider that can turn free text into its single best match
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn provider(&self) -> Provider;

    async fn search_top(&self, query: &str) -> Result<Option<Track>>;
}

/// How a reference-only track finds a playable source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReResolvePolicy {
    /// One search on the primary search provider; a miss is an error
    #[default]
    Strict,
    /// Try every search provider in order until one has a hit
    Fallback,
}

impl FromStr for ReResolvePolicy {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "fallback" => Ok(Self::Fallback),
            other => Err(CatalogError::Configuration(format!(
                "unknown re-resolve policy '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ReResolvePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Strict => "strict",
            Self::Fallback => "fallback",
        })
    }
}

/// Parses a query as a catalog link
///
/// Only `http(s)` and `spotify:` URIs count; anything else is free text.
fn parse_link(query: &str) -> Option<Url> {
    let url = Url::parse(query).ok()?;
    matches!(url.scheme(), "http" | "https" | "spotify").then_some(url)
}

/// Metadata resolver
///
/// Dispatches links to the catalog that owns them and sends everything
/// else to the primary search provider, keeping only the top hit.
pub struct Resolver {
    catalogs: Vec<Arc<dyn CatalogProvider>>,
    searchers: Vec<Arc<dyn SearchProvider>>,
    policy: ReResolvePolicy,
    memo: CatalogMemo,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field(
                "catalogs",
                &self.catalogs.iter().map(|c| c.provider()).collect::<Vec<_>>(),
            )
            .field(
                "searchers",
                &self.searchers.iter().map(|s| s.provider()).collect::<Vec<_>>(),
            )
            .field("policy", &self.policy)
            .finish()
    }
}

impl Resolver {
    pub fn builder() -> ResolverBuilder {
        ResolverBuilder::default()
    }

    pub fn policy(&self) -> ReResolvePolicy {
        self.policy
    }

    /// A query asks for a playlist when it carries a playlist path or a `list=` parameter
    pub fn is_playlist_query(query: &str) -> bool {
        query.contains("/playlist/") || query.contains("list=")
    }

    fn catalog_for(&self, url: &Url) -> Option<&Arc<dyn CatalogProvider>> {
        self.catalogs.iter().find(|c| c.owns(url))
    }

    /// Resolves a query to a single track
    ///
    /// Provider errors are logged and reported as `None`: the caller only
    /// needs to tell the user nothing was found.
    pub async fn resolve(&self, query: &str) -> Option<Track> {
        match self.try_resolve(query).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(query = %query, error = %e, "Track resolution failed");
                None
            }
        }
    }

    /// Same as [`resolve`](Self::resolve) but keeps the provider error
    pub async fn try_resolve(&self, query: &str) -> Result<Option<Track>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }

        if let Some(url) = parse_link(query) {
            if let Some(catalog) = self.catalog_for(&url) {
                if let Some(track) = self.memo.get_track(query).await {
                    return Ok(Some(track));
                }
                tracing::debug!(url = %url, provider = %catalog.provider(), "Looking up track link");
                let track = match catalog.lookup_track(&url).await {
                    Ok(track) => track,
                    Err(CatalogError::NotFound(_)) => return Ok(None),
                    Err(e) => return Err(e),
                };
                self.memo.put_track(query, track.clone()).await;
                return Ok(Some(track));
            }
            tracing::debug!(url = %url, "No catalog owns this link, searching for it");
        }

        self.search(query).await
    }

    /// Top hit of the primary search provider
    pub async fn search(&self, query: &str) -> Result<Option<Track>> {
        let searcher = self.searchers.first().ok_or_else(|| {
            CatalogError::Configuration("no search provider configured".to_string())
        })?;
        self.search_with(searcher.as_ref(), query).await
    }

    async fn search_with(&self, searcher: &dyn SearchProvider, query: &str) -> Result<Option<Track>> {
        if let Some(hit) = self.memo.get_search(query).await {
            if hit.provider == searcher.provider() {
                return Ok(Some(hit));
            }
        }

        let hit = searcher.search_top(query).await?;
        if let Some(track) = &hit {
            self.memo.put_search(query, track.clone()).await;
        }
        Ok(hit)
    }

    /// Resolves a playlist link to its full track list
    ///
    /// Returns `None` when the link is not a playlist any catalog knows,
    /// when a page fails, or when the playlist has no playable items.
    pub async fn resolve_playlist(&self, url: &str) -> Option<Playlist> {
        match self.try_resolve_playlist(url).await {
            Ok(playlist) if playlist.tracks.is_empty() => {
                tracing::info!(url = %url, "Playlist has no playable tracks");
                None
            }
            Ok(playlist) => Some(playlist),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Playlist resolution failed");
                None
            }
        }
    }

    pub async fn try_resolve_playlist(&self, url: &str) -> Result<Playlist> {
        let key = url.trim();
        let link = parse_link(key).ok_or_else(|| CatalogError::UnsupportedUrl(key.to_string()))?;
        let catalog = self
            .catalog_for(&link)
            .ok_or_else(|| CatalogError::UnsupportedUrl(key.to_string()))?;

        if let Some(playlist) = self.memo.get_playlist(key).await {
            return Ok(playlist);
        }

        let playlist = catalog.lookup_playlist(&link).await?;
        tracing::info!(
            playlist = %playlist.title,
            provider = %playlist.provider,
            tracks = playlist.tracks.len(),
            "Resolved playlist"
        );
        self.memo.put_playlist(key, playlist.clone()).await;
        Ok(playlist)
    }

    /// URL the audio cache can fetch for this track
    ///
    /// Directly playable tracks are returned as is. Reference-only tracks
    /// are searched by artist and title according to the re-resolve
    /// policy; a miss is an error, never a silent fallback to the catalog
    /// link.
    pub async fn playable_url(&self, track: &Track) -> Result<String> {
        if track.is_directly_playable() {
            return Ok(track.url.clone());
        }

        let query = track.search_query();
        let candidates: &[Arc<dyn SearchProvider>] = match self.policy {
            ReResolvePolicy::Strict => &self.searchers[..self.searchers.len().min(1)],
            ReResolvePolicy::Fallback => &self.searchers,
        };

        if candidates.is_empty() {
            return Err(CatalogError::Configuration(
                "no search provider configured".to_string(),
            ));
        }

        let mut last_error = None;
        for searcher in candidates {
            match self.search_with(searcher.as_ref(), &query).await {
                Ok(Some(hit)) if hit.is_directly_playable() => {
                    tracing::debug!(track = %track.title, source = %hit.url, "Re-resolved playable source");
                    return Ok(hit.url);
                }
                Ok(_) => {}
                Err(e) if self.policy == ReResolvePolicy::Fallback => {
                    tracing::warn!(provider = %searcher.provider(), error = %e, "Search failed, trying next provider");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            CatalogError::NotFound(format!("no playable source for '{query}'"))
        }))
    }
}

/// Builder for a [`Resolver`]
#[derive(Default)]
pub struct ResolverBuilder {
    catalogs: Vec<Arc<dyn CatalogProvider>>,
    searchers: Vec<Arc<dyn SearchProvider>>,
    policy: ReResolvePolicy,
    memo: Option<CatalogMemo>,
}

impl ResolverBuilder {
    /// Register a catalog; the first one owning a URL wins
    pub fn catalog(mut self, catalog: Arc<dyn CatalogProvider>) -> Self {
        self.catalogs.push(catalog);
        self
    }

    /// Register a search provider; the first one is the primary
    pub fn search(mut self, searcher: Arc<dyn SearchProvider>) -> Self {
        self.searchers.push(searcher);
        self
    }

    pub fn policy(mut self, policy: ReResolvePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn memo(mut self, memo: CatalogMemo) -> Self {
        self.memo = Some(memo);
        self
    }

    pub fn build(self) -> Resolver {
        Resolver {
            catalogs: self.catalogs,
            searchers: self.searchers,
            policy: self.policy,
            memo: self.memo.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeCatalog {
        host: &'static str,
        provider: Provider,
        lookups: AtomicUsize,
    }

    impl FakeCatalog {
        fn new(host: &'static str, provider: Provider) -> Arc<Self> {
            Arc::new(Self {
                host,
                provider,
                lookups: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl CatalogProvider for FakeCatalog {
        fn provider(&self) -> Provider {
            self.provider
        }

        fn owns(&self, url: &Url) -> bool {
            url.host_str() == Some(self.host)
        }

        async fn lookup_track(&self, url: &Url) -> Result<Track> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if url.path().contains("missing") {
                return Err(CatalogError::NotFound(url.to_string()));
            }
            if url.path().contains("broken") {
                return Err(CatalogError::from_status_code(500, "boom"));
            }
            Ok(Track::new("Catalog Song", "Catalog Artist", url.as_str(), self.provider))
        }

        async fn lookup_playlist(&self, url: &Url) -> Result<Playlist> {
            let mut playlist = Playlist::new("List", url.as_str(), self.provider);
            if !url.path().contains("empty") {
                playlist.tracks = vec![Track::new("a", "b", "https://x/1", self.provider)];
            }
            Ok(playlist)
        }
    }

    struct FakeSearch {
        provider: Provider,
        hit: Option<&'static str>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeSearch {
        fn new(provider: Provider, hit: Option<&'static str>, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                provider,
                hit,
                fail,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SearchProvider for FakeSearch {
        fn provider(&self) -> Provider {
            self.provider
        }

        async fn search_top(&self, query: &str) -> Result<Option<Track>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CatalogError::RateLimitExceeded);
            }
            Ok(self
                .hit
                .map(|url| Track::new(query, "Searcher", url, self.provider)))
        }
    }

    #[test]
    fn test_is_playlist_query() {
        assert!(Resolver::is_playlist_query("https://open.spotify.com/playlist/abc"));
        assert!(Resolver::is_playlist_query("https://www.youtube.com/watch?v=x&list=PL1"));
        assert!(!Resolver::is_playlist_query("https://open.spotify.com/track/abc"));
        assert!(!Resolver::is_playlist_query("lofi hip hop"));
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("Fallback".parse::<ReResolvePolicy>().unwrap(), ReResolvePolicy::Fallback);
        assert_eq!("strict".parse::<ReResolvePolicy>().unwrap(), ReResolvePolicy::Strict);
        assert!("random".parse::<ReResolvePolicy>().is_err());
    }

    #[tokio::test]
    async fn test_links_go_to_their_catalog() {
        let spotify = FakeCatalog::new("open.spotify.com", Provider::Spotify);
        let search = FakeSearch::new(Provider::YouTube, Some("https://youtu.be/hit"), false);
        let resolver = Resolver::builder()
            .catalog(spotify.clone())
            .search(search.clone())
            .build();

        let track = resolver
            .resolve("https://open.spotify.com/track/abc")
            .await
            .unwrap();

        assert_eq!(track.provider, Provider::Spotify);
        assert_eq!(spotify.lookups.load(Ordering::SeqCst), 1);
        assert_eq!(search.calls.load(Ordering::SeqCst), 0);

        // Second lookup comes from the memo
        resolver.resolve("https://open.spotify.com/track/abc").await.unwrap();
        assert_eq!(spotify.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_free_text_takes_the_top_hit() {
        let search = FakeSearch::new(Provider::YouTube, Some("https://youtu.be/hit"), false);
        let resolver = Resolver::builder().search(search.clone()).build();

        let track = resolver.resolve("  never gonna give you up ").await.unwrap();

        assert_eq!(track.url, "https://youtu.be/hit");
        assert_eq!(track.title, "never gonna give you up");
        assert!(resolver.resolve("   ").await.is_none());
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_links_fall_back_to_search() {
        let spotify = FakeCatalog::new("open.spotify.com", Provider::Spotify);
        let search = FakeSearch::new(Provider::YouTube, Some("https://youtu.be/hit"), false);
        let resolver = Resolver::builder().catalog(spotify).search(search.clone()).build();

        let track = resolver.resolve("https://soundcloud.com/artist/song").await;

        assert!(track.is_some());
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_errors_and_misses_become_none() {
        let spotify = FakeCatalog::new("open.spotify.com", Provider::Spotify);
        let resolver = Resolver::builder()
            .catalog(spotify)
            .search(FakeSearch::new(Provider::YouTube, None, false))
            .build();

        assert!(resolver.resolve("https://open.spotify.com/track/missing").await.is_none());
        assert!(resolver.resolve("https://open.spotify.com/track/broken").await.is_none());
        assert!(resolver.resolve("nothing matches this").await.is_none());
        assert!(resolver
            .try_resolve("https://open.spotify.com/track/broken")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_resolve_playlist() {
        let resolver = Resolver::builder()
            .catalog(FakeCatalog::new("open.spotify.com", Provider::Spotify))
            .build();

        let playlist = resolver
            .resolve_playlist("https://open.spotify.com/playlist/abc")
            .await
            .unwrap();
        assert_eq!(playlist.tracks.len(), 1);

        assert!(resolver
            .resolve_playlist("https://open.spotify.com/playlist/empty")
            .await
            .is_none());
        assert!(resolver
            .resolve_playlist("https://example.com/playlist/abc")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_playable_url_passthrough_and_reresolve() {
        let search = FakeSearch::new(Provider::YouTube, Some("https://youtu.be/hit"), false);
        let resolver = Resolver::builder().search(search.clone()).build();

        let direct = Track::new("t", "a", "https://youtu.be/direct", Provider::YouTube);
        assert_eq!(resolver.playable_url(&direct).await.unwrap(), "https://youtu.be/direct");
        assert_eq!(search.calls.load(Ordering::SeqCst), 0);

        let reference = Track::new("Song", "Band", "https://open.spotify.com/track/1", Provider::Spotify);
        assert_eq!(resolver.playable_url(&reference).await.unwrap(), "https://youtu.be/hit");
    }

    #[tokio::test]
    async fn test_strict_policy_surfaces_the_miss() {
        let resolver = Resolver::builder()
            .search(FakeSearch::new(Provider::YouTube, None, false))
            .search(FakeSearch::new(Provider::YouTube, Some("https://youtu.be/second"), false))
            .build();

        let reference = Track::new("Song", "Band", "https://open.spotify.com/track/1", Provider::Spotify);
        let err = resolver.playable_url(&reference).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_fallback_policy_tries_next_provider() {
        let failing = FakeSearch::new(Provider::YouTube, None, true);
        let second = FakeSearch::new(Provider::YouTube, Some("https://youtu.be/second"), false);
        let resolver = Resolver::builder()
            .policy(ReResolvePolicy::Fallback)
            .search(failing.clone())
            .search(second.clone())
            .build();

        let reference = Track::new("Song", "Band", "https://open.spotify.com/track/1", Provider::Spotify);
        assert_eq!(resolver.playable_url(&reference).await.unwrap(), "https://youtu.be/second");
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    }
}
