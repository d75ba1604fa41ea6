//! Catalog settings on top of tuneconfig
//!
//! ```rust,ignore
//! use tuneconfig::get_config;
//! use tunecatalog::CatalogConfigExt;
//!
//! let resolver = get_config().create_resolver()?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tuneconfig::{impl_string_config, impl_u64_config, Config};

use crate::memo::{CatalogMemo, DEFAULT_PLAYLIST_TTL, DEFAULT_SEARCH_TTL, DEFAULT_TRACK_TTL};
use crate::resolver::{ReResolvePolicy, Resolver};
use crate::spotify::SpotifyClient;
use crate::youtube::YouTubeClient;

/// Extension trait adding catalog settings to [`Config`]
pub trait CatalogConfigExt {
    fn get_spotify_client_id(&self) -> Result<String>;
    fn set_spotify_client_id(&self, value: String) -> Result<()>;

    fn get_spotify_client_secret(&self) -> Result<String>;
    fn set_spotify_client_secret(&self, value: String) -> Result<()>;

    fn get_youtube_api_key(&self) -> Result<String>;
    fn set_youtube_api_key(&self, value: String) -> Result<()>;

    fn get_reresolve_policy_name(&self) -> Result<String>;
    fn set_reresolve_policy_name(&self, value: String) -> Result<()>;

    fn get_track_memo_ttl_secs(&self) -> Result<u64>;
    fn set_track_memo_ttl_secs(&self, secs: u64) -> Result<()>;

    fn get_playlist_memo_ttl_secs(&self) -> Result<u64>;
    fn set_playlist_memo_ttl_secs(&self, secs: u64) -> Result<()>;

    fn get_search_memo_ttl_secs(&self) -> Result<u64>;
    fn set_search_memo_ttl_secs(&self, secs: u64) -> Result<()>;

    /// Parsed re-resolve policy
    fn get_reresolve_policy(&self) -> Result<ReResolvePolicy> {
        Ok(self.get_reresolve_policy_name()?.parse()?)
    }

    /// Builds a resolver from the configured providers
    ///
    /// Providers whose credentials are empty are left out.
    fn create_resolver(&self) -> Result<Resolver>;
}

impl CatalogConfigExt for Config {
    impl_string_config!(
        get_spotify_client_id,
        set_spotify_client_id,
        &["catalog", "spotify", "client_id"],
        ""
    );

    impl_string_config!(
        get_spotify_client_secret,
        set_spotify_client_secret,
        &["catalog", "spotify", "client_secret"],
        ""
    );

    impl_string_config!(
        get_youtube_api_key,
        set_youtube_api_key,
        &["catalog", "youtube", "api_key"],
        ""
    );

    impl_string_config!(
        get_reresolve_policy_name,
        set_reresolve_policy_name,
        &["catalog", "reresolve_policy"],
        "strict"
    );

    impl_u64_config!(
        get_track_memo_ttl_secs,
        set_track_memo_ttl_secs,
        &["catalog", "memo", "track_ttl_secs"],
        DEFAULT_TRACK_TTL.as_secs()
    );

    impl_u64_config!(
        get_playlist_memo_ttl_secs,
        set_playlist_memo_ttl_secs,
        &["catalog", "memo", "playlist_ttl_secs"],
        DEFAULT_PLAYLIST_TTL.as_secs()
    );

    impl_u64_config!(
        get_search_memo_ttl_secs,
        set_search_memo_ttl_secs,
        &["catalog", "memo", "search_ttl_secs"],
        DEFAULT_SEARCH_TTL.as_secs()
    );

    fn create_resolver(&self) -> Result<Resolver> {
        let memo = CatalogMemo::new(
            Duration::from_secs(self.get_track_memo_ttl_secs()?),
            Duration::from_secs(self.get_playlist_memo_ttl_secs()?),
            Duration::from_secs(self.get_search_memo_ttl_secs()?),
        );
        let mut builder = Resolver::builder()
            .policy(self.get_reresolve_policy()?)
            .memo(memo);

        let client_id = self.get_spotify_client_id()?;
        let client_secret = self.get_spotify_client_secret()?;
        if client_id.is_empty() || client_secret.is_empty() {
            tracing::warn!("Spotify credentials not configured, Spotify links will be searched instead");
        } else {
            builder = builder.catalog(Arc::new(SpotifyClient::new(client_id, client_secret)?));
        }

        let api_key = self.get_youtube_api_key()?;
        if api_key.is_empty() {
            tracing::warn!("YouTube API key not configured, search is disabled");
        } else {
            let youtube = Arc::new(YouTubeClient::new(api_key)?);
            builder = builder.catalog(youtube.clone()).search(youtube);
        }

        let resolver = builder.build();
        tracing::info!(resolver = ?resolver, "Resolver ready");
        Ok(resolver)
    }
}
