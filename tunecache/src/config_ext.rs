//! Extension pour intégrer le cache audio dans tuneconfig
//!
//! ```rust,ignore
//! use tuneconfig::get_config;
//! use tunecache::AudioCacheConfigExt;
//!
//! let cache = get_config().create_audio_cache()?;
//! cache.sweep()?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tuneconfig::{impl_string_config, impl_u64_config, Config};

use crate::cache::{AudioCache, DEFAULT_EXTENSION, DEFAULT_TTL};
use crate::ytdlp::{YtDlpFetcher, DEFAULT_PROGRAM};

const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 600;

/// Trait d'extension pour ajouter la gestion du cache audio à tuneconfig
pub trait AudioCacheConfigExt {
    /// Répertoire du cache (absolu, créé si besoin)
    fn get_audio_cache_dir(&self) -> Result<std::path::PathBuf>;

    fn get_audio_cache_ttl_secs(&self) -> Result<u64>;
    fn set_audio_cache_ttl_secs(&self, secs: u64) -> Result<()>;

    fn get_audio_cache_sweep_interval_secs(&self) -> Result<u64>;
    fn set_audio_cache_sweep_interval_secs(&self, secs: u64) -> Result<()>;

    fn get_audio_cache_extension(&self) -> Result<String>;
    fn set_audio_cache_extension(&self, extension: String) -> Result<()>;

    fn get_ytdlp_path(&self) -> Result<String>;
    fn set_ytdlp_path(&self, program: String) -> Result<()>;

    /// Crée le cache audio configuré avec le fetcher yt-dlp
    fn create_audio_cache(&self) -> Result<Arc<AudioCache>>;

    /// Intervalle de la purge périodique
    fn audio_cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(
            self.get_audio_cache_sweep_interval_secs()
                .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
        )
    }
}

impl AudioCacheConfigExt for Config {
    fn get_audio_cache_dir(&self) -> Result<std::path::PathBuf> {
        self.get_managed_dir(&["host", "audio_cache", "directory"], "cache_audio")
    }

    impl_u64_config!(
        get_audio_cache_ttl_secs,
        set_audio_cache_ttl_secs,
        &["host", "audio_cache", "ttl_secs"],
        DEFAULT_TTL.as_secs()
    );

    impl_u64_config!(
        get_audio_cache_sweep_interval_secs,
        set_audio_cache_sweep_interval_secs,
        &["host", "audio_cache", "sweep_interval_secs"],
        DEFAULT_SWEEP_INTERVAL_SECS
    );

    impl_string_config!(
        get_audio_cache_extension,
        set_audio_cache_extension,
        &["host", "audio_cache", "extension"],
        DEFAULT_EXTENSION
    );

    impl_string_config!(
        get_ytdlp_path,
        set_ytdlp_path,
        &["host", "audio_cache", "ytdlp_path"],
        DEFAULT_PROGRAM
    );

    fn create_audio_cache(&self) -> Result<Arc<AudioCache>> {
        let fetcher = Arc::new(YtDlpFetcher::new(self.get_ytdlp_path()?));
        let cache = AudioCache::new(self.get_audio_cache_dir()?, fetcher)?
            .with_extension(&self.get_audio_cache_extension()?)
            .with_ttl(Duration::from_secs(self.get_audio_cache_ttl_secs()?));

        tracing::info!(
            dir = %cache.cache_dir().display(),
            ttl_secs = cache.ttl().as_secs(),
            "Audio cache ready"
        );
        Ok(Arc::new(cache))
    }
}
