//! # tunecache - Cache audio sur disque pour TuneBot
//!
//! Cette crate transforme une URL de piste en un fichier audio local, en
//! garantissant qu'une même URL n'est jamais téléchargée deux fois en
//! parallèle.
//!
//! ## Vue d'ensemble
//!
//! - Clé stable par URL (`pk_from_url`, SHA1 de l'URL canonique)
//! - Fichiers stockés sous `{cache_dir}/{pk}.{extension}`
//! - Déduplication des téléchargements en cours (`Download` partagé)
//! - Index SQLite des entrées (source, hits, dernière utilisation)
//! - Purge périodique des fichiers plus vieux que le TTL (1h par défaut)
//! - Préchargement en tâche de fond des prochaines pistes
//!
//! ## Architecture
//!
//! ```text
//! tunecache
//!     ├── cache.rs    - AudioCache : materialize, sweep, preload
//!     ├── download.rs - Téléchargement en cours partagé entre appelants
//!     ├── fetcher.rs  - Trait AudioFetcher + choix du format audio
//!     ├── ytdlp.rs    - Fetcher par défaut (yt-dlp + reqwest)
//!     └── db.rs       - Index SQLite des entrées
//! ```
//!
//! ## Utilisation
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tunecache::{AudioCache, YtDlpFetcher};
//!
//! #[tokio::main]
//! async fn main() -> tunecache::Result<()> {
//!     let cache = Arc::new(AudioCache::new("./cache_audio", Arc::new(YtDlpFetcher::default()))?);
//!
//!     let path = cache.materialize("https://www.youtube.com/watch?v=dQw4w9WgXcQ").await?;
//!     println!("Fichier prêt: {}", path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Structure des fichiers
//!
//! ```text
//! cache_audio/
//! ├── cache.db                                      # Index SQLite
//! ├── 2fd4e1c67a2d28fced849ee1bb76e7391b93eb12.opus # Piste complète
//! └── 8d777f385d3dfec8815d20f7496026dc0a1b2c3d.opus.part # Téléchargement en cours
//! ```

pub mod cache;
pub mod db;
pub mod download;
pub mod error;
pub mod fetcher;
pub mod ytdlp;

#[cfg(feature = "tuneconfig")]
pub mod config_ext;

pub use cache::{pk_from_url, AudioCache, DEFAULT_EXTENSION, DEFAULT_TTL};
pub use db::{CacheEntry, DB};
pub use download::Download;
pub use error::{CacheError, Result};
pub use fetcher::{select_best_audio, AudioFetcher, AudioFormat, ByteStream};
pub use ytdlp::YtDlpFetcher;

#[cfg(feature = "tuneconfig")]
pub use config_ext::AudioCacheConfigExt;
