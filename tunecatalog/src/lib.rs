//! # tunecatalog - Track metadata resolution
//!
//! Turns a user query (free text, Spotify link, YouTube link) into a
//! [`Track`], and playlist links into a [`Playlist`] with every page
//! fetched.
//!
//! ## Providers
//!
//! - [`SpotifyClient`]: reference-only catalog (client-credentials flow)
//! - [`YouTubeClient`]: catalog for YouTube links and search provider
//!
//! Spotify tracks carry no audio: [`Resolver::playable_url`] re-resolves
//! them through search before download, following a
//! [`ReResolvePolicy`].
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tunecatalog::{Resolver, SpotifyClient, YouTubeClient};
//!
//! #[tokio::main]
//! async fn main() -> tunecatalog::Result<()> {
//!     let youtube = Arc::new(YouTubeClient::new("api-key")?);
//!     let resolver = Resolver::builder()
//!         .catalog(Arc::new(SpotifyClient::new("id", "secret")?))
//!         .catalog(youtube.clone())
//!         .search(youtube)
//!         .build();
//!
//!     if let Some(track) = resolver.resolve("daft punk around the world").await {
//!         println!("{track}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod memo;
pub mod models;
pub mod paging;
pub mod resolver;
pub mod spotify;
pub mod youtube;

#[cfg(feature = "tuneconfig")]
pub mod config_ext;

pub use error::{CatalogError, Result};
pub use memo::CatalogMemo;
pub use models::{format_duration, Playlist, Provider, Track};
pub use paging::{collect_pages, Cursor, Page};
pub use resolver::{CatalogProvider, ReResolvePolicy, Resolver, ResolverBuilder, SearchProvider};
pub use spotify::SpotifyClient;
pub use youtube::YouTubeClient;

#[cfg(feature = "tuneconfig")]
pub use config_ext::CatalogConfigExt;
