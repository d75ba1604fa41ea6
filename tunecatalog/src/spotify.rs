//! Spotify Web API client (client-credentials flow)
//!
//! Spotify is a reference-only catalog: the tracks it returns carry the
//! title and artist needed to find a playable source, not audio.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Mutex;
use url::Url;

use crate::error::{CatalogError, Result};
use crate::models::{Playlist, Provider, Track};
use crate::paging::{collect_pages, Cursor, Page};
use crate::resolver::CatalogProvider;

/// Default Spotify Web API base URL
pub const DEFAULT_API_BASE: &str = "https://api.spotify.com/v1";

/// Default Spotify accounts base URL (token endpoint is `{base}/token`)
pub const DEFAULT_AUTH_BASE: &str = "https://accounts.spotify.com/api";

/// Number of playlist items requested per page
pub const PLAYLIST_PAGE_SIZE: usize = 100;

/// Default timeout for API requests
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Tokens are renewed this long before Spotify says they expire
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

const OPEN_SPOTIFY_BASE: &str = "https://open.spotify.com";

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    refresh_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Image {
    url: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyAlbum {
    images: Option<Vec<Image>>,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    id: Option<String>,
    name: String,
    #[serde(default)]
    duration_ms: u64,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
    album: Option<SpotifyAlbum>,
    #[serde(default)]
    external_urls: ExternalUrls,
}

impl SpotifyTrack {
    /// Converts to a [`Track`]; items without any usable link are dropped
    fn into_track(self) -> Option<Track> {
        let url = self.external_urls.spotify.or_else(|| {
            self.id
                .as_ref()
                .map(|id| format!("{OPEN_SPOTIFY_BASE}/track/{id}"))
        })?;

        let artist = self
            .artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        let mut track =
            Track::new(self.name, artist, url, Provider::Spotify).with_duration(self.duration_ms / 1000);

        if let Some(image) = self
            .album
            .and_then(|a| a.images)
            .and_then(|images| images.into_iter().next())
        {
            track = track.with_thumbnail(image.url);
        }
        Some(track)
    }
}

#[derive(Debug, Deserialize)]
struct SpotifyPlaylist {
    name: String,
    description: Option<String>,
    images: Option<Vec<Image>>,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItemsPage {
    #[serde(default)]
    items: Vec<PlaylistItem>,
    next: Option<String>,
}

/// Extracts the id of a `track` or `playlist` from an open.spotify.com link
/// or a `spotify:kind:id` URI
pub fn spotify_id(url: &Url, kind: &str) -> Option<String> {
    if url.scheme() == "spotify" {
        let mut parts = url.path().split(':');
        return match (parts.next(), parts.next()) {
            (Some(k), Some(id)) if k == kind && !id.is_empty() => Some(id.to_string()),
            _ => None,
        };
    }

    // Localized links look like /intl-fr/track/{id}
    let mut segments = url.path_segments()?;
    segments.find(|s| *s == kind)?;
    segments
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Spotify catalog client
#[derive(Debug, Clone)]
pub struct SpotifyClient {
    client: Client,
    api_base: String,
    auth_base: String,
    client_id: String,
    client_secret: String,
    token: Arc<Mutex<Option<AccessToken>>>,
}

impl SpotifyClient {
    /// Create a client with default endpoints
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Result<Self> {
        Self::builder().credentials(client_id, client_secret).build()
    }

    pub fn builder() -> SpotifyClientBuilder {
        SpotifyClientBuilder::default()
    }

    /// Returns a valid bearer token, requesting a new one when needed
    async fn access_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        tracing::debug!("Requesting Spotify access token");
        let response = self
            .client
            .post(format!("{}/token", self.auth_base))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::from_status_code(status.as_u16(), body));
        }

        let token: TokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        *guard = Some(AccessToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });

        Ok(token.access_token)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let token = self.access_token().await?;
        let url = format!("{}/{}", self.api_base, path.trim_start_matches('/'));

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        if status.as_u16() == 401 {
            // Token revoked early: forget it so the next call asks again
            self.token.lock().await.take();
        }
        let body = response.text().await.unwrap_or_default();
        Err(CatalogError::from_status_code(status.as_u16(), body))
    }

    /// Fetch one track by id
    pub async fn get_track(&self, id: &str) -> Result<Track> {
        let track: SpotifyTrack = self.get(&format!("tracks/{id}"), &[]).await?;
        track
            .into_track()
            .ok_or_else(|| CatalogError::NotFound(format!("spotify track {id}")))
    }

    /// Fetch a playlist and every one of its tracks
    ///
    /// Items are requested `PLAYLIST_PAGE_SIZE` at a time. Local files and
    /// removed tracks have no `track` object and are skipped.
    pub async fn get_playlist(&self, id: &str) -> Result<Playlist> {
        let meta: SpotifyPlaylist = self
            .get(
                &format!("playlists/{id}"),
                &[("fields", "name,description,images,external_urls".to_string())],
            )
            .await?;

        let items_path = format!("playlists/{id}/tracks");
        let items = collect_pages(PLAYLIST_PAGE_SIZE, Cursor::Offset(0), |cursor| {
            let path = items_path.clone();
            async move {
                let offset = match cursor {
                    Cursor::Offset(offset) => offset,
                    Cursor::Token(_) => 0,
                };
                let page: PlaylistItemsPage = self
                    .get(
                        &path,
                        &[
                            ("offset", offset.to_string()),
                            ("limit", PLAYLIST_PAGE_SIZE.to_string()),
                        ],
                    )
                    .await?;

                Ok(Page {
                    next: page
                        .next
                        .as_ref()
                        .map(|_| Cursor::Offset(offset + PLAYLIST_PAGE_SIZE)),
                    items: page.items,
                })
            }
        })
        .await?;

        let url = meta
            .external_urls
            .spotify
            .unwrap_or_else(|| format!("{OPEN_SPOTIFY_BASE}/playlist/{id}"));

        let mut playlist = Playlist::new(meta.name, url, Provider::Spotify);
        playlist.description = meta.description.filter(|d| !d.is_empty());
        playlist.thumbnail = meta
            .images
            .and_then(|images| images.into_iter().next())
            .map(|i| i.url);
        playlist.tracks = items
            .into_iter()
            .filter_map(|item| item.track.and_then(SpotifyTrack::into_track))
            .collect();

        tracing::debug!(
            playlist = %playlist.title,
            tracks = playlist.tracks.len(),
            "Fetched Spotify playlist"
        );
        Ok(playlist)
    }
}

#[async_trait]
impl CatalogProvider for SpotifyClient {
    fn provider(&self) -> Provider {
        Provider::Spotify
    }

    fn owns(&self, url: &Url) -> bool {
        url.scheme() == "spotify"
            || matches!(url.host_str(), Some("open.spotify.com" | "play.spotify.com"))
    }

    async fn lookup_track(&self, url: &Url) -> Result<Track> {
        let id = spotify_id(url, "track")
            .ok_or_else(|| CatalogError::UnsupportedUrl(url.to_string()))?;
        self.get_track(&id).await
    }

    async fn lookup_playlist(&self, url: &Url) -> Result<Playlist> {
        let id = spotify_id(url, "playlist")
            .ok_or_else(|| CatalogError::UnsupportedUrl(url.to_string()))?;
        self.get_playlist(&id).await
    }
}

/// Builder for configuring a [`SpotifyClient`]
#[derive(Debug)]
pub struct SpotifyClientBuilder {
    client: Option<Client>,
    api_base: String,
    auth_base: String,
    client_id: String,
    client_secret: String,
    timeout: Duration,
}

impl Default for SpotifyClientBuilder {
    fn default() -> Self {
        Self {
            client: None,
            api_base: DEFAULT_API_BASE.to_string(),
            auth_base: DEFAULT_AUTH_BASE.to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl SpotifyClientBuilder {
    pub fn credentials(mut self, client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self.client_secret = client_secret.into();
        self
    }

    /// Set a custom HTTP client
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the Web API base URL
    pub fn api_base(mut self, url: impl Into<String>) -> Self {
        self.api_base = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the accounts base URL
    pub fn auth_base(mut self, url: impl Into<String>) -> Self {
        self.auth_base = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<SpotifyClient> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(CatalogError::Configuration(
                "Spotify client id and secret are required".to_string(),
            ));
        }

        let client = match self.client {
            Some(client) => client,
            None => Client::builder().timeout(self.timeout).build()?,
        };

        Ok(SpotifyClient {
            client,
            api_base: self.api_base,
            auth_base: self.auth_base,
            client_id: self.client_id,
            client_secret: self.client_secret,
            token: Arc::new(Mutex::new(None)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_spotify_id() {
        assert_eq!(
            spotify_id(&url("https://open.spotify.com/track/4u7EnebtmKWzUH433cf5Qv?si=abc"), "track"),
            Some("4u7EnebtmKWzUH433cf5Qv".to_string())
        );
        assert_eq!(
            spotify_id(&url("https://open.spotify.com/intl-fr/playlist/37i9dQZF1DXcBWIGoYBM5M"), "playlist"),
            Some("37i9dQZF1DXcBWIGoYBM5M".to_string())
        );
        assert_eq!(
            spotify_id(&url("spotify:track:4u7EnebtmKWzUH433cf5Qv"), "track"),
            Some("4u7EnebtmKWzUH433cf5Qv".to_string())
        );
        assert_eq!(
            spotify_id(&url("https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M"), "track"),
            None
        );
    }

    #[test]
    fn test_builder_requires_credentials() {
        assert!(matches!(
            SpotifyClient::builder().build(),
            Err(CatalogError::Configuration(_))
        ));
        assert!(SpotifyClient::new("id", "secret").is_ok());
    }

    #[test]
    fn test_track_conversion() {
        let json = r#"{
            "id": "4u7EnebtmKWzUH433cf5Qv",
            "name": "Bohemian Rhapsody",
            "duration_ms": 354320,
            "artists": [{"name": "Queen"}, {"name": "Freddie Mercury"}],
            "album": {"images": [{"url": "https://i.scdn.co/image/big"}, {"url": "https://i.scdn.co/image/small"}]},
            "external_urls": {}
        }"#;
        let track = serde_json::from_str::<SpotifyTrack>(json)
            .unwrap()
            .into_track()
            .unwrap();

        assert_eq!(track.artist, "Queen, Freddie Mercury");
        assert_eq!(track.duration_secs, Some(354));
        assert_eq!(track.url, "https://open.spotify.com/track/4u7EnebtmKWzUH433cf5Qv");
        assert_eq!(track.thumbnail.as_deref(), Some("https://i.scdn.co/image/big"));
        assert_eq!(track.provider, Provider::Spotify);
    }
}
