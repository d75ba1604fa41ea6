//! YouTube Data API v3 client
//!
//! Used both as a catalog (video and playlist links) and as the search
//! provider that turns free text into a playable track.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::error::{CatalogError, Result};
use crate::models::{Playlist, Provider, Track};
use crate::paging::{collect_pages, Cursor, Page};
use crate::resolver::{CatalogProvider, SearchProvider};

/// Default YouTube Data API base URL
pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Maximum page size accepted by `playlistItems` and `videos`
pub const PAGE_SIZE: usize = 50;

/// Default timeout for API requests
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

const WATCH_BASE: &str = "https://www.youtube.com/watch?v=";
const PLAYLIST_BASE: &str = "https://www.youtube.com/playlist?list=";

/// Placeholder titles YouTube returns for entries that cannot be played
const UNAVAILABLE_TITLES: [&str; 2] = ["Deleted video", "Private video"];

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    default: Option<Thumbnail>,
    medium: Option<Thumbnail>,
    high: Option<Thumbnail>,
}

impl Thumbnails {
    fn best(self) -> Option<String> {
        self.high.or(self.medium).or(self.default).map(|t| t.url)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    channel_title: String,
    video_owner_channel_title: Option<String>,
    #[serde(default)]
    thumbnails: Thumbnails,
    resource_id: Option<ResourceId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Video {
    id: String,
    snippet: Snippet,
    content_details: Option<ContentDetails>,
}

impl Video {
    fn into_track(self) -> Track {
        let mut track = Track::new(
            self.snippet.title,
            self.snippet.channel_title,
            watch_url(&self.id),
            Provider::YouTube,
        );
        track.duration_secs = self
            .content_details
            .and_then(|d| d.duration)
            .and_then(|d| parse_iso8601_duration(&d));
        track.thumbnail = self.snippet.thumbnails.best();
        track
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: SearchId,
}

#[derive(Debug, Deserialize)]
struct PlaylistResource {
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    snippet: Snippet,
}

impl PlaylistItem {
    fn into_track(self) -> Option<Track> {
        let snippet = self.snippet;
        if UNAVAILABLE_TITLES.contains(&snippet.title.as_str()) {
            return None;
        }
        let id = snippet.resource_id.and_then(|r| r.video_id)?;
        let mut track = Track::new(
            snippet.title,
            snippet.video_owner_channel_title.unwrap_or(snippet.channel_title),
            watch_url(&id),
            Provider::YouTube,
        );
        track.thumbnail = snippet.thumbnails.best();
        Some(track)
    }
}

fn watch_url(id: &str) -> String {
    format!("{WATCH_BASE}{id}")
}

/// Parses an ISO-8601 duration such as `PT1H2M3S` into seconds
///
/// Returns `None` for malformed or out of range input and for `P0D`, which
/// YouTube uses for live streams.
pub fn parse_iso8601_duration(value: &str) -> Option<u64> {
    let rest = value.strip_prefix('P')?;
    let mut total = 0u64;
    let mut number = String::new();
    let mut in_time = false;

    for c in rest.chars() {
        match c {
            '0'..='9' => number.push(c),
            'T' => in_time = true,
            unit => {
                let n: u64 = number.parse().ok()?;
                number.clear();
                let factor = match (unit, in_time) {
                    ('W', false) => 7 * 86_400,
                    ('D', false) => 86_400,
                    ('H', true) => 3600,
                    ('M', true) => 60,
                    ('S', true) => 1,
                    _ => return None,
                };
                total = total.checked_add(n.checked_mul(factor)?)?;
            }
        }
    }

    if !number.is_empty() || total == 0 {
        return None;
    }
    Some(total)
}

fn is_youtube_host(url: &Url) -> bool {
    matches!(
        url.host_str(),
        Some("youtube.com" | "www.youtube.com" | "m.youtube.com" | "music.youtube.com" | "youtu.be")
    )
}

/// Video id of a watch, short, embed or youtu.be link
pub fn video_id(url: &Url) -> Option<String> {
    if url.host_str() == Some("youtu.be") {
        return url
            .path_segments()?
            .next()
            .filter(|s| !s.is_empty())
            .map(str::to_string);
    }

    if let Some((_, v)) = url.query_pairs().find(|(k, _)| k == "v") {
        return Some(v.into_owned()).filter(|v| !v.is_empty());
    }

    let mut segments = url.path_segments()?;
    match segments.next() {
        Some("shorts" | "embed" | "live") => segments.next().map(str::to_string),
        _ => None,
    }
}

/// Playlist id carried by the `list` query parameter
pub fn playlist_id(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == "list")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

/// YouTube Data API client
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    client: Client,
    api_base: String,
    api_key: String,
}

impl YouTubeClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::builder().api_key(api_key).build()
    }

    pub fn builder() -> YouTubeClientBuilder {
        YouTubeClientBuilder::default()
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str, query: &[(&str, String)]) -> Result<T> {
        let response = self
            .client
            .get(format!("{}/{}", self.api_base, endpoint))
            .query(query)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        Err(CatalogError::from_status_code(status.as_u16(), body))
    }

    /// Fetch full video resources, `PAGE_SIZE` ids per request
    pub async fn videos(&self, ids: &[String]) -> Result<Vec<Track>> {
        let mut tracks = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(PAGE_SIZE) {
            let response: ListResponse<Video> = self
                .get(
                    "videos",
                    &[
                        ("part", "snippet,contentDetails".to_string()),
                        ("id", chunk.join(",")),
                        ("maxResults", PAGE_SIZE.to_string()),
                    ],
                )
                .await?;
            tracks.extend(response.items.into_iter().map(Video::into_track));
        }
        Ok(tracks)
    }

    pub async fn get_video(&self, id: &str) -> Result<Track> {
        self.videos(&[id.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CatalogError::NotFound(format!("youtube video {id}")))
    }

    /// Fill missing durations from the `videos` endpoint
    async fn fill_durations(&self, tracks: &mut [Track]) -> Result<()> {
        let ids: Vec<String> = tracks
            .iter()
            .filter(|t| t.duration_secs.is_none())
            .filter_map(|t| Url::parse(&t.url).ok().and_then(|u| video_id(&u)))
            .collect();
        if ids.is_empty() {
            return Ok(());
        }

        let durations: HashMap<String, u64> = self
            .videos(&ids)
            .await?
            .into_iter()
            .filter_map(|t| t.duration_secs.map(|d| (t.url, d)))
            .collect();

        for track in tracks.iter_mut() {
            if let Some(d) = durations.get(&track.url) {
                track.duration_secs = Some(*d);
            }
        }
        Ok(())
    }

    /// Fetch a playlist and all its playable items
    pub async fn get_playlist(&self, id: &str) -> Result<Playlist> {
        let meta: ListResponse<PlaylistResource> = self
            .get("playlists", &[("part", "snippet".to_string()), ("id", id.to_string())])
            .await?;
        let meta = meta
            .items
            .into_iter()
            .next()
            .ok_or_else(|| CatalogError::NotFound(format!("youtube playlist {id}")))?;

        let items = collect_pages(PAGE_SIZE, Cursor::Token(None), |cursor| async move {
            let mut query = vec![
                ("part", "snippet".to_string()),
                ("playlistId", id.to_string()),
                ("maxResults", PAGE_SIZE.to_string()),
            ];
            if let Cursor::Token(Some(token)) = cursor {
                query.push(("pageToken", token));
            }

            let page: ListResponse<PlaylistItem> = self.get("playlistItems", &query).await?;
            Ok(Page {
                next: page.next_page_token.map(|t| Cursor::Token(Some(t))),
                items: page.items,
            })
        })
        .await?;

        let mut tracks: Vec<Track> = items.into_iter().filter_map(PlaylistItem::into_track).collect();
        if let Err(e) = self.fill_durations(&mut tracks).await {
            tracing::warn!(playlist = %id, error = %e, "Could not fetch playlist durations");
        }

        let mut playlist = Playlist::new(meta.snippet.title, format!("{PLAYLIST_BASE}{id}"), Provider::YouTube);
        playlist.description = Some(meta.snippet.description).filter(|d| !d.is_empty());
        playlist.thumbnail = meta.snippet.thumbnails.best();
        playlist.tracks = tracks;

        tracing::debug!(
            playlist = %playlist.title,
            tracks = playlist.tracks.len(),
            "Fetched YouTube playlist"
        );
        Ok(playlist)
    }

    /// Top search hit for a free-text query
    pub async fn search(&self, query: &str) -> Result<Option<Track>> {
        let response: ListResponse<SearchResult> = self
            .get(
                "search",
                &[
                    ("part", "snippet".to_string()),
                    ("type", "video".to_string()),
                    ("maxResults", "1".to_string()),
                    ("q", query.to_string()),
                ],
            )
            .await?;

        let Some(id) = response.items.into_iter().find_map(|r| r.id.video_id) else {
            return Ok(None);
        };

        match self.get_video(&id).await {
            Ok(track) => Ok(Some(track)),
            Err(CatalogError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl CatalogProvider for YouTubeClient {
    fn provider(&self) -> Provider {
        Provider::YouTube
    }

    fn owns(&self, url: &Url) -> bool {
        is_youtube_host(url)
    }

    async fn lookup_track(&self, url: &Url) -> Result<Track> {
        let id = video_id(url).ok_or_else(|| CatalogError::UnsupportedUrl(url.to_string()))?;
        self.get_video(&id).await
    }

    async fn lookup_playlist(&self, url: &Url) -> Result<Playlist> {
        let id = playlist_id(url).ok_or_else(|| CatalogError::UnsupportedUrl(url.to_string()))?;
        self.get_playlist(&id).await
    }
}

#[async_trait]
impl SearchProvider for YouTubeClient {
    fn provider(&self) -> Provider {
        Provider::YouTube
    }

    async fn search_top(&self, query: &str) -> Result<Option<Track>> {
        self.search(query).await
    }
}

/// Builder for configuring a [`YouTubeClient`]
#[derive(Debug)]
pub struct YouTubeClientBuilder {
    client: Option<Client>,
    api_base: String,
    api_key: String,
    timeout: Duration,
}

impl Default for YouTubeClientBuilder {
    fn default() -> Self {
        Self {
            client: None,
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: String::new(),
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl YouTubeClientBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn api_base(mut self, url: impl Into<String>) -> Self {
        self.api_base = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<YouTubeClient> {
        if self.api_key.is_empty() {
            return Err(CatalogError::Configuration(
                "YouTube API key is required".to_string(),
            ));
        }

        let client = match self.client {
            Some(client) => client,
            None => Client::builder().timeout(self.timeout).build()?,
        };

        Ok(YouTubeClient {
            client,
            api_base: self.api_base,
            api_key: self.api_key,
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
    fn test_parse_iso8601_duration() {
        assert_eq!(parse_iso8601_duration("PT4M13S"), Some(253));
        assert_eq!(parse_iso8601_duration("PT1H2M3S"), Some(3723));
        assert_eq!(parse_iso8601_duration("PT45S"), Some(45));
        assert_eq!(parse_iso8601_duration("P1DT1S"), Some(86_401));
        assert_eq!(parse_iso8601_duration("P0D"), None);
        assert_eq!(parse_iso8601_duration("4:13"), None);
        assert_eq!(parse_iso8601_duration("PT4M13"), None);
    }

    #[test]
    fn test_oversized_duration_is_rejected() {
        assert_eq!(parse_iso8601_duration("P3000000000000000W"), None);
        assert_eq!(parse_iso8601_duration("PT18446744073709551615H"), None);
        assert_eq!(parse_iso8601_duration("P1DT18446744073709551615S"), None);
        assert_eq!(parse_iso8601_duration("PT18446744073709551615S"), Some(u64::MAX));
    }

    #[test]
    fn test_video_id() {
        assert_eq!(
            video_id(&url("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42")),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(video_id(&url("https://youtu.be/dQw4w9WgXcQ")), Some("dQw4w9WgXcQ".to_string()));
        assert_eq!(
            video_id(&url("https://music.youtube.com/watch?v=dQw4w9WgXcQ&list=RDAMVM")),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            video_id(&url("https://www.youtube.com/shorts/abc123")),
            Some("abc123".to_string())
        );
        assert_eq!(video_id(&url("https://www.youtube.com/playlist?list=PL123")), None);
    }

    #[test]
    fn test_playlist_id() {
        assert_eq!(
            playlist_id(&url("https://www.youtube.com/playlist?list=PLx0sYbCqOb8TBPRdmBHs5Iftvv9TPboYG")),
            Some("PLx0sYbCqOb8TBPRdmBHs5Iftvv9TPboYG".to_string())
        );
        assert_eq!(playlist_id(&url("https://www.youtube.com/watch?v=abc")), None);
    }

    #[test]
    fn test_unavailable_items_are_skipped() {
        let json = r#"{"snippet": {"title": "Deleted video", "channelTitle": "x",
                      "resourceId": {"videoId": "gone"}}}"#;
        let item: PlaylistItem = serde_json::from_str(json).unwrap();
        assert!(item.into_track().is_none());
    }

    #[test]
    fn test_builder_requires_key() {
        assert!(matches!(
            YouTubeClient::builder().build(),
            Err(CatalogError::Configuration(_))
        ));
    }
}
