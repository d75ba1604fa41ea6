//! Integration tests for tunecatalog against mocked Spotify and YouTube APIs

use std::sync::Arc;

use serde_json::json;
use tunecatalog::{CatalogError, Provider, Resolver, SpotifyClient, YouTubeClient};
use wiremock::matchers::{header_exists, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn spotify_track_json(i: usize) -> serde_json::Value {
    json!({
        "id": format!("track{i}"),
        "name": format!("Song {i}"),
        "duration_ms": 200_000 + i as u64,
        "artists": [{"name": "Artist"}],
        "album": {"images": [{"url": "https://i.scdn.co/image/cover"}]},
        "external_urls": {"spotify": format!("https://open.spotify.com/track/track{i}")}
    })
}

fn spotify_items_page(range: std::ops::Range<usize>, next: Option<&str>) -> serde_json::Value {
    json!({
        "items": range.map(|i| json!({"track": spotify_track_json(i)})).collect::<Vec<_>>(),
        "next": next,
    })
}

async fn mount_spotify_token(server: &MockServer, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "test-token",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(expected)
        .mount(server)
        .await;
}

fn spotify_client(server: &MockServer) -> SpotifyClient {
    SpotifyClient::builder()
        .credentials("client-id", "client-secret")
        .api_base(format!("{}/v1", server.uri()))
        .auth_base(server.uri())
        .build()
        .unwrap()
}

fn youtube_client(server: &MockServer) -> YouTubeClient {
    YouTubeClient::builder()
        .api_key("yt-key")
        .api_base(format!("{}/youtube/v3", server.uri()))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_spotify_playlist_150_items_in_two_pages() {
    let mock_server = MockServer::start().await;
    mount_spotify_token(&mock_server, 1).await;

    Mock::given(method("GET"))
        .and(path("/v1/playlists/PL150"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Road Trip",
            "description": "",
            "images": [{"url": "https://i.scdn.co/image/playlist"}],
            "external_urls": {"spotify": "https://open.spotify.com/playlist/PL150"}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/playlists/PL150/tracks"))
        .and(query_param("offset", "0"))
        .and(query_param("limit", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(spotify_items_page(
            0..100,
            Some("https://api.spotify.com/v1/playlists/PL150/tracks?offset=100&limit=100"),
        )))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/playlists/PL150/tracks"))
        .and(query_param("offset", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(spotify_items_page(100..150, None)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = spotify_client(&mock_server);
    let playlist = client.get_playlist("PL150").await.unwrap();

    assert_eq!(playlist.title, "Road Trip");
    assert_eq!(playlist.description, None);
    assert_eq!(playlist.tracks.len(), 150);
    assert_eq!(playlist.tracks[0].title, "Song 0");
    assert_eq!(playlist.tracks[149].title, "Song 149");
    assert!(playlist.tracks.iter().all(|t| t.provider == Provider::Spotify));
    // wiremock verifies the `expect(1)` counts when the server drops
}

#[tokio::test]
async fn test_spotify_skips_items_without_track() {
    let mock_server = MockServer::start().await;
    mount_spotify_token(&mock_server, 1).await;

    Mock::given(method("GET"))
        .and(path("/v1/playlists/LOCAL"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "With local files",
            "description": "Mixed",
            "images": null
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/playlists/LOCAL/tracks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"track": spotify_track_json(1)}, {"track": null}, {"track": spotify_track_json(2)}],
            "next": null
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let playlist = spotify_client(&mock_server).get_playlist("LOCAL").await.unwrap();

    assert_eq!(playlist.tracks.len(), 2);
    assert_eq!(playlist.url, "https://open.spotify.com/playlist/LOCAL");
    assert_eq!(playlist.description.as_deref(), Some("Mixed"));
    assert!(playlist.thumbnail.is_none());
}

#[tokio::test]
async fn test_spotify_unauthorized() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_client"))
        .mount(&mock_server)
        .await;

    let err = spotify_client(&mock_server).get_track("abc").await.unwrap_err();
    assert!(matches!(err, CatalogError::ApiError { code: 400, .. }));

    let mock_server = MockServer::start().await;
    mount_spotify_token(&mock_server, 1).await;
    Mock::given(method("GET"))
        .and(path("/v1/tracks/abc"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .mount(&mock_server)
        .await;

    let err = spotify_client(&mock_server).get_track("abc").await.unwrap_err();
    assert!(err.is_auth_error());
}

#[tokio::test]
async fn test_youtube_search_top_hit() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/youtube/v3/search"))
        .and(query_param("q", "rick astley never gonna"))
        .and(query_param("maxResults", "1"))
        .and(query_param("key", "yt-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": {"kind": "youtube#video", "videoId": "dQw4w9WgXcQ"}}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/youtube/v3/videos"))
        .and(query_param("id", "dQw4w9WgXcQ"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{
                "id": "dQw4w9WgXcQ",
                "snippet": {
                    "title": "Rick Astley - Never Gonna Give You Up",
                    "channelTitle": "Rick Astley",
                    "thumbnails": {"high": {"url": "https://i.ytimg.com/vi/dQw4w9WgXcQ/hq.jpg"}}
                },
                "contentDetails": {"duration": "PT3M33S"}
            }]
        })))
        .mount(&mock_server)
        .await;

    let track = youtube_client(&mock_server)
        .search("rick astley never gonna")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(track.url, "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
    assert_eq!(track.artist, "Rick Astley");
    assert_eq!(track.duration_secs, Some(213));
    assert_eq!(track.provider, Provider::YouTube);
}

#[tokio::test]
async fn test_youtube_search_without_results() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/youtube/v3/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .mount(&mock_server)
        .await;

    let hit = youtube_client(&mock_server).search("zzzz").await.unwrap();
    assert!(hit.is_none());
}

#[tokio::test]
async fn test_youtube_playlist_follows_page_tokens() {
    let mock_server = MockServer::start().await;

    let item = |i: usize| {
        json!({"snippet": {
            "title": format!("Video {i}"),
            "channelTitle": "Uploader",
            "videoOwnerChannelTitle": "Owner",
            "resourceId": {"kind": "youtube#video", "videoId": format!("vid{i}")}
        }})
    };

    Mock::given(method("GET"))
        .and(path("/youtube/v3/playlists"))
        .and(query_param("id", "PLmix"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"snippet": {"title": "Mix", "description": "Best of"}}]
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/youtube/v3/playlistItems"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": (0..50).map(item).collect::<Vec<_>>(),
            "nextPageToken": "PAGE2"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/youtube/v3/playlistItems"))
        .and(query_param("pageToken", "PAGE2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": (50..60).map(item).collect::<Vec<_>>()
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    // Duration lookups go out 50 ids at a time
    Mock::given(method("GET"))
        .and(path("/youtube/v3/videos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{
                "id": "vid0",
                "snippet": {"title": "Video 0", "channelTitle": "Owner"},
                "contentDetails": {"duration": "PT1M"}
            }]
        })))
        .expect(2)
        .mount(&mock_server)
        .await;

    let playlist = youtube_client(&mock_server).get_playlist("PLmix").await.unwrap();

    assert_eq!(playlist.title, "Mix");
    assert_eq!(playlist.url, "https://www.youtube.com/playlist?list=PLmix");
    assert_eq!(playlist.tracks.len(), 60);
    assert_eq!(playlist.tracks[0].artist, "Owner");
    assert_eq!(playlist.tracks[0].duration_secs, Some(60));
    assert_eq!(playlist.tracks[1].duration_secs, None);
    assert_eq!(playlist.tracks[59].title, "Video 59");
}

#[tokio::test]
async fn test_resolver_reresolves_spotify_tracks_through_search() {
    let mock_server = MockServer::start().await;
    mount_spotify_token(&mock_server, 1).await;

    Mock::given(method("GET"))
        .and(path("/v1/tracks/track7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(spotify_track_json(7)))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/youtube/v3/search"))
        .and(query_param("q", "Artist Song 7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": {"videoId": "yt7"}}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/youtube/v3/videos"))
        .and(query_param("id", "yt7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "yt7", "snippet": {"title": "Song 7 (Official)", "channelTitle": "Artist"}}]
        })))
        .mount(&mock_server)
        .await;

    let youtube = Arc::new(youtube_client(&mock_server));
    let resolver = Resolver::builder()
        .catalog(Arc::new(spotify_client(&mock_server)))
        .catalog(youtube.clone())
        .search(youtube)
        .build();

    let track = resolver
        .resolve("https://open.spotify.com/track/track7?si=share")
        .await
        .unwrap();
    assert_eq!(track.provider, Provider::Spotify);
    assert_eq!(track.title, "Song 7");

    let playable = resolver.playable_url(&track).await.unwrap();
    assert_eq!(playable, "https://www.youtube.com/watch?v=yt7");

    // The search hit is memoized
    assert_eq!(resolver.playable_url(&track).await.unwrap(), playable);
}
