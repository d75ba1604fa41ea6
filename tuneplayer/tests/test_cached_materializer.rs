//! Rooms playing through the real download cache

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use tempfile::TempDir;
use tunecache::{AudioCache, AudioFetcher, AudioFormat, ByteStream};
use tunecatalog::{CatalogError, Playlist, Provider, Track};
use tuneplayer::{
    CachedMaterializer, Jukebox, LoopbackGateway, Materializer, PlaybackState, PlayerError,
    PlayerSettings, TrackResolver,
};

struct StaticFetcher {
    opened: AtomicUsize,
}

#[async_trait]
impl AudioFetcher for StaticFetcher {
    async fn formats(&self, url: &str) -> tunecache::Result<Vec<AudioFormat>> {
        Ok(vec![AudioFormat {
            format_id: "251".into(),
            url: format!("{url}#audio"),
            acodec: Some("opus".into()),
            vcodec: Some("none".into()),
            abr: Some(160.0),
            ..Default::default()
        }])
    }

    async fn open(&self, _format: &AudioFormat) -> tunecache::Result<ByteStream> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(stream::iter(vec![Ok(Bytes::from_static(b"OggS"))]).boxed())
    }
}

/// Spotify tracks map to a YouTube video of the same title, except `obscure`
struct SearchingResolver;

#[async_trait]
impl TrackResolver for SearchingResolver {
    async fn resolve(&self, query: &str) -> Option<Track> {
        Some(spotify(query))
    }

    async fn resolve_playlist(&self, _url: &str) -> Option<Playlist> {
        None
    }

    async fn playable_url(&self, track: &Track) -> tunecatalog::Result<String> {
        if track.is_directly_playable() {
            return Ok(track.url.clone());
        }
        if track.title == "obscure" {
            return Err(CatalogError::NotFound(track.search_query()));
        }
        Ok(youtube_url(&track.title))
    }
}

fn spotify(title: &str) -> Track {
    Track::new(title, "Artist", format!("https://open.spotify.com/track/{title}"), Provider::Spotify)
}

fn youtube_url(title: &str) -> String {
    format!("https://www.youtube.com/watch?v={title}")
}

fn setup() -> (Arc<AudioCache>, Arc<StaticFetcher>, CachedMaterializer, TempDir) {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(StaticFetcher {
        opened: AtomicUsize::new(0),
    });
    let cache = Arc::new(AudioCache::new(dir.path(), fetcher.clone()).unwrap());
    let materializer = CachedMaterializer::new(Arc::new(SearchingResolver), cache.clone());
    (cache, fetcher, materializer, dir)
}

#[tokio::test]
async fn test_materialize_reresolves_reference_tracks() {
    let (cache, fetcher, materializer, _dir) = setup();

    let path = materializer.materialize(&spotify("hit")).await.unwrap();

    assert_eq!(path, cache.path_for_url(&youtube_url("hit")));
    assert_eq!(std::fs::read(&path).unwrap(), b"OggS");
    assert!(cache.contains(&youtube_url("hit")));

    materializer.materialize(&spotify("hit")).await.unwrap();
    assert_eq!(fetcher.opened.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_source_is_a_playback_error() {
    let (_cache, fetcher, materializer, _dir) = setup();

    let err = materializer.materialize(&spotify("obscure")).await.unwrap_err();

    assert!(matches!(err, PlayerError::Playback(_)));
    assert!(err.is_recoverable());
    assert_eq!(fetcher.opened.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_preload_fills_the_cache() {
    let (cache, _fetcher, materializer, _dir) = setup();

    materializer.preload(vec![spotify("a"), spotify("obscure"), spotify("b")]);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !(cache.contains(&youtube_url("a")) && cache.contains(&youtube_url("b"))) {
        assert!(tokio::time::Instant::now() < deadline, "preload did not complete");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_jukebox_plays_from_cache() {
    let (cache, _fetcher, materializer, _dir) = setup();
    let gateway = Arc::new(LoopbackGateway::new().with_playback_length(Duration::from_secs(60)));
    let jukebox = Jukebox::new(
        Arc::new(SearchingResolver),
        Arc::new(materializer),
        gateway.clone(),
        PlayerSettings::default(),
    );

    jukebox.play(5, 50, "obscure").await.unwrap();
    jukebox.play(5, 50, "hit").await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    let snapshot = loop {
        let snapshot = jukebox.queue(5).await.unwrap();
        if snapshot.state == PlaybackState::Playing {
            break snapshot;
        }
        assert!(tokio::time::Instant::now() < deadline, "never started: {snapshot:?}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    };

    assert_eq!(snapshot.now_playing.map(|t| t.title), Some("hit".to_string()));
    assert_eq!(snapshot.stats.errors, 1);
    assert!(cache.contains(&youtube_url("hit")));
    assert_eq!(gateway.connection(5).unwrap().transmitted(), ["hit"]);
}
