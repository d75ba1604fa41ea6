mod console;
mod logs;

use std::sync::Arc;

use tracing::{info, warn};
use tunecache::AudioCacheConfigExt;
use tunecatalog::CatalogConfigExt;
use tuneconfig::get_config;
use tuneplayer::{CachedMaterializer, Jukebox, LoopbackGateway, PlayerConfigExt};

use crate::console::Console;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ========== PHASE 1 : Configuration et logs ==========
    let config = get_config();
    let log_handle = logs::init_logging(&config);
    info!(dir = config.dir(), "Configuration loaded");

    // ========== PHASE 2 : Services ==========

    info!("Initializing audio cache...");
    let cache = config.create_audio_cache()?;
    match cache.sweep() {
        Ok(removed) => info!(removed, "Startup sweep done"),
        Err(e) => warn!(error = %e, "Startup sweep failed"),
    }
    let sweeper = cache.spawn_sweeper(config.audio_cache_sweep_interval());

    info!("Initializing resolver...");
    let resolver = Arc::new(config.create_resolver()?);

    let settings = config.player_settings();
    let materializer = Arc::new(CachedMaterializer::new(resolver.clone(), cache.clone()));
    // No chat gateway in this binary: rooms play into the loopback transport
    let jukebox = Jukebox::new(resolver, materializer, Arc::new(LoopbackGateway::new()), settings);
    info!(
        preload_window = settings.preload_window,
        connect_timeout_secs = settings.connect_timeout.as_secs(),
        volume = settings.volume,
        "Jukebox ready"
    );

    // ========== PHASE 3 : Console ==========

    info!("TuneBot is ready! Type help for commands, Ctrl+C to stop");
    let console = Console::new(&jukebox, &config, log_handle);
    tokio::select! {
        result = console.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Ctrl+C received"),
    }

    jukebox.shutdown().await;
    sweeper.abort();
    info!("TuneBot stopped");
    Ok(())
}
