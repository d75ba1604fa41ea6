// logs.rs
use tracing::Level;
use tracing_subscriber::{
    filter::LevelFilter, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry,
};
use tuneconfig::Config;

pub type LevelHandle = reload::Handle<LevelFilter, Registry>;

/// Installe le subscriber global
///
/// Le niveau vient de `host.logger.min_level`, la sortie console de
/// `host.logger.enable_console`. `RUST_LOG`, s'il est défini, filtre en plus
/// par cible. Le handle retourné permet de changer le niveau à chaud.
pub fn init_logging(config: &Config) -> LevelHandle {
    let level = config
        .get_log_min_level()
        .ok()
        .and_then(|l| string_to_level(&l))
        .map(LevelFilter::from_level)
        .unwrap_or(LevelFilter::INFO);

    let (filter, handle) = reload::Layer::new(level);
    let subscriber = Registry::default()
        .with(filter)
        .with(EnvFilter::try_from_default_env().ok());

    let enable_console = config.get_log_enable_console().unwrap_or(true);
    if enable_console {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true),
            )
            .init();
    } else {
        subscriber.init();
    }

    handle
}

/// Change le niveau courant et le sauvegarde dans la configuration
pub fn set_level(handle: &LevelHandle, config: &Config, level: &str) -> anyhow::Result<Level> {
    let parsed = string_to_level(level)
        .ok_or_else(|| anyhow::anyhow!("unknown log level {level}"))?;
    handle.modify(|filter| *filter = LevelFilter::from_level(parsed))?;
    config.set_log_min_level(parsed.to_string())?;
    Ok(parsed)
}

fn string_to_level(s: &str) -> Option<Level> {
    match s.trim().to_uppercase().as_str() {
        "ERROR" => Some(Level::ERROR),
        "WARN" => Some(Level::WARN),
        "INFO" => Some(Level::INFO),
        "DEBUG" => Some(Level::DEBUG),
        "TRACE" => Some(Level::TRACE),
        _ => None,
    }
}
