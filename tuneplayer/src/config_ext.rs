//! Player settings from tuneconfig
//!
//! ```rust,ignore
//! use tuneconfig::get_config;
//! use tuneplayer::PlayerConfigExt;
//!
//! let settings = get_config().player_settings();
//! ```

use std::time::Duration;

use anyhow::Result;
use tuneconfig::{impl_u64_config, Config};

use crate::jukebox::PlayerSettings;
use crate::room::{DEFAULT_PRELOAD_WINDOW, DEFAULT_VOLUME};
use crate::session::DEFAULT_CONNECT_TIMEOUT;

pub trait PlayerConfigExt {
    fn get_preload_window(&self) -> Result<u64>;
    fn set_preload_window(&self, count: u64) -> Result<()>;

    fn get_connect_timeout_secs(&self) -> Result<u64>;
    fn set_connect_timeout_secs(&self, secs: u64) -> Result<()>;

    fn get_player_volume(&self) -> f64;
    fn set_player_volume(&self, volume: f64) -> Result<()>;

    /// All player settings, defaults filled in
    fn player_settings(&self) -> PlayerSettings {
        let defaults = PlayerSettings::default();
        PlayerSettings {
            preload_window: self
                .get_preload_window()
                .map(|n| n as usize)
                .unwrap_or(defaults.preload_window),
            connect_timeout: self
                .get_connect_timeout_secs()
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            volume: self.get_player_volume() as f32,
        }
    }
}

impl PlayerConfigExt for Config {
    impl_u64_config!(
        get_preload_window,
        set_preload_window,
        &["player", "preload_window"],
        DEFAULT_PRELOAD_WINDOW as u64
    );

    impl_u64_config!(
        get_connect_timeout_secs,
        set_connect_timeout_secs,
        &["player", "connect_timeout_secs"],
        DEFAULT_CONNECT_TIMEOUT.as_secs()
    );

    fn get_player_volume(&self) -> f64 {
        self.get_f64(&["player", "volume"], DEFAULT_VOLUME as f64)
            .clamp(0.0, 1.0)
    }

    fn set_player_volume(&self, volume: f64) -> Result<()> {
        self.set_f64(&["player", "volume"], volume.clamp(0.0, 1.0))
    }
}
