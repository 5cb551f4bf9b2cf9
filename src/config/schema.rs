use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Top-level settings loaded from `config.toml`.
///
/// File format: TOML
/// Default path (Linux/XDG): `$XDG_CONFIG_HOME/vivace/config.toml` or `~/.config/vivace/config.toml`
///
/// Precedence (highest wins):
/// 1) Environment variables (prefix `VIVACE__`, `__` as nested separator)
/// 2) Config file (if present)
/// 3) Struct defaults
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub output: OutputSettings,
    pub network: NetworkSettings,
    pub playback: PlaybackSettings,
    pub display: DisplaySettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Sample rate the output device is opened with. Sources are resampled to it.
    pub sample_rate: u32,
    /// Device buffer size in frames. Larger is more robust, smaller has less latency.
    pub buffer_frames: u32,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            buffer_frames: 44_100 / 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Time allowed to establish the TCP/TLS connection (milliseconds).
    pub connect_timeout_ms: u64,
    /// Time allowed for the server to start answering (milliseconds).
    pub response_timeout_ms: u64,
    /// Longest gap between body bytes before a stream counts as dead
    /// (milliseconds). `0` waits forever. The whole body is never bounded:
    /// a track streams for as long as it plays.
    pub stall_timeout_ms: u64,
    pub user_agent: String,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            response_timeout_ms: 15_000,
            stall_timeout_ms: 15_000,
            user_agent: concat!("vivace/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl NetworkSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn stall_timeout(&self) -> Option<Duration> {
        (self.stall_timeout_ms > 0).then(|| Duration::from_millis(self.stall_timeout_ms))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Cadence of progress notifications while playing (milliseconds).
    pub progress_interval_ms: u64,
    /// Treat a mid-stream decode failure like the end of the track and move on.
    /// When false the engine just stops.
    pub advance_on_decode_error: bool,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            progress_interval_ms: 500,
            advance_on_decode_error: false,
        }
    }
}

impl PlaybackSettings {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    /// Which track fields make up the "now playing" line, and in what order.
    ///
    /// Example: ["artist", "name", "album"]
    pub track_fields: Vec<TrackField>,
    /// Separator used to join `track_fields`.
    pub separator: String,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            track_fields: vec![TrackField::Artist, TrackField::Name],
            separator: " - ".to_string(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackField {
    #[serde(alias = "title")]
    Name,
    Artist,
    Album,
    Id,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive, used when `RUST_LOG` is not set.
    pub level: String,
    /// Append logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}
