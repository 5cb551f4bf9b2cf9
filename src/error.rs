//! Error types for the playback engine and the catalog.

use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the playback engine.
///
/// Navigation on an empty queue or an out-of-range index is not an error;
/// those calls return `Ok(())` and leave the engine untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlayerError {
    /// The network stream could not be opened. Transient, the caller may retry.
    #[error("stream unavailable: {0}")]
    StreamUnavailable(String),

    /// The content is not decodable audio. Retrying the same track will not help.
    #[error("decode error: {0}")]
    Decode(String),

    /// An operation was invoked after `shutdown`.
    #[error("playback engine is closed")]
    EngineClosed,

    /// The audio output device could not be opened or has gone away.
    #[error("audio output error: {0}")]
    Output(String),
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Failures while loading a playlist from disk.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("failed to read playlist {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse playlist: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid playlist entry {index}: {reason}")]
    Invalid { index: usize, reason: String },
}
