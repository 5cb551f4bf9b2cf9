//! Small value types shared across the playback engine.

use std::time::Duration;

use crate::catalog::Track;

/// Whether audio is currently being rendered.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Format metadata reported by the decoder for a loaded track.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
    /// Total length in frames (one sample per channel), when the container knows it.
    pub total_frames: Option<u64>,
}

impl StreamFormat {
    /// Convert a frame count to wall-clock time at this format's sample rate.
    pub fn frames_to_duration(&self, frames: u64) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let rate = u64::from(self.sample_rate);
        let secs = frames / rate;
        let rem = frames % rate;
        Duration::from_secs(secs) + Duration::from_nanos(rem * 1_000_000_000 / rate)
    }

    pub fn total_duration(&self) -> Option<Duration> {
        self.total_frames.map(|f| self.frames_to_duration(f))
    }
}

/// One decoded packet of interleaved `f32` samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub samples: Vec<f32>,
    pub channels: u16,
}

impl Frame {
    /// Number of frames (samples per channel) carried by this packet.
    pub fn frame_count(&self) -> u64 {
        let channels = usize::from(self.channels.max(1));
        (self.samples.len() / channels) as u64
    }
}

/// Raised by the output side when a play request ends on its own.
///
/// `session` identifies the loaded track the request belonged to, so late
/// notifications for a session that has since been replaced can be ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Finished { session: u64 },
    Failed { session: u64, reason: String },
}

impl SinkEvent {
    pub fn session(&self) -> u64 {
        match self {
            Self::Finished { session } | Self::Failed { session, .. } => *session,
        }
    }
}

/// Consistent view of the engine, read under a single lock acquisition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackSnapshot {
    pub state: TransportState,
    pub track: Option<Track>,
    pub queue_index: Option<usize>,
    pub position: Duration,
    pub duration: Duration,
}
