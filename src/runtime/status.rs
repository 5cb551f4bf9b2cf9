use std::time::Duration;

use vivace::audio::{PlaybackSnapshot, TransportState};
use vivace::catalog::display_from_fields;
use vivace::config::DisplaySettings;

/// Format a `Duration` as `MM:SS`.
pub fn format_mmss(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// One-line status: transport, track, time and queue position.
pub fn status_line(snap: &PlaybackSnapshot, queue_len: usize, display: &DisplaySettings) -> String {
    let state = match snap.state {
        TransportState::Playing => "playing",
        TransportState::Paused => "paused",
        TransportState::Stopped => "stopped",
    };

    let mut line = format!("[{state}]");
    if let Some(track) = &snap.track {
        line.push(' ');
        line.push_str(&display_from_fields(
            track,
            &display.track_fields,
            &display.separator,
        ));
    }
    if snap.state != TransportState::Stopped {
        line.push_str(&format!(
            " {} / {}",
            format_mmss(snap.position),
            format_mmss(snap.duration)
        ));
    }
    if let Some(index) = snap.queue_index {
        line.push_str(&format!(" ({}/{queue_len})", index + 1));
    }
    line
}
