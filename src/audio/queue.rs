//! The ordered list of playable tracks and its navigation cursor.
//!
//! The cursor is `None` when nothing is selected. Navigation wraps in both
//! directions; callers are expected to check for an empty queue, where the
//! index helpers return `None`.

use crate::catalog::Track;

#[derive(Debug, Clone, Default)]
pub struct TrackQueue {
    tracks: Vec<Track>,
    cursor: Option<usize>,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole sequence. The cursor is always reset.
    pub fn set(&mut self, tracks: Vec<Track>) {
        self.tracks = tracks;
        self.cursor = None;
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn current_index(&self) -> Option<usize> {
        self.cursor
    }

    /// Track at `index`, or `None` when out of range.
    pub fn at(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    /// Move the cursor to `index` if it is valid and return the selected track.
    pub fn select(&mut self, index: usize) -> Option<&Track> {
        if index >= self.tracks.len() {
            return None;
        }
        self.cursor = Some(index);
        self.tracks.get(index)
    }

    /// Index after `from`, wrapping past the end. No selection moves to the first track.
    pub fn next_index(&self, from: Option<usize>) -> Option<usize> {
        let len = self.tracks.len();
        if len == 0 {
            return None;
        }
        Some(match from {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        })
    }

    /// Index before `from`, wrapping before the start. No selection moves to the last track.
    pub fn previous_index(&self, from: Option<usize>) -> Option<usize> {
        let len = self.tracks.len();
        if len == 0 {
            return None;
        }
        Some(match from {
            Some(i) if i > 0 && i <= len => i - 1,
            _ => len - 1,
        })
    }
}
