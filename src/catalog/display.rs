use crate::config::TrackField;

use super::model::Track;

/// Build a display line for `track` from the configured `fields`, joined by `sep`.
///
/// Blank fields are skipped; when nothing is left the track name is used.
pub fn display_from_fields(track: &Track, fields: &[TrackField], sep: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for f in fields {
        let value = match f {
            TrackField::Name => Some(track.name.as_str()),
            TrackField::Artist => track.artist.as_deref(),
            TrackField::Album => track.album.as_deref(),
            TrackField::Id => Some(track.id.as_str()),
        };
        if let Some(v) = value.map(str::trim).filter(|s| !s.is_empty()) {
            parts.push(v);
        }
    }

    if parts.is_empty() {
        track.name.clone()
    } else {
        parts.join(sep)
    }
}
