use tracing::{info, warn};

use vivace::audio::PlaybackEngine;
use vivace::catalog::{Catalog, PlaylistCatalog, Track, display_from_fields};
use vivace::config::DisplaySettings;
use vivace::error::CatalogError;

use crate::cli::Args;

/// Playlist entries first, then any URLs from the command line.
pub fn collect_tracks(args: &Args) -> Result<Vec<Track>, CatalogError> {
    let mut catalog = match &args.playlist {
        Some(path) => PlaylistCatalog::load(path)?,
        None => PlaylistCatalog::default(),
    };
    catalog.extend(PlaylistCatalog::from_urls(&args.urls));
    catalog.tracks()
}

/// Report engine notifications through `tracing`, with tracks rendered per `display`.
pub fn attach_observers(engine: &PlaybackEngine, display: &DisplaySettings) {
    let display = display.clone();
    engine.on_track_change(move |track| {
        let line = display_from_fields(track, &display.track_fields, &display.separator);
        info!("now playing: {line}");
    });
    engine.on_state_change(|state| info!(?state, "transport"));
    engine.on_error(|err| warn!("playback error: {err}"));
}
