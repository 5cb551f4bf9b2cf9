//! Catalog collaborator: track descriptors and where they come from.
//!
//! The media server's browsing API is out of scope for the engine; anything
//! that can hand over an ordered list of `Track`s implements `Catalog`. The
//! binary ships a TOML playlist catalog and a bare URL list.

mod display;
mod model;
mod playlist;

pub use display::display_from_fields;
pub use model::Track;
pub use playlist::PlaylistCatalog;

use crate::error::CatalogError;

/// A source of playable tracks, used to populate the playback queue.
pub trait Catalog {
    fn tracks(&self) -> Result<Vec<Track>, CatalogError>;
}

#[cfg(test)]
mod tests;
