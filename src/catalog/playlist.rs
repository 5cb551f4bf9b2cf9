//! Playlist-backed catalog.
//!
//! Playlists are TOML files with one `[[track]]` table per entry:
//!
//! ```toml
//! [[track]]
//! id = "5e1d"
//! name = "So What"
//! artist = "Miles Davis"
//! album = "Kind of Blue"
//! duration_secs = 562
//! url = "https://media.example/Audio/5e1d/stream?static=true"
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::CatalogError;

use super::Catalog;
use super::model::Track;

#[derive(Debug, Deserialize)]
struct PlaylistFile {
    #[serde(default, rename = "track")]
    tracks: Vec<PlaylistEntry>,
}

#[derive(Debug, Deserialize)]
struct PlaylistEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    artist: Option<String>,
    #[serde(default)]
    album: Option<String>,
    #[serde(default)]
    duration_secs: u64,
    url: String,
}

/// An in-memory list of tracks, loaded from a playlist file or a URL list.
#[derive(Debug, Clone, Default)]
pub struct PlaylistCatalog {
    tracks: Vec<Track>,
}

impl PlaylistCatalog {
    /// Parse a playlist from TOML text.
    pub fn parse(text: &str) -> Result<Self, CatalogError> {
        let file: PlaylistFile = toml::from_str(text)?;

        let mut tracks = Vec::with_capacity(file.tracks.len());
        for (index, entry) in file.tracks.into_iter().enumerate() {
            let url = entry.url.trim().to_string();
            if url.is_empty() {
                return Err(CatalogError::Invalid {
                    index,
                    reason: "url must not be empty".to_string(),
                });
            }

            let fallback = Track::from_url(&url);
            tracks.push(Track {
                id: entry.id.unwrap_or(fallback.id),
                name: entry
                    .name
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or(fallback.name),
                artist: entry.artist.filter(|a| !a.trim().is_empty()),
                album: entry.album.filter(|a| !a.trim().is_empty()),
                duration: Duration::from_secs(entry.duration_secs),
                url,
            });
        }

        Ok(Self { tracks })
    }

    /// Read and parse a playlist file.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let text = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Build a catalog from bare stream URLs.
    pub fn from_urls<S: AsRef<str>>(urls: &[S]) -> Self {
        Self {
            tracks: urls.iter().map(|u| Track::from_url(u.as_ref())).collect(),
        }
    }

    /// Append the tracks of `other` after this catalog's tracks.
    pub fn extend(&mut self, other: PlaylistCatalog) {
        self.tracks.extend(other.tracks);
    }
}

impl Catalog for PlaylistCatalog {
    fn tracks(&self) -> Result<Vec<Track>, CatalogError> {
        Ok(self.tracks.clone())
    }
}
