use std::time::Duration;

/// Immutable descriptor of a playable item on the media server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    /// Duration reported by the catalog. The decoder's own length wins when known.
    pub duration: Duration,
    pub url: String,
}

impl Track {
    /// Build a track from a bare stream URL, naming it after the last path segment.
    pub fn from_url(url: &str) -> Self {
        let name = url
            .split(['?', '#'])
            .next()
            .unwrap_or(url)
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(url)
            .to_string();

        Self {
            id: url.to_string(),
            name,
            artist: None,
            album: None,
            duration: Duration::ZERO,
            url: url.to_string(),
        }
    }
}
