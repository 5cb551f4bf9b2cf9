use std::time::Duration;

use tempfile::tempdir;

use super::*;
use crate::config::TrackField;
use crate::error::CatalogError;

fn t(name: &str, artist: Option<&str>) -> Track {
    Track {
        id: name.to_lowercase(),
        name: name.into(),
        artist: artist.map(Into::into),
        album: None,
        duration: Duration::from_secs(180),
        url: format!("http://media.local/{name}.mp3"),
    }
}

#[test]
fn display_from_fields_can_format_artist_name() {
    let fields = [TrackField::Artist, TrackField::Name];
    assert_eq!(
        display_from_fields(&t("Song", Some("Artist")), &fields, " - "),
        "Artist - Song"
    );
    assert_eq!(
        display_from_fields(&t("Song", Some("  Artist  ")), &fields, " - "),
        "Artist - Song"
    );
    assert_eq!(display_from_fields(&t("Song", None), &fields, " - "), "Song");
}

#[test]
fn display_from_fields_falls_back_to_name() {
    let track = t("Song", None);
    assert_eq!(display_from_fields(&track, &[TrackField::Album], " | "), "Song");
    assert_eq!(display_from_fields(&track, &[], " | "), "Song");
}

#[test]
fn track_from_url_uses_last_path_segment() {
    let track = Track::from_url("http://host/music/01%20Intro.flac?api_key=abc");
    assert_eq!(track.name, "01%20Intro.flac");
    assert_eq!(track.url, "http://host/music/01%20Intro.flac?api_key=abc");
    assert_eq!(track.duration, Duration::ZERO);

    let bare = Track::from_url("http://host/");
    assert_eq!(bare.name, "host");
}

#[test]
fn playlist_parse_reads_all_fields() {
    let catalog = PlaylistCatalog::parse(
        r#"
        [[track]]
        id = "a1"
        name = "So What"
        artist = "Miles Davis"
        album = "Kind of Blue"
        duration_secs = 562
        url = "http://media.local/a1"

        [[track]]
        url = "http://media.local/stream/b2.mp3"
        "#,
    )
    .unwrap();

    let tracks = catalog.tracks().unwrap();
    assert_eq!(tracks.len(), 2);
    assert_eq!(tracks[0].id, "a1");
    assert_eq!(tracks[0].artist.as_deref(), Some("Miles Davis"));
    assert_eq!(tracks[0].duration, Duration::from_secs(562));
    assert_eq!(tracks[1].name, "b2.mp3");
    assert_eq!(tracks[1].id, "http://media.local/stream/b2.mp3");
    assert!(tracks[1].artist.is_none());
}

#[test]
fn playlist_parse_rejects_empty_url() {
    let err = PlaylistCatalog::parse(
        r#"
        [[track]]
        name = "ok"
        url = "http://media.local/ok"

        [[track]]
        name = "broken"
        url = "   "
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, CatalogError::Invalid { index: 1, .. }));
}

#[test]
fn playlist_load_reports_missing_file() {
    let dir = tempdir().unwrap();
    let err = PlaylistCatalog::load(&dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, CatalogError::Io { .. }));
}

#[test]
fn playlist_load_reads_file_from_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("queue.toml");
    std::fs::write(&path, "[[track]]\nname = \"One\"\nurl = \"http://x/1\"\n").unwrap();

    let mut catalog = PlaylistCatalog::load(&path).unwrap();
    catalog.extend(PlaylistCatalog::from_urls(&["http://x/2"]));
    let names: Vec<String> = catalog.tracks().unwrap().into_iter().map(|t| t.name).collect();
    assert_eq!(names, vec!["One", "2"]);
}
