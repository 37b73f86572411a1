use serde::{Deserialize, Serialize};
use std::path::Path;

pub type SongKey = String;
pub type AlbumKey = String;
pub type ArtistKey = String;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VaType {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "va")]
    Va,
    #[serde(rename = "ost")]
    Ost,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub key: SongKey,
    pub path: String,
    pub title: String,
    // folded as track + 100 * disk
    #[serde(default)]
    pub track: u32,
    #[serde(default)]
    pub artist_ids: Vec<ArtistKey>,
    #[serde(default)]
    pub secondary_ids: Vec<ArtistKey>,
    pub album_id: AlbumKey,
    #[serde(default)]
    pub variations: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub key: AlbumKey,
    pub title: String,
    #[serde(default)]
    pub year: u32,
    #[serde(default)]
    pub vatype: VaType,
    #[serde(default)]
    pub primary_artists: Vec<ArtistKey>,
    #[serde(default)]
    pub songs: Vec<SongKey>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub key: ArtistKey,
    pub name: String,
    #[serde(default)]
    pub songs: Vec<SongKey>,
    #[serde(default)]
    pub albums: Vec<AlbumKey>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FlatCatalog {
    #[serde(default)]
    pub songs: Vec<Song>,
    #[serde(default)]
    pub albums: Vec<Album>,
    #[serde(default)]
    pub artists: Vec<Artist>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub songs: usize,
    pub albums: usize,
    pub artists: usize,
}

pub fn normalize_name(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn relpath_from(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(path_to_slash_string(rel))
}

fn path_to_slash_string(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_and_lowercases() {
        assert_eq!(normalize_name("  The   Fall  "), "the fall");
        assert_eq!(normalize_name("OK Computer"), "ok computer");
        assert_eq!(normalize_name(""), "");
    }

    #[test]
    fn relpath_strips_root() {
        let root = Path::new("/music/main");
        let file = Path::new("/music/main/Artist/Album/01.flac");
        assert_eq!(
            relpath_from(root, file).as_deref(),
            Some("Artist/Album/01.flac")
        );
        assert_eq!(relpath_from(Path::new("/other"), file), None);
    }

    #[test]
    fn vatype_serializes_as_short_tags() {
        let json = serde_json::to_string(&VaType::Va).unwrap();
        assert_eq!(json, "\"va\"");
        let none: VaType = serde_json::from_str("\"\"").unwrap();
        assert_eq!(none, VaType::None);
    }
}
