use std::collections::HashSet;
use std::path::Path;

use common::{normalize_name, VaType};
use lofty::error::LoftyError;
use lofty::file::TaggedFile;
use lofty::prelude::{ItemKey, TaggedFileExt};
use lofty::probe::Probe;
use serde::{Deserialize, Serialize};

// track/disk/year are 0 when unknown
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AudioMetadata {
    pub title: String,
    pub artists: Vec<String>,
    pub more_artists: Vec<String>,
    pub album: String,
    pub year: u32,
    pub track: u16,
    pub disk: u16,
    pub vatype: VaType,
    pub variations: Vec<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artists: Option<Vec<String>>,
    #[serde(default)]
    pub more_artists: Option<Vec<String>>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub year: Option<u32>,
    #[serde(default)]
    pub track: Option<u16>,
    #[serde(default)]
    pub disk: Option<u16>,
    #[serde(default)]
    pub vatype: Option<VaType>,
    #[serde(default)]
    pub variations: Option<Vec<String>>,
}

impl MetadataPatch {
    pub fn apply(&self, meta: &mut AudioMetadata) {
        if let Some(title) = &self.title {
            meta.title = title.clone();
        }
        if let Some(artists) = &self.artists {
            meta.artists = artists.clone();
        }
        if let Some(more) = &self.more_artists {
            meta.more_artists = more.clone();
        }
        if let Some(album) = &self.album {
            meta.album = album.clone();
        }
        if let Some(year) = self.year {
            meta.year = year;
        }
        if let Some(track) = self.track {
            meta.track = track;
        }
        if let Some(disk) = self.disk {
            meta.disk = disk;
        }
        if let Some(vatype) = self.vatype {
            meta.vatype = vatype;
        }
        if let Some(variations) = &self.variations {
            meta.variations = variations.clone();
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == MetadataPatch::default()
    }
}

#[derive(Debug)]
pub enum MetadataError {
    Io(std::io::Error),
    Lofty(LoftyError),
}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        MetadataError::Io(err)
    }
}

impl From<LoftyError> for MetadataError {
    fn from(err: LoftyError) -> Self {
        MetadataError::Lofty(err)
    }
}

pub fn read_audio_metadata(path: &Path) -> Result<AudioMetadata, MetadataError> {
    let tagged_file = lofty::read_from_path(path)?;
    Ok(resolve(path, &tagged_file))
}

// sniffs the container from the leading bytes instead of the extension
pub fn read_audio_metadata_deep(path: &Path) -> Result<AudioMetadata, MetadataError> {
    let tagged_file = Probe::open(path)?.guess_file_type()?.read()?;
    Ok(resolve(path, &tagged_file))
}

fn resolve(path: &Path, tagged_file: &TaggedFile) -> AudioMetadata {
    let tag = tagged_file.primary_tag().or_else(|| tagged_file.first_tag());

    let raw_title = tag.and_then(|t| clean(t.get_string(&ItemKey::TrackTitle)));
    let raw_artist = tag.and_then(|t| clean(t.get_string(&ItemKey::TrackArtist)));
    let album_artist = tag.and_then(|t| clean(t.get_string(&ItemKey::AlbumArtist)));
    let raw_album = tag.and_then(|t| clean(t.get_string(&ItemKey::AlbumTitle)));
    let year = tag
        .and_then(|t| t.get_string(&ItemKey::Year))
        .and_then(parse_year)
        .unwrap_or(0);
    let track = tag
        .and_then(|t| t.get_string(&ItemKey::TrackNumber))
        .and_then(parse_number)
        .unwrap_or(0);
    let disk = tag
        .and_then(|t| t.get_string(&ItemKey::DiscNumber))
        .and_then(parse_number)
        .unwrap_or(0);
    let genres = tag
        .and_then(|t| t.get_string(&ItemKey::Genre))
        .map(parse_genres)
        .unwrap_or_default();
    let compilation = tag
        .and_then(|t| t.get_string(&ItemKey::FlagCompilation))
        .map(|v| matches!(v.trim(), "1" | "true"))
        .unwrap_or(false);

    let mut more_artists: Vec<String> = Vec::new();
    let mut variations: Vec<String> = Vec::new();

    let mut title = match raw_title {
        Some(raw) => {
            let (base, groups) = peel_bracket_groups(&raw);
            for group in groups {
                match featured_names(&group) {
                    Some(names) => more_artists.extend(names),
                    None => variations.push(group),
                }
            }
            let (base, inline) = extract_featured(&base);
            more_artists.extend(inline);
            base
        }
        None => String::new(),
    };
    if title.is_empty() {
        title = file_stem(path);
    }

    let artist_head = match raw_artist {
        Some(raw) => {
            let (head, featured) = extract_featured(&raw);
            more_artists.extend(featured);
            head
        }
        None => String::new(),
    };
    let mut artists = split_artists(&artist_head);
    if artists.is_empty() {
        if let Some(fallback) = album_artist
            .as_deref()
            .filter(|name| !is_va_marker(&normalize_name(name)))
        {
            artists = split_artists(fallback);
        }
    }
    if artists.is_empty() {
        if let Some(name) = dir_name(path, 2) {
            artists.push(name);
        }
    }
    let artists = dedup_names(artists);
    let primary: HashSet<String> = artists.iter().map(|name| normalize_name(name)).collect();
    let more_artists = dedup_names(more_artists)
        .into_iter()
        .filter(|name| !primary.contains(&normalize_name(name)))
        .collect();

    let album = raw_album
        .or_else(|| dir_name(path, 1))
        .unwrap_or_default();

    AudioMetadata {
        title,
        artists,
        more_artists,
        album,
        year,
        track,
        disk,
        vatype: infer_vatype(compilation, album_artist.as_deref(), &genres),
        variations,
    }
}

fn clean(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// Tag numbers are capped at 16 bits so track + 100 * disk always fits a u32.
fn parse_number(text: &str) -> Option<u16> {
    let head = text.split('/').next().unwrap_or(text).trim();
    head.parse().ok()
}

fn parse_year(text: &str) -> Option<u32> {
    let mut digits = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            if digits.len() == 4 {
                break;
            }
        } else if !digits.is_empty() {
            break;
        }
    }
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

fn parse_genres(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for part in text.split(&[';', ',', '/', '|', '\0'][..]) {
        let trimmed = part.trim();
        if trimmed.is_empty() {
            continue;
        }
        out.push(trimmed.to_string());
    }
    if out.is_empty() {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            out.push(trimmed.to_string());
        }
    }
    out
}

const FEAT_MARKERS: [&str; 3] = ["featuring", "feat.", "ft."];

// a title that is nothing but one bracket group stays as-is
fn peel_bracket_groups(title: &str) -> (String, Vec<String>) {
    let mut base = title.trim();
    let mut groups: Vec<String> = Vec::new();
    loop {
        let open = match base.chars().last() {
            Some(')') => '(',
            Some(']') => '[',
            _ => break,
        };
        let Some(start) = base.rfind(open) else {
            break;
        };
        let head = base[..start].trim_end();
        if head.is_empty() {
            break;
        }
        let inner = base[start + 1..base.len() - 1].trim();
        if !inner.is_empty() {
            groups.push(inner.to_string());
        }
        base = head;
    }
    groups.reverse();
    (base.to_string(), groups)
}

fn featured_names(group: &str) -> Option<Vec<String>> {
    let trimmed = group.trim();
    let lower = trimmed.to_ascii_lowercase();
    FEAT_MARKERS
        .iter()
        .find(|marker| lower.starts_with(*marker))
        .map(|marker| split_people(&trimmed[marker.len()..]))
}

fn extract_featured(text: &str) -> (String, Vec<String>) {
    let lower = text.to_ascii_lowercase();
    for marker in FEAT_MARKERS {
        let Some(pos) = lower.find(marker) else {
            continue;
        };
        if pos > 0 && !matches!(lower.as_bytes()[pos - 1], b' ' | b'(' | b'[') {
            continue;
        }
        let head = text[..pos]
            .trim_end()
            .trim_end_matches(['(', '['])
            .trim_end();
        let names = split_people(&text[pos + marker.len()..]);
        return (head.to_string(), names);
    }
    (text.trim().to_string(), Vec::new())
}

fn split_people(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for part in text.split([',', '&']) {
        for name in part.split(" and ") {
            let name = name.trim().trim_end_matches([')', ']']).trim_end();
            if !name.is_empty() {
                out.push(name.to_string());
            }
        }
    }
    out
}

fn split_artists(text: &str) -> Vec<String> {
    text.split(&[';', '/', '|', '\0'][..])
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_string())
        .collect()
}

fn dedup_names(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for name in names {
        if seen.insert(normalize_name(&name)) {
            out.push(name);
        }
    }
    out
}

fn infer_vatype(compilation: bool, album_artist: Option<&str>, genres: &[String]) -> VaType {
    let album_artist = album_artist.map(normalize_name);
    let soundtrack = genres.iter().any(|genre| {
        let genre = normalize_name(genre);
        genre == "ost" || genre.contains("soundtrack")
    }) || album_artist
        .as_deref()
        .is_some_and(|name| name.contains("soundtrack"));
    if soundtrack {
        return VaType::Ost;
    }
    if compilation || album_artist.as_deref().is_some_and(is_va_marker) {
        VaType::Va
    } else {
        VaType::None
    }
}

fn is_va_marker(normalized: &str) -> bool {
    matches!(normalized, "various artists" | "various" | "va" | "v.a." | "v/a")
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
}

// levels: 1 = parent, 2 = its parent
fn dir_name(path: &Path, levels: usize) -> Option<String> {
    let mut current = path.parent();
    for _ in 1..levels {
        current = current.and_then(Path::parent);
    }
    current
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peels_trailing_variation_groups() {
        let (base, groups) = peel_bracket_groups("Song Title (Live) [2009 Remaster]");
        assert_eq!(base, "Song Title");
        assert_eq!(groups, vec!["Live", "2009 Remaster"]);
    }

    #[test]
    fn keeps_fully_bracketed_title() {
        let (base, groups) = peel_bracket_groups("(Untitled)");
        assert_eq!(base, "(Untitled)");
        assert!(groups.is_empty());
    }

    #[test]
    fn bracket_group_feat_becomes_artists() {
        assert_eq!(
            featured_names("feat. Anna & Ben"),
            Some(vec!["Anna".to_string(), "Ben".to_string()])
        );
        assert_eq!(featured_names("Acoustic Version"), None);
    }

    #[test]
    fn inline_feat_splits_artist_tag() {
        let (head, featured) = extract_featured("Main Act feat. Guest One, Guest Two");
        assert_eq!(head, "Main Act");
        assert_eq!(featured, vec!["Guest One", "Guest Two"]);
    }

    #[test]
    fn feat_marker_needs_word_boundary() {
        let (head, featured) = extract_featured("Soft. Loud");
        assert_eq!(head, "Soft. Loud");
        assert!(featured.is_empty());
    }

    #[test]
    fn parses_track_of_total() {
        assert_eq!(parse_number("3/12"), Some(3));
        assert_eq!(parse_number(" 7 "), Some(7));
        assert_eq!(parse_number("x"), None);
        assert_eq!(parse_number("70000"), None);
    }

    #[test]
    fn parses_leading_year() {
        assert_eq!(parse_year("1999-05-01"), Some(1999));
        assert_eq!(parse_year("(c) 2004"), Some(2004));
        assert_eq!(parse_year("n/a"), None);
    }

    #[test]
    fn infers_va_and_ost() {
        assert_eq!(infer_vatype(true, None, &[]), VaType::Va);
        assert_eq!(infer_vatype(false, Some("Various Artists"), &[]), VaType::Va);
        assert_eq!(
            infer_vatype(false, None, &["Soundtrack".to_string()]),
            VaType::Ost
        );
        assert_eq!(
            infer_vatype(true, None, &["Original Soundtrack".to_string()]),
            VaType::Ost
        );
        assert_eq!(infer_vatype(false, Some("Solo Act"), &[]), VaType::None);
    }

    #[test]
    fn patch_overrides_only_set_fields() {
        let mut meta = AudioMetadata {
            title: "Wrong".to_string(),
            artists: vec!["Artist".to_string()],
            album: "Album".to_string(),
            year: 1990,
            ..AudioMetadata::default()
        };
        let patch = MetadataPatch {
            title: Some("Right".to_string()),
            year: Some(1991),
            ..MetadataPatch::default()
        };
        patch.apply(&mut meta);
        assert_eq!(meta.title, "Right");
        assert_eq!(meta.year, 1991);
        assert_eq!(meta.artists, vec!["Artist"]);
        assert_eq!(meta.album, "Album");
        assert!(!patch.is_empty());
        assert!(MetadataPatch::default().is_empty());
    }

    #[test]
    fn dir_names_feed_path_fallback() {
        let path = Path::new("/music/Artist Name/Album Name/01 - Track.flac");
        assert_eq!(dir_name(path, 1).as_deref(), Some("Album Name"));
        assert_eq!(dir_name(path, 2).as_deref(), Some("Artist Name"));
    }
}
