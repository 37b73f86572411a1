use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

use crate::catalog::Catalog;

const AUDIO_EXTS: [&str; 5] = ["flac", "mp3", "aac", "m4a", "wma"];
const IMAGE_EXTS: [&str; 3] = ["png", "jpg", "jpeg"];

pub const DEFAULT_SKIP_MARKER: &str = ".no-index";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IgnoreItem {
    pub kind: IgnoreKind,
    pub value: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IgnoreKind {
    PathRoot,
    PathKeyword,
    DirName,
}

#[derive(Clone, Debug)]
pub struct ScanOptions {
    pub watch_hidden: bool,
    pub skip_marker: String,
    pub ignore: Vec<IgnoreItem>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            watch_hidden: false,
            skip_marker: DEFAULT_SKIP_MARKER.to_string(),
            ignore: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScannedAudio {
    // the configured location the file was found under
    pub location: String,
    pub path: PathBuf,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScannedImage {
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScanResults {
    pub audio: Vec<ScannedAudio>,
    pub images: Vec<ScannedImage>,
}

// symlinks are followed; walkdir reports link cycles as errors, which land
// in the same warn-and-skip path as unreadable entries
pub fn scan_locations(locations: &[String], options: &ScanOptions) -> ScanResults {
    let mut results = ScanResults::default();
    for location in locations {
        scan_root(location, options, &mut results);
    }
    results.audio.sort_by(|a, b| a.path.cmp(&b.path));
    results.images.sort_by(|a, b| a.path.cmp(&b.path));
    results
}

fn scan_root(location: &str, options: &ScanOptions, out: &mut ScanResults) {
    let walker = WalkDir::new(location)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| keep_entry(entry, options));
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("skipping unreadable entry under {}: {}", location, err);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if is_audio(path) {
            out.audio.push(ScannedAudio {
                location: location.to_string(),
                path: path.to_path_buf(),
            });
        } else if is_image(path) {
            let size = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
            out.images.push(ScannedImage {
                path: path.to_path_buf(),
                size,
            });
        }
    }
}

fn keep_entry(entry: &DirEntry, options: &ScanOptions) -> bool {
    let name = entry.file_name().to_string_lossy().to_string();
    let hidden = name.starts_with('.');
    if entry.file_type().is_dir() {
        if hidden && !options.watch_hidden && entry.depth() > 0 {
            return false;
        }
        if entry.path().join(&options.skip_marker).exists() {
            return false;
        }
        return !ignored_dir(entry.path(), &name, &options.ignore);
    }
    // hidden images stay visible as cover candidates
    if hidden && !options.watch_hidden && !is_image(entry.path()) {
        return false;
    }
    !ignored_file(entry.path(), &options.ignore)
}

fn ignored_dir(path: &Path, name: &str, rules: &[IgnoreItem]) -> bool {
    rules.iter().any(|rule| match rule.kind {
        IgnoreKind::PathRoot => path.starts_with(&rule.value),
        IgnoreKind::PathKeyword => path_contains(path, &rule.value),
        IgnoreKind::DirName => name.eq_ignore_ascii_case(&rule.value),
    })
}

fn ignored_file(path: &Path, rules: &[IgnoreItem]) -> bool {
    rules.iter().any(|rule| match rule.kind {
        IgnoreKind::PathRoot => path.starts_with(&rule.value),
        IgnoreKind::PathKeyword => path_contains(path, &rule.value),
        IgnoreKind::DirName => false,
    })
}

fn path_contains(path: &Path, needle: &str) -> bool {
    path.to_string_lossy()
        .to_lowercase()
        .contains(&needle.to_lowercase())
}

fn lower_ext(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

pub fn is_audio(path: &Path) -> bool {
    lower_ext(path).is_some_and(|ext| AUDIO_EXTS.contains(&ext.as_str()))
}

pub fn is_image(path: &Path) -> bool {
    lower_ext(path).is_some_and(|ext| IMAGE_EXTS.contains(&ext.as_str()))
}

// Largest image per directory, then per album the largest across its songs'
// directories. Albums without a candidate keep whatever they had, so an
// incremental pass over one location cannot blank covers elsewhere.
pub fn assign_covers(catalog: &mut Catalog, images: &[ScannedImage]) {
    let mut best_by_dir: HashMap<PathBuf, (PathBuf, u64)> = HashMap::new();
    for image in images {
        let Some(dir) = image.path.parent() else {
            continue;
        };
        match best_by_dir.get_mut(dir) {
            Some(best) => {
                if better_candidate((&image.path, image.size), (&best.0, best.1)) {
                    *best = (image.path.clone(), image.size);
                }
            }
            None => {
                best_by_dir.insert(dir.to_path_buf(), (image.path.clone(), image.size));
            }
        }
    }

    let mut chosen: Vec<(String, PathBuf)> = Vec::new();
    for (album_key, album) in &catalog.albums {
        let mut best: Option<(PathBuf, u64)> = None;
        for song_key in &album.songs {
            let Some(song) = catalog.songs.get(song_key) else {
                continue;
            };
            let Some(dir) = Path::new(&song.path).parent() else {
                continue;
            };
            let Some((path, size)) = best_by_dir.get(dir) else {
                continue;
            };
            let replace = match &best {
                Some((current, current_size)) => {
                    better_candidate((path, *size), (current, *current_size))
                }
                None => true,
            };
            if replace {
                best = Some((path.clone(), *size));
            }
        }
        if let Some((path, _)) = best {
            chosen.push((album_key.clone(), path));
        }
    }
    for (album_key, path) in chosen {
        catalog.pictures.insert(album_key, path);
    }
}

fn better_candidate(candidate: (&Path, u64), current: (&Path, u64)) -> bool {
    candidate.1 > current.1 || (candidate.1 == current.1 && candidate.0 < current.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path, bytes: usize) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, vec![0u8; bytes]).unwrap();
    }

    fn audio_names(results: &ScanResults) -> Vec<String> {
        results
            .audio
            .iter()
            .map(|file| {
                file.path
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_default()
            })
            .collect()
    }

    #[test]
    fn classifies_by_extension_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("a/01.FLAC"), 1);
        touch(&root.join("a/02.mp3"), 1);
        touch(&root.join("a/cover.JPG"), 1);
        touch(&root.join("a/notes.txt"), 1);

        let results = scan_locations(
            &[root.display().to_string()],
            &ScanOptions::default(),
        );
        assert_eq!(audio_names(&results), vec!["01.FLAC", "02.mp3"]);
        assert_eq!(results.images.len(), 1);
    }

    #[test]
    fn hidden_entries_skipped_but_hidden_images_kept() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("a/01.flac"), 1);
        touch(&root.join("a/.hidden.flac"), 1);
        touch(&root.join("a/.folder.png"), 1);
        touch(&root.join(".secret/02.flac"), 1);

        let results = scan_locations(
            &[root.display().to_string()],
            &ScanOptions::default(),
        );
        assert_eq!(audio_names(&results), vec!["01.flac"]);
        assert_eq!(results.images.len(), 1);
    }

    #[test]
    fn watch_hidden_includes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("a/01.flac"), 1);
        touch(&root.join(".secret/02.flac"), 1);

        let options = ScanOptions {
            watch_hidden: true,
            ..ScanOptions::default()
        };
        let results = scan_locations(&[root.display().to_string()], &options);
        assert_eq!(results.audio.len(), 2);
    }

    #[test]
    fn marker_file_prunes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("keep/01.flac"), 1);
        touch(&root.join("skip/02.flac"), 1);
        touch(&root.join("skip/.no-index"), 0);

        let results = scan_locations(
            &[root.display().to_string()],
            &ScanOptions::default(),
        );
        assert_eq!(audio_names(&results), vec!["01.flac"]);
    }

    #[test]
    fn ignore_rules_prune_matches() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("keep/01.flac"), 1);
        touch(&root.join("Demos/02.flac"), 1);
        touch(&root.join("various/bootleg take.flac"), 1);

        let options = ScanOptions {
            ignore: vec![
                IgnoreItem {
                    kind: IgnoreKind::DirName,
                    value: "demos".to_string(),
                },
                IgnoreItem {
                    kind: IgnoreKind::PathKeyword,
                    value: "bootleg".to_string(),
                },
            ],
            ..ScanOptions::default()
        };
        let results = scan_locations(&[root.display().to_string()], &options);
        assert_eq!(audio_names(&results), vec!["01.flac"]);
    }

    #[test]
    fn path_root_rule_prunes_subtree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("keep/01.flac"), 1);
        touch(&root.join("drop/02.flac"), 1);

        let options = ScanOptions {
            ignore: vec![IgnoreItem {
                kind: IgnoreKind::PathRoot,
                value: root.join("drop").display().to_string(),
            }],
            ..ScanOptions::default()
        };
        let results = scan_locations(&[root.display().to_string()], &options);
        assert_eq!(audio_names(&results), vec!["01.flac"]);
    }

    #[test]
    fn largest_image_wins_cover() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("a/01.flac"), 1);
        touch(&root.join("a/small.jpg"), 10);
        touch(&root.join("a/big.jpg"), 100);

        let location = root.display().to_string();
        let results = scan_locations(&[location.clone()], &ScanOptions::default());

        let mut catalog = Catalog::new();
        let meta = metadata::AudioMetadata {
            title: "One".to_string(),
            artists: vec!["Ann".to_string()],
            album: "First".to_string(),
            ..metadata::AudioMetadata::default()
        };
        catalog
            .add_song(&location, &root.join("a/01.flac"), &meta)
            .unwrap();
        assign_covers(&mut catalog, &results.images);

        let album_key = catalog.flatten().albums[0].key.clone();
        let expected = root.join("a/big.jpg");
        assert_eq!(catalog.cover(&album_key), Some(expected.as_path()));
    }

    #[test]
    fn cover_ties_break_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("a/01.flac"), 1);
        touch(&root.join("a/bb.jpg"), 10);
        touch(&root.join("a/aa.jpg"), 10);

        let location = root.display().to_string();
        let results = scan_locations(&[location.clone()], &ScanOptions::default());

        let mut catalog = Catalog::new();
        let meta = metadata::AudioMetadata {
            title: "One".to_string(),
            artists: vec!["Ann".to_string()],
            album: "First".to_string(),
            ..metadata::AudioMetadata::default()
        };
        catalog
            .add_song(&location, &root.join("a/01.flac"), &meta)
            .unwrap();
        assign_covers(&mut catalog, &results.images);

        let album_key = catalog.flatten().albums[0].key.clone();
        let expected = root.join("a/aa.jpg");
        assert_eq!(catalog.cover(&album_key), Some(expected.as_path()));
    }
}
