use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub mod catalog;
pub mod index;
pub mod keys;
mod merge;
pub mod scan;
pub mod store;

pub use catalog::Catalog;
pub use index::{SearchIndex, SearchResults};
pub use scan::{
    assign_covers, scan_locations, IgnoreItem, IgnoreKind, ScanOptions, ScanResults,
    DEFAULT_SKIP_MARKER,
};
pub use store::{CatalogStore, StoreError};

use metadata::{read_audio_metadata, read_audio_metadata_deep};
use scan::ScannedAudio;

#[derive(Debug)]
pub enum CatalogError {
    Store(StoreError),
    KeyCollision(String),
    ForeignPath(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Store(err) => write!(f, "store error: {}", err),
            CatalogError::KeyCollision(path) => {
                write!(f, "song key retry budget exhausted for {}", path)
            }
            CatalogError::ForeignPath(path) => {
                write!(f, "path is outside its scan location: {}", path)
            }
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<StoreError> for CatalogError {
    fn from(err: StoreError) -> Self {
        CatalogError::Store(err)
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ScanStats {
    pub scanned: usize,
    pub added: usize,
    pub skipped: usize,
}

pub fn build_catalog(
    locations: &[String],
    options: &ScanOptions,
    store: &CatalogStore,
) -> Result<(Catalog, ScanStats), CatalogError> {
    let results = scan_locations(locations, options);
    let mut catalog = Catalog::new();
    let stats = merge_files(&mut catalog, &results.audio, store)?;
    assign_covers(&mut catalog, &results.images);
    Ok((catalog, stats))
}

pub fn merge_locations(
    catalog: &mut Catalog,
    locations: &[String],
    options: &ScanOptions,
    store: &CatalogStore,
) -> Result<ScanStats, CatalogError> {
    let results = scan_locations(locations, options);
    let stats = merge_files(catalog, &results.audio, store)?;
    assign_covers(catalog, &results.images);
    Ok(stats)
}

fn merge_files(
    catalog: &mut Catalog,
    files: &[ScannedAudio],
    store: &CatalogStore,
) -> Result<ScanStats, CatalogError> {
    let mut stats = ScanStats::default();
    for file in files {
        stats.scanned += 1;
        let path_str = file.path.display().to_string();
        let mtime = file_mtime(&file.path);
        if store.is_skipped(&path_str, mtime)? {
            stats.skipped += 1;
            continue;
        }

        let mut meta = match read_audio_metadata(&file.path) {
            Ok(meta) => meta,
            Err(first_err) => match read_audio_metadata_deep(&file.path) {
                Ok(meta) => meta,
                Err(err) => {
                    warn!(
                        "failed to read {:?}: {:?} (first attempt: {:?})",
                        file.path, err, first_err
                    );
                    store.record_skip(&path_str, mtime)?;
                    stats.skipped += 1;
                    continue;
                }
            },
        };
        if let Some(patch) = store.get_override(&path_str)? {
            patch.apply(&mut meta);
        }

        catalog.add_song(&file.location, &file.path, &meta)?;
        stats.added += 1;
    }
    Ok(stats)
}

fn file_mtime(path: &Path) -> u64 {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}
