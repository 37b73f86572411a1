use std::path::{Path, PathBuf};
use std::sync::Arc;

use catalog::{
    Catalog, CatalogStore, IgnoreItem, IgnoreKind, ScanStats, SearchIndex, SearchResults,
    StoreError,
};
use common::{Album, Artist, CatalogStats, FlatCatalog, Song};
use metadata::MetadataPatch;
use notify::RecommendedWatcher;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::config::{save_config, ConfigError, ServiceConfig};
use crate::rescan::{ScanContext, ScanCoordinator, ScanRequest, ScanStatus};
use crate::watch::configure_watcher;

#[derive(Debug)]
pub enum ServiceError {
    Config(ConfigError),
    Store(StoreError),
    Scan(String),
    ScanQueueClosed,
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::Config(err) => write!(f, "config error: {}", err),
            ServiceError::Store(err) => write!(f, "store error: {}", err),
            ServiceError::Scan(message) => write!(f, "scan failed: {}", message),
            ServiceError::ScanQueueClosed => write!(f, "scan coordinator is gone"),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<ConfigError> for ServiceError {
    fn from(err: ConfigError) -> Self {
        ServiceError::Config(err)
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        ServiceError::Store(err)
    }
}

#[derive(Default)]
pub(crate) struct CatalogState {
    pub(crate) catalog: Catalog,
    pub(crate) index: SearchIndex,
}

// Lookups and searches read the shared state directly; every mutation goes
// through the scan coordinator, and location or ignore-rule changes persist
// to the config file first.
#[derive(Clone)]
pub struct MusicService {
    pub(crate) state: Arc<RwLock<CatalogState>>,
    pub(crate) store: CatalogStore,
    pub(crate) config: Arc<RwLock<ServiceConfig>>,
    pub(crate) config_path: PathBuf,
    pub(crate) scans: ScanCoordinator,
    pub(crate) watcher: Arc<RwLock<Option<RecommendedWatcher>>>,
}

impl MusicService {
    // The catalog starts from the stored snapshot when one is readable, so
    // searches work before the first scan finishes. Needs a tokio runtime.
    pub fn start(config_path: PathBuf, config: ServiceConfig, store: CatalogStore) -> MusicService {
        let catalog = match store.load_snapshot() {
            Ok(Some(flat)) => Catalog::from_flat(flat),
            Ok(None) => Catalog::new(),
            Err(err) => {
                warn!("Failed to load catalog snapshot: {}", err);
                Catalog::new()
            }
        };
        if !catalog.is_empty() {
            let stats = catalog.stats();
            info!(
                "Warm start from snapshot: {} songs, {} albums, {} artists",
                stats.songs, stats.albums, stats.artists
            );
        }
        let index = SearchIndex::build(&catalog);
        let state = Arc::new(RwLock::new(CatalogState { catalog, index }));
        let config = Arc::new(RwLock::new(config));
        let scans = ScanCoordinator::spawn(ScanContext {
            state: Arc::clone(&state),
            store: store.clone(),
            config: Arc::clone(&config),
        });
        MusicService {
            state,
            store,
            config,
            config_path,
            scans,
            watcher: Arc::new(RwLock::new(None)),
        }
    }

    pub fn flat_database(&self) -> FlatCatalog {
        self.state.read().catalog.flatten()
    }

    pub fn song(&self, key: &str) -> Option<Song> {
        self.state.read().catalog.song(key).cloned()
    }

    pub fn album(&self, key: &str) -> Option<Album> {
        self.state.read().catalog.album(key).cloned()
    }

    pub fn artist(&self, key: &str) -> Option<Artist> {
        self.state.read().catalog.artist(key).cloned()
    }

    pub fn search(&self, substrings: bool, term: &str) -> SearchResults {
        self.state.read().index.search(substrings, term)
    }

    pub fn cover_for_album(&self, key: &str) -> Option<PathBuf> {
        self.state.read().catalog.cover(key).map(Path::to_path_buf)
    }

    pub fn catalog_stats(&self) -> CatalogStats {
        self.state.read().catalog.stats()
    }

    pub fn scan_status(&self) -> ScanStatus {
        self.scans.status()
    }

    pub fn locations(&self) -> Vec<String> {
        self.config.read().locations.clone()
    }

    // Returns false when the location is already configured.
    pub async fn add_file_location(&self, location: &str) -> Result<bool, ServiceError> {
        let location = location.trim();
        if location.is_empty() {
            return Ok(false);
        }
        let config = {
            let mut config = self.config.write();
            if config.locations.iter().any(|existing| existing.as_str() == location) {
                return Ok(false);
            }
            config.locations.push(location.to_string());
            config.clone()
        };
        save_config(&self.config_path, &config)?;
        configure_watcher(self);
        self.scans
            .scan(ScanRequest::Merge(vec![location.to_string()]))
            .await?;
        Ok(true)
    }

    // Returns false when the location was not configured.
    pub async fn remove_file_location(&self, location: &str) -> Result<bool, ServiceError> {
        let location = location.trim();
        let config = {
            let mut config = self.config.write();
            let before = config.locations.len();
            config.locations.retain(|existing| existing.as_str() != location);
            if config.locations.len() == before {
                return Ok(false);
            }
            config.clone()
        };
        save_config(&self.config_path, &config)?;
        configure_watcher(self);
        self.scans
            .scan(ScanRequest::Remove(location.to_string()))
            .await?;
        Ok(true)
    }

    pub async fn refresh(&self) -> Result<ScanStats, ServiceError> {
        self.scans.scan(ScanRequest::Full).await
    }

    pub fn schedule_refresh(&self) {
        self.scans.schedule(ScanRequest::Full);
    }

    pub fn add_ignore_item(&self, kind: IgnoreKind, value: &str) -> Result<bool, ServiceError> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(false);
        }
        let item = IgnoreItem {
            kind,
            value: value.to_string(),
        };
        let config = {
            let mut config = self.config.write();
            if config.ignore_items.contains(&item) {
                return Ok(false);
            }
            config.ignore_items.push(item);
            config.clone()
        };
        save_config(&self.config_path, &config)?;
        self.scans.schedule(ScanRequest::Full);
        Ok(true)
    }

    pub fn remove_ignore_item(&self, kind: IgnoreKind, value: &str) -> Result<bool, ServiceError> {
        let item = IgnoreItem {
            kind,
            value: value.trim().to_string(),
        };
        let config = {
            let mut config = self.config.write();
            let before = config.ignore_items.len();
            config.ignore_items.retain(|existing| *existing != item);
            if config.ignore_items.len() == before {
                return Ok(false);
            }
            config.clone()
        };
        save_config(&self.config_path, &config)?;
        self.scans.schedule(ScanRequest::Full);
        Ok(true)
    }

    // An empty patch clears the override. The owning location is rescanned
    // in the background; either way the override is replayed on every later
    // merge of that file.
    pub fn update_metadata(&self, path: &str, patch: &MetadataPatch) -> Result<(), ServiceError> {
        if patch.is_empty() {
            self.store.clear_override(path)?;
        } else {
            self.store.set_override(path, patch)?;
        }
        let owner = self
            .config
            .read()
            .locations
            .iter()
            .find(|root| Path::new(path).starts_with(root.as_str()))
            .cloned();
        if let Some(root) = owner {
            self.scans.schedule(ScanRequest::Merge(vec![root]));
        }
        Ok(())
    }
}
