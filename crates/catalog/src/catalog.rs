use std::collections::HashMap;
use std::path::{Path, PathBuf};

use common::{
    normalize_name, Album, AlbumKey, Artist, ArtistKey, CatalogStats, FlatCatalog, Song, SongKey,
};
use tracing::warn;

use crate::keys::KeyAllocator;

#[derive(Clone, Default)]
pub struct Catalog {
    pub(crate) songs: HashMap<SongKey, Song>,
    pub(crate) albums: HashMap<AlbumKey, Album>,
    pub(crate) artists: HashMap<ArtistKey, Artist>,
    pub(crate) album_title_index: HashMap<String, Vec<AlbumKey>>,
    pub(crate) artist_name_index: HashMap<String, ArtistKey>,
    pub(crate) pictures: HashMap<AlbumKey, PathBuf>,
    pub(crate) keys: KeyAllocator,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn song(&self, key: &str) -> Option<&Song> {
        self.songs.get(key)
    }

    pub fn album(&self, key: &str) -> Option<&Album> {
        self.albums.get(key)
    }

    pub fn artist(&self, key: &str) -> Option<&Artist> {
        self.artists.get(key)
    }

    pub fn cover(&self, album_key: &str) -> Option<&Path> {
        self.pictures.get(album_key).map(PathBuf::as_path)
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    pub fn stats(&self) -> CatalogStats {
        CatalogStats {
            songs: self.songs.len(),
            albums: self.albums.len(),
            artists: self.artists.len(),
        }
    }

    // albums and artists left without songs go too
    pub fn remove_song(&mut self, key: &SongKey) {
        let Some(song) = self.songs.remove(key) else {
            return;
        };

        let mut emptied_artists: Vec<ArtistKey> = Vec::new();
        for artist_key in song.artist_ids.iter().chain(song.secondary_ids.iter()) {
            let Some(artist) = self.artists.get_mut(artist_key) else {
                warn!("internal inconsistency: song {} lists missing artist {}", key, artist_key);
                continue;
            };
            artist.songs.retain(|k| k != key);
            if artist.songs.is_empty() && !emptied_artists.contains(artist_key) {
                emptied_artists.push(artist_key.clone());
            }
        }

        let mut emptied_album = None;
        match self.albums.get_mut(&song.album_id) {
            Some(album) => {
                album.songs.retain(|k| k != key);
                if album.songs.is_empty() {
                    emptied_album = Some(song.album_id.clone());
                }
            }
            None => {
                warn!("internal inconsistency: song {} lists missing album {}", key, song.album_id);
            }
        }
        if let Some(album_key) = emptied_album {
            self.remove_album(&album_key);
        }

        for artist_key in emptied_artists {
            self.remove_artist(&artist_key);
        }
    }

    pub fn remove_location(&mut self, location: &str) -> usize {
        let root = Path::new(location);
        let doomed: Vec<SongKey> = self
            .songs
            .values()
            .filter(|song| Path::new(&song.path).starts_with(root))
            .map(|song| song.key.clone())
            .collect();
        for key in &doomed {
            self.remove_song(key);
        }
        doomed.len()
    }

    pub(crate) fn remove_album(&mut self, key: &AlbumKey) {
        let Some(album) = self.albums.remove(key) else {
            return;
        };
        self.pictures.remove(key);
        let norm = normalize_name(&album.title);
        let emptied = match self.album_title_index.get_mut(&norm) {
            Some(list) => {
                list.retain(|k| k != key);
                list.is_empty()
            }
            None => false,
        };
        if emptied {
            self.album_title_index.remove(&norm);
        }
        for artist in self.artists.values_mut() {
            artist.albums.retain(|k| k != key);
        }
    }

    fn remove_artist(&mut self, key: &ArtistKey) {
        let Some(artist) = self.artists.remove(key) else {
            return;
        };
        let norm = normalize_name(&artist.name);
        if self.artist_name_index.get(&norm) == Some(key) {
            self.artist_name_index.remove(&norm);
        }
    }

    // sorted by key so snapshots are deterministic
    pub fn flatten(&self) -> FlatCatalog {
        let mut songs: Vec<Song> = self.songs.values().cloned().collect();
        let mut albums: Vec<Album> = self.albums.values().cloned().collect();
        let mut artists: Vec<Artist> = self.artists.values().cloned().collect();
        songs.sort_by(|a, b| a.key.cmp(&b.key));
        albums.sort_by(|a, b| a.key.cmp(&b.key));
        artists.sort_by(|a, b| a.key.cmp(&b.key));
        FlatCatalog {
            songs,
            albums,
            artists,
        }
    }

    pub fn from_flat(flat: FlatCatalog) -> Self {
        let mut catalog = Catalog::new();

        for artist in flat.artists {
            catalog.keys.observe(&artist.key);
            catalog
                .artist_name_index
                .insert(normalize_name(&artist.name), artist.key.clone());
            catalog.artists.insert(artist.key.clone(), artist);
        }
        for album in flat.albums {
            catalog.keys.observe(&album.key);
            catalog
                .album_title_index
                .entry(normalize_name(&album.title))
                .or_default()
                .push(album.key.clone());
            catalog.albums.insert(album.key.clone(), album);
        }
        for song in flat.songs {
            if !catalog.albums.contains_key(&song.album_id) {
                warn!("snapshot song {} lists missing album {}, dropped", song.key, song.album_id);
                continue;
            }
            let missing_artist = song
                .artist_ids
                .iter()
                .chain(song.secondary_ids.iter())
                .find(|k| !catalog.artists.contains_key(*k));
            if let Some(artist_key) = missing_artist {
                warn!("snapshot song {} lists missing artist {}, dropped", song.key, artist_key);
                continue;
            }
            catalog.keys.observe_song(&song.key, &song.path);
            catalog.songs.insert(song.key.clone(), song);
        }

        catalog.scrub_dangling();
        catalog
    }

    fn scrub_dangling(&mut self) {
        let mut dropped = 0usize;

        let songs = &self.songs;
        let artists = &self.artists;
        for album in self.albums.values_mut() {
            let before = album.songs.len();
            album.songs.retain(|k| songs.contains_key(k));
            dropped += before - album.songs.len();

            let before = album.primary_artists.len();
            album.primary_artists.retain(|k| artists.contains_key(k));
            dropped += before - album.primary_artists.len();
        }

        let albums = &self.albums;
        for artist in self.artists.values_mut() {
            let before = artist.songs.len();
            artist.songs.retain(|k| songs.contains_key(k));
            dropped += before - artist.songs.len();

            let before = artist.albums.len();
            artist.albums.retain(|k| albums.contains_key(k));
            dropped += before - artist.albums.len();
        }

        if dropped > 0 {
            warn!("dropped {} dangling references while loading snapshot", dropped);
        }
    }
}
