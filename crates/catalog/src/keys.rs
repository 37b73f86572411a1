use std::collections::HashMap;
use std::path::Path;

use common::{relpath_from, AlbumKey, ArtistKey, SongKey};

use crate::CatalogError;

pub const SONG_PREFIX: char = 'S';
pub const ALBUM_PREFIX: char = 'L';
pub const ARTIST_PREFIX: char = 'R';

const SONG_KEY_RETRIES: u32 = 32;

// Song keys are content-addressed so a file keeps its key across rescans and
// restarts; album and artist keys are counters, unique per catalog lifetime.
#[derive(Clone, Default)]
pub struct KeyAllocator {
    next_album: u64,
    next_artist: u64,
    assigned: HashMap<SongKey, String>,
}

impl KeyAllocator {
    pub fn album_key(&mut self) -> AlbumKey {
        let key = format!("{}{}", ALBUM_PREFIX, to_base36(self.next_album));
        self.next_album += 1;
        key
    }

    pub fn artist_key(&mut self) -> ArtistKey {
        let key = format!("{}{}", ARTIST_PREFIX, to_base36(self.next_artist));
        self.next_artist += 1;
        key
    }

    // a different path landing on the same hash re-hashes with a salt
    pub fn song_key(&mut self, location: &str, path: &Path) -> Result<SongKey, CatalogError> {
        let rel = relpath_from(Path::new(location), path)
            .ok_or_else(|| CatalogError::ForeignPath(path.display().to_string()))?;
        let path_str = path.display().to_string();
        for salt in 0..SONG_KEY_RETRIES {
            let key = hash_song_key(location, &rel, salt);
            match self.assigned.get(&key) {
                None => {
                    self.assigned.insert(key.clone(), path_str);
                    return Ok(key);
                }
                Some(existing) if *existing == path_str => return Ok(key),
                Some(_) => continue,
            }
        }
        Err(CatalogError::KeyCollision(path_str))
    }

    // bumps the counters past a key seen in a loaded snapshot
    pub fn observe(&mut self, key: &str) {
        if let Some(rest) = key.strip_prefix(ALBUM_PREFIX) {
            if let Some(value) = from_base36(rest) {
                self.next_album = self.next_album.max(value + 1);
            }
        } else if let Some(rest) = key.strip_prefix(ARTIST_PREFIX) {
            if let Some(value) = from_base36(rest) {
                self.next_artist = self.next_artist.max(value + 1);
            }
        }
    }

    pub fn observe_song(&mut self, key: &SongKey, path: &str) {
        self.assigned.insert(key.clone(), path.to_string());
    }
}

fn hash_song_key(location: &str, rel: &str, salt: u32) -> SongKey {
    let mut hasher = blake3::Hasher::new();
    hasher.update(location.as_bytes());
    hasher.update(&[0x1f]);
    hasher.update(rel.as_bytes());
    if salt > 0 {
        hasher.update(&[0x1f]);
        hasher.update(&salt.to_le_bytes());
    }
    let digest = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    format!("{}{}", SONG_PREFIX, to_base36(u64::from_le_bytes(head)))
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    out.into_iter().map(char::from).collect()
}

fn from_base36(text: &str) -> Option<u64> {
    if text.is_empty() {
        return None;
    }
    u64::from_str_radix(text, 36).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_keys_are_sequential() {
        let mut keys = KeyAllocator::default();
        assert_eq!(keys.album_key(), "L0");
        assert_eq!(keys.album_key(), "L1");
        assert_eq!(keys.artist_key(), "R0");
    }

    #[test]
    fn song_keys_are_stable_per_path() {
        let mut keys = KeyAllocator::default();
        let first = keys.song_key("/music", Path::new("/music/a/01.flac")).unwrap();
        let again = keys.song_key("/music", Path::new("/music/a/01.flac")).unwrap();
        assert_eq!(first, again);
        assert!(first.starts_with('S'));

        let mut fresh = KeyAllocator::default();
        let other = fresh.song_key("/music", Path::new("/music/a/01.flac")).unwrap();
        assert_eq!(first, other);
    }

    #[test]
    fn song_keys_differ_by_path_and_location() {
        let mut keys = KeyAllocator::default();
        let a = keys.song_key("/music", Path::new("/music/a/01.flac")).unwrap();
        let b = keys.song_key("/music", Path::new("/music/b/01.flac")).unwrap();
        assert_ne!(a, b);

        let mut fresh = KeyAllocator::default();
        let c = fresh.song_key("/other", Path::new("/other/a/01.flac")).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn rejects_path_outside_location() {
        let mut keys = KeyAllocator::default();
        let err = keys
            .song_key("/music", Path::new("/elsewhere/01.flac"))
            .unwrap_err();
        assert!(matches!(err, CatalogError::ForeignPath(_)));
    }

    #[test]
    fn observe_resumes_counters() {
        let mut keys = KeyAllocator::default();
        keys.observe("La");
        keys.observe("R3");
        keys.observe("Sxyz");
        assert_eq!(keys.album_key(), "Lb");
        assert_eq!(keys.artist_key(), "R4");
    }

    #[test]
    fn base36_round_trips() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(from_base36("10"), Some(36));
        assert_eq!(from_base36(""), None);
    }
}
