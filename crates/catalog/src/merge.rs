use std::path::Path;

use common::{normalize_name, Album, AlbumKey, Artist, ArtistKey, Song, SongKey, VaType};
use metadata::AudioMetadata;
use tracing::warn;

use crate::catalog::Catalog;
use crate::CatalogError;

struct AlbumResolution {
    key: AlbumKey,
    primary: Vec<ArtistKey>,
    // incoming primaries pushed to secondary by an intersection merge
    demoted: Vec<ArtistKey>,
}

impl Catalog {
    // re-adding a path the catalog already holds replaces the song
    pub fn add_song(
        &mut self,
        location: &str,
        path: &Path,
        meta: &AudioMetadata,
    ) -> Result<SongKey, CatalogError> {
        let key = self.keys.song_key(location, path)?;
        if self.songs.contains_key(&key) {
            self.remove_song(&key);
        }

        let mut primary_keys: Vec<ArtistKey> = Vec::new();
        for name in &meta.artists {
            let artist_key = self.get_or_new_artist(name);
            if !primary_keys.contains(&artist_key) {
                primary_keys.push(artist_key);
            }
        }
        let mut secondary_keys: Vec<ArtistKey> = Vec::new();
        for name in &meta.more_artists {
            let artist_key = self.get_or_new_artist(name);
            if !primary_keys.contains(&artist_key) && !secondary_keys.contains(&artist_key) {
                secondary_keys.push(artist_key);
            }
        }

        let resolution = self.resolve_album(&meta.album, meta.year, &primary_keys, meta.vatype);
        for artist_key in resolution.demoted {
            if !secondary_keys.contains(&artist_key) {
                secondary_keys.push(artist_key);
            }
        }

        let song = Song {
            key: key.clone(),
            path: path.display().to_string(),
            title: meta.title.clone(),
            track: u32::from(meta.track) + 100 * u32::from(meta.disk),
            artist_ids: resolution.primary,
            secondary_ids: secondary_keys,
            album_id: resolution.key.clone(),
            variations: meta.variations.clone(),
        };

        match self.albums.get_mut(&resolution.key) {
            Some(album) => album.songs.push(key.clone()),
            None => {
                warn!("internal inconsistency: resolved album {} vanished", resolution.key)
            }
        }
        for artist_key in song.artist_ids.iter().chain(song.secondary_ids.iter()) {
            let Some(artist) = self.artists.get_mut(artist_key) else {
                warn!("internal inconsistency: resolved artist {} vanished", artist_key);
                continue;
            };
            artist.songs.push(key.clone());
            if !artist.albums.contains(&resolution.key) {
                artist.albums.push(resolution.key.clone());
            }
        }

        self.songs.insert(key.clone(), song);
        Ok(key)
    }

    fn get_or_new_artist(&mut self, name: &str) -> ArtistKey {
        let norm = normalize_name(name);
        if let Some(key) = self.artist_name_index.get(&norm) {
            return key.clone();
        }
        let key = self.keys.artist_key();
        self.artists.insert(
            key.clone(),
            Artist {
                key: key.clone(),
                name: name.trim().to_string(),
                songs: Vec::new(),
                albums: Vec::new(),
            },
        );
        self.artist_name_index.insert(norm, key.clone());
        key
    }

    // Among albums sharing the normalized title and year: a typed song only
    // joins an album of the same type; an untyped song joins an untyped album
    // with the identical artist set, else repairs one it shares artists with
    // (outsiders on both sides become secondary), else folds into a typed
    // album owning that title. Disjoint artist sets stay distinct albums.
    fn resolve_album(
        &mut self,
        title: &str,
        year: u32,
        primary: &[ArtistKey],
        vatype: VaType,
    ) -> AlbumResolution {
        let norm = normalize_name(title);
        let candidates: Vec<AlbumKey> = self
            .album_title_index
            .get(&norm)
            .cloned()
            .unwrap_or_default();

        if vatype != VaType::None {
            for key in &candidates {
                let Some(album) = self.albums.get(key) else {
                    warn!("internal inconsistency: title index lists missing album {}", key);
                    continue;
                };
                if album.year == year && album.vatype == vatype {
                    return AlbumResolution {
                        key: key.clone(),
                        primary: primary.to_vec(),
                        demoted: Vec::new(),
                    };
                }
            }
        } else {
            for key in &candidates {
                let Some(album) = self.albums.get(key) else {
                    continue;
                };
                if album.year == year
                    && album.vatype == VaType::None
                    && same_artist_set(&album.primary_artists, primary)
                {
                    return AlbumResolution {
                        key: key.clone(),
                        primary: primary.to_vec(),
                        demoted: Vec::new(),
                    };
                }
            }

            for key in &candidates {
                let Some(album) = self.albums.get(key) else {
                    continue;
                };
                if album.year != year || album.vatype != VaType::None {
                    continue;
                }
                let intersection: Vec<ArtistKey> = album
                    .primary_artists
                    .iter()
                    .filter(|k| primary.contains(k))
                    .cloned()
                    .collect();
                if intersection.is_empty() {
                    continue;
                }
                let key = key.clone();
                let demoted = primary
                    .iter()
                    .filter(|k| !intersection.contains(k))
                    .cloned()
                    .collect();
                self.demote_album_outsiders(&key, &intersection);
                return AlbumResolution {
                    key,
                    primary: intersection,
                    demoted,
                };
            }

            for key in &candidates {
                let Some(album) = self.albums.get(key) else {
                    continue;
                };
                if album.year == year && album.vatype != VaType::None {
                    return AlbumResolution {
                        key: key.clone(),
                        primary: primary.to_vec(),
                        demoted: Vec::new(),
                    };
                }
            }
        }

        let key = self.keys.album_key();
        let album_primary = if vatype == VaType::None {
            primary.to_vec()
        } else {
            Vec::new()
        };
        self.albums.insert(
            key.clone(),
            Album {
                key: key.clone(),
                title: title.trim().to_string(),
                year,
                vatype,
                primary_artists: album_primary,
                songs: Vec::new(),
            },
        );
        self.album_title_index.entry(norm).or_default().push(key.clone());
        AlbumResolution {
            key,
            primary: primary.to_vec(),
            demoted: Vec::new(),
        }
    }

    // everyone outside `keep` moves to secondary on every song already here
    fn demote_album_outsiders(&mut self, album_key: &AlbumKey, keep: &[ArtistKey]) {
        let Some(album) = self.albums.get_mut(album_key) else {
            return;
        };
        let outsiders: Vec<ArtistKey> = album
            .primary_artists
            .iter()
            .filter(|k| !keep.contains(k))
            .cloned()
            .collect();
        if outsiders.is_empty() {
            return;
        }
        album.primary_artists = keep.to_vec();
        let song_keys = album.songs.clone();

        for song_key in song_keys {
            let Some(song) = self.songs.get_mut(&song_key) else {
                warn!("internal inconsistency: album {} lists missing song {}", album_key, song_key);
                continue;
            };
            for outsider in &outsiders {
                if let Some(pos) = song.artist_ids.iter().position(|k| k == outsider) {
                    song.artist_ids.remove(pos);
                    if !song.secondary_ids.contains(outsider) {
                        song.secondary_ids.push(outsider.clone());
                    }
                }
            }
        }
    }
}

fn same_artist_set(a: &[ArtistKey], b: &[ArtistKey]) -> bool {
    a.len() == b.len() && a.iter().all(|k| b.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(title: &str, artists: &[&str], album: &str, year: u32) -> AudioMetadata {
        AudioMetadata {
            title: title.to_string(),
            artists: artists.iter().map(|a| a.to_string()).collect(),
            album: album.to_string(),
            year,
            ..AudioMetadata::default()
        }
    }

    fn add(catalog: &mut Catalog, file: &str, meta: &AudioMetadata) -> SongKey {
        let path = format!("/music/{}", file);
        catalog.add_song("/music", Path::new(&path), meta).unwrap()
    }

    #[test]
    fn readding_same_path_is_idempotent() {
        let mut catalog = Catalog::new();
        let m = meta("One", &["Ann"], "First", 2001);
        let first = add(&mut catalog, "a/01.flac", &m);
        let second = add(&mut catalog, "a/01.flac", &m);
        assert_eq!(first, second);
        assert_eq!(catalog.stats().songs, 1);
        assert_eq!(catalog.stats().albums, 1);
        assert_eq!(catalog.stats().artists, 1);
        let artist_key = catalog.song(&first).unwrap().artist_ids[0].clone();
        assert_eq!(catalog.artist(&artist_key).unwrap().songs, vec![first]);
    }

    #[test]
    fn same_artist_set_shares_album() {
        let mut catalog = Catalog::new();
        add(&mut catalog, "a/01.flac", &meta("One", &["Ann", "Ben"], "First", 2001));
        add(&mut catalog, "a/02.flac", &meta("Two", &["Ben", "Ann"], "First", 2001));
        assert_eq!(catalog.stats().albums, 1);
        assert_eq!(catalog.stats().songs, 2);
    }

    #[test]
    fn disjoint_artist_sets_make_distinct_albums() {
        let mut catalog = Catalog::new();
        let one = add(&mut catalog, "a/01.flac", &meta("One", &["Ann"], "Same Title", 2001));
        let two = add(&mut catalog, "b/01.flac", &meta("Two", &["Ben"], "Same Title", 2001));
        assert_eq!(catalog.stats().albums, 2);
        let album_one = catalog.song(&one).unwrap().album_id.clone();
        let album_two = catalog.song(&two).unwrap().album_id.clone();
        assert_ne!(album_one, album_two);
    }

    #[test]
    fn year_mismatch_makes_distinct_albums() {
        let mut catalog = Catalog::new();
        add(&mut catalog, "a/01.flac", &meta("One", &["Ann"], "First", 2001));
        add(&mut catalog, "a/02.flac", &meta("Two", &["Ann"], "First", 0));
        assert_eq!(catalog.stats().albums, 2);
    }

    #[test]
    fn intersection_demotes_outsiders_both_ways() {
        let mut catalog = Catalog::new();
        let one = add(&mut catalog, "a/01.flac", &meta("One", &["Ann", "Ben"], "First", 2001));
        let two = add(&mut catalog, "a/02.flac", &meta("Two", &["Ben", "Cay"], "First", 2001));

        assert_eq!(catalog.stats().albums, 1);
        let album_key = catalog.song(&one).unwrap().album_id.clone();
        let album = catalog.album(&album_key).unwrap();
        let ben = catalog.artist_name_index.get("ben").unwrap().clone();
        let ann = catalog.artist_name_index.get("ann").unwrap().clone();
        let cay = catalog.artist_name_index.get("cay").unwrap().clone();
        assert_eq!(album.primary_artists, vec![ben.clone()]);

        let first = catalog.song(&one).unwrap();
        assert_eq!(first.artist_ids, vec![ben.clone()]);
        assert_eq!(first.secondary_ids, vec![ann.clone()]);

        let second = catalog.song(&two).unwrap();
        assert_eq!(second.artist_ids, vec![ben.clone()]);
        assert_eq!(second.secondary_ids, vec![cay.clone()]);

        for key in [ann, ben, cay] {
            assert!(catalog.artist(&key).unwrap().albums.contains(&album_key));
        }
    }

    #[test]
    fn typed_songs_share_typed_album_only() {
        let mut catalog = Catalog::new();
        let mut va = meta("One", &["Ann"], "Hits", 1999);
        va.vatype = VaType::Va;
        let mut ost = meta("Two", &["Ben"], "Hits", 1999);
        ost.vatype = VaType::Ost;
        let one = add(&mut catalog, "a/01.flac", &va);
        let two = add(&mut catalog, "b/01.flac", &ost);

        assert_eq!(catalog.stats().albums, 2);
        let album_one = catalog.album(&catalog.song(&one).unwrap().album_id).unwrap();
        assert_eq!(album_one.vatype, VaType::Va);
        assert!(album_one.primary_artists.is_empty());
        let album_two = catalog.album(&catalog.song(&two).unwrap().album_id).unwrap();
        assert_eq!(album_two.vatype, VaType::Ost);
    }

    #[test]
    fn untyped_song_folds_into_typed_album() {
        let mut catalog = Catalog::new();
        let mut va = meta("One", &["Ann"], "Hits", 1999);
        va.vatype = VaType::Va;
        let one = add(&mut catalog, "a/01.flac", &va);
        let two = add(&mut catalog, "b/01.flac", &meta("Two", &["Ben"], "Hits", 1999));

        assert_eq!(catalog.stats().albums, 1);
        let first = catalog.song(&one).unwrap();
        let second = catalog.song(&two).unwrap();
        assert_eq!(first.album_id, second.album_id);
        // each song keeps its own artists on a typed album
        assert_ne!(first.artist_ids, second.artist_ids);
    }

    #[test]
    fn track_folds_disk_number() {
        let mut catalog = Catalog::new();
        let mut m = meta("One", &["Ann"], "First", 2001);
        m.track = 3;
        m.disk = 2;
        let key = add(&mut catalog, "a/01.flac", &m);
        assert_eq!(catalog.song(&key).unwrap().track, 203);
    }

    #[test]
    fn track_fold_survives_largest_tag_numbers() {
        let mut catalog = Catalog::new();
        let mut m = meta("One", &["Ann"], "First", 2001);
        m.track = u16::MAX;
        m.disk = u16::MAX;
        let key = add(&mut catalog, "a/01.flac", &m);
        assert_eq!(
            catalog.song(&key).unwrap().track,
            u32::from(u16::MAX) + 100 * u32::from(u16::MAX)
        );
    }

    #[test]
    fn featured_artists_become_secondary() {
        let mut catalog = Catalog::new();
        let mut m = meta("One", &["Ann"], "First", 2001);
        m.more_artists = vec!["Guest".to_string()];
        let key = add(&mut catalog, "a/01.flac", &m);

        let song = catalog.song(&key).unwrap();
        assert_eq!(song.artist_ids.len(), 1);
        assert_eq!(song.secondary_ids.len(), 1);
        let guest = song.secondary_ids[0].clone();
        assert_eq!(catalog.artist(&guest).unwrap().songs, vec![key]);
    }

    #[test]
    fn removing_location_cascades() {
        let mut catalog = Catalog::new();
        let m1 = meta("One", &["Ann"], "First", 2001);
        catalog.add_song("/music", Path::new("/music/a/01.flac"), &m1).unwrap();
        let m2 = meta("Two", &["Ann"], "Second", 2002);
        catalog.add_song("/other", Path::new("/other/b/01.flac"), &m2).unwrap();
        let m3 = meta("Three", &["Solo"], "Third", 2003);
        catalog.add_song("/other", Path::new("/other/c/01.flac"), &m3).unwrap();

        let removed = catalog.remove_location("/other");
        assert_eq!(removed, 2);
        assert_eq!(catalog.stats().songs, 1);
        assert_eq!(catalog.stats().albums, 1);
        // Ann survives through the remaining song, Solo is collected
        assert_eq!(catalog.stats().artists, 1);
        assert!(catalog.artist_name_index.contains_key("ann"));
        assert!(!catalog.artist_name_index.contains_key("solo"));
    }

    #[test]
    fn normalized_names_share_entities() {
        let mut catalog = Catalog::new();
        add(&mut catalog, "a/01.flac", &meta("One", &["The  Band"], "First", 2001));
        add(&mut catalog, "a/02.flac", &meta("Two", &["the band"], "FIRST", 2001));
        assert_eq!(catalog.stats().artists, 1);
        assert_eq!(catalog.stats().albums, 1);
    }
}
