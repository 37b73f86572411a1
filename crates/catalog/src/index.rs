use std::collections::{HashMap, HashSet};

use common::{AlbumKey, ArtistKey, SongKey};

use crate::catalog::Catalog;

const WORD_BREAKS: [char; 5] = ['-', ' ', '.', ';', ':'];

#[derive(Default)]
struct TrieNode {
    children: HashMap<char, TrieNode>,
    values: HashSet<String>,
}

// The whole trie holds every word from its first character, the substring
// trie every later suffix. Keys sit on each node along the insertion path,
// so walking a term lands on the full match set directly.
#[derive(Default)]
struct Trie {
    whole: TrieNode,
    substrings: TrieNode,
}

impl Trie {
    fn insert(&mut self, text: &str, key: &str) {
        for word in split_words(text) {
            let chars: Vec<char> = word.chars().collect();
            insert_path(&mut self.whole, &chars, key);
            for offset in 1..chars.len() {
                insert_path(&mut self.substrings, &chars[offset..], key);
            }
        }
    }

    // a subterm with no matches empties the whole result
    fn search(&self, term: &str, substrings: bool) -> HashSet<String> {
        let mut result: Option<HashSet<String>> = None;
        for sub in term.split(' ') {
            if sub.is_empty() {
                continue;
            }
            let upper = sub.to_uppercase();
            let mut found = walk(&self.whole, &upper);
            if substrings {
                found.extend(walk(&self.substrings, &upper));
            }
            result = Some(match result {
                None => found,
                Some(acc) => intersect(acc, found),
            });
            if result.as_ref().is_some_and(HashSet::is_empty) {
                break;
            }
        }
        result.unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchResults {
    pub songs: Vec<SongKey>,
    pub albums: Vec<AlbumKey>,
    pub artists: Vec<ArtistKey>,
}

// rebuilt wholesale after every catalog mutation batch
#[derive(Default)]
pub struct SearchIndex {
    songs: Trie,
    albums: Trie,
    artists: Trie,
}

impl SearchIndex {
    pub fn build(catalog: &Catalog) -> SearchIndex {
        let mut index = SearchIndex::default();
        for (key, song) in &catalog.songs {
            index.songs.insert(&song.title, key);
        }
        for (key, album) in &catalog.albums {
            index.albums.insert(&album.title, key);
        }
        for (key, artist) in &catalog.artists {
            index.artists.insert(&artist.name, key);
        }
        index
    }

    pub fn search(&self, substrings: bool, term: &str) -> SearchResults {
        SearchResults {
            songs: sorted(self.songs.search(term, substrings)),
            albums: sorted(self.albums.search(term, substrings)),
            artists: sorted(self.artists.search(term, substrings)),
        }
    }
}

fn split_words(text: &str) -> Vec<String> {
    text.split(WORD_BREAKS)
        .filter(|part| !part.is_empty())
        .map(str::to_uppercase)
        .collect()
}

fn insert_path(root: &mut TrieNode, chars: &[char], key: &str) {
    let mut node = root;
    for ch in chars {
        node = node.children.entry(*ch).or_default();
        node.values.insert(key.to_string());
    }
}

fn walk(root: &TrieNode, term: &str) -> HashSet<String> {
    let mut node = root;
    for ch in term.chars() {
        match node.children.get(&ch) {
            Some(next) => node = next,
            None => return HashSet::new(),
        }
    }
    node.values.clone()
}

fn intersect(a: HashSet<String>, b: HashSet<String>) -> HashSet<String> {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small.into_iter().filter(|k| large.contains(k)).collect()
}

fn sorted(set: HashSet<String>) -> Vec<String> {
    let mut list: Vec<String> = set.into_iter().collect();
    list.sort();
    list
}
