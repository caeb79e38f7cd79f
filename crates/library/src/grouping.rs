use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::fingerprint::Fingerprint;
use crate::scan::TrackRecord;

/// Placeholder for a missing album or album-artist tag.
pub const UNKNOWN: &str = "Unknown";

/// (album artist, album, directory). Names are trimmed and lower-cased.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AlbumKey {
    pub album_artist: String,
    pub album: String,
    pub directory: PathBuf,
}

impl AlbumKey {
    pub fn for_track(track: &TrackRecord) -> Self {
        Self {
            album_artist: fold_name(track.album_artist.as_deref().unwrap_or(UNKNOWN)),
            album: fold_name(track.album.as_deref().unwrap_or(UNKNOWN)),
            directory: track.folder(),
        }
    }

    /// The directory-independent part, used to find the same album elsewhere.
    pub fn identity(&self) -> (&str, &str) {
        (&self.album_artist, &self.album)
    }
}

pub fn fold_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AlbumGroup {
    #[serde(skip)]
    pub key: AlbumKey,
    /// First-seen spelling of the album artist.
    pub album_artist: String,
    pub album: String,
    /// First-seen track artist.
    pub artist: String,
    pub directory: PathBuf,
    pub tracks: Vec<PathBuf>,
    pub disc_numbers: BTreeSet<u16>,
    pub untagged_disc_tracks: usize,
    pub max_disc: Option<u16>,
    /// Some track lacked the album or album-artist tag.
    pub has_unknown: bool,
}

impl AlbumGroup {
    fn new(key: AlbumKey, track: &TrackRecord) -> Self {
        Self {
            album_artist: display_name(track.album_artist.as_deref()),
            album: display_name(track.album.as_deref()),
            artist: display_name(track.artist.as_deref()),
            directory: key.directory.clone(),
            key,
            tracks: Vec::new(),
            disc_numbers: BTreeSet::new(),
            untagged_disc_tracks: 0,
            max_disc: None,
            has_unknown: false,
        }
    }

    fn push(&mut self, track: &TrackRecord) {
        self.tracks.push(track.path.clone());
        match track.disc_no {
            Some(disc) => {
                self.disc_numbers.insert(disc);
                self.max_disc = self.max_disc.max(Some(disc));
            }
            None => self.untagged_disc_tracks += 1,
        }
        if track.album.is_none() || track.album_artist.is_none() {
            self.has_unknown = true;
        }
        if self.artist == UNKNOWN {
            if let Some(artist) = track.artist.as_deref() {
                self.artist = artist.to_string();
            }
        }
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }
}

fn display_name(value: Option<&str>) -> String {
    value.unwrap_or(UNKNOWN).trim().to_string()
}

/// Incremental album grouping. Insertion order does not affect the result.
#[derive(Debug, Default)]
pub struct AlbumIndex {
    groups: HashMap<AlbumKey, AlbumGroup>,
}

impl AlbumIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, track: &TrackRecord) {
        let key = AlbumKey::for_track(track);
        self.groups
            .entry(key.clone())
            .or_insert_with(|| AlbumGroup::new(key, track))
            .push(track);
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Groups sorted by (album artist, album, directory). Track lists are sorted by path.
    pub fn into_groups(self) -> Vec<AlbumGroup> {
        let mut groups: Vec<AlbumGroup> = self.groups.into_values().collect();
        for group in &mut groups {
            group.tracks.sort();
        }
        groups.sort_by(|a, b| a.key.cmp(&b.key));
        groups
    }
}

pub fn group_albums(tracks: &[TrackRecord]) -> Vec<AlbumGroup> {
    let mut index = AlbumIndex::new();
    for track in tracks {
        index.insert(track);
    }
    index.into_groups()
}

/// Two tracks with equal content and equal tags. `first` has the smaller path.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DuplicatePair {
    pub first: TrackRecord,
    pub second: TrackRecord,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DuplicateReport {
    pub pairs: Vec<DuplicatePair>,
    /// Tracks whose fingerprint had already been seen, regardless of tags.
    pub collisions: usize,
}

type DuplicateKey<'a> = (
    Fingerprint,
    Option<&'a str>,
    Option<&'a str>,
    Option<&'a str>,
);

pub fn find_duplicate_tracks(tracks: &[TrackRecord]) -> DuplicateReport {
    let mut seen: HashSet<Fingerprint> = HashSet::new();
    let mut collisions = 0;
    let mut buckets: HashMap<DuplicateKey<'_>, Vec<&TrackRecord>> = HashMap::new();

    for track in tracks {
        let fingerprint = match track.fingerprint {
            Some(value) => value,
            None => continue,
        };
        if !seen.insert(fingerprint) {
            collisions += 1;
        }
        let key = (
            fingerprint,
            track.artist.as_deref(),
            track.album.as_deref(),
            track.album_artist.as_deref(),
        );
        buckets.entry(key).or_default().push(track);
    }

    let mut pairs = Vec::new();
    for (_, mut bucket) in buckets {
        if bucket.len() < 2 {
            continue;
        }
        bucket.sort_by(|a, b| a.path.cmp(&b.path));
        bucket.dedup_by(|a, b| a.path == b.path);
        for (idx, first) in bucket.iter().enumerate() {
            for second in &bucket[idx + 1..] {
                pairs.push(DuplicatePair {
                    first: (*first).clone(),
                    second: (*second).clone(),
                });
            }
        }
    }
    pairs.sort_by(|a, b| pair_order(a).cmp(&pair_order(b)));

    DuplicateReport { pairs, collisions }
}

fn pair_order(pair: &DuplicatePair) -> (&Path, &Path) {
    (pair.first.path.as_path(), pair.second.path.as_path())
}
