use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use common::TagField;
use metadata::{MetadataError, TagAccessor, TagInfo};
use parking_lot::Mutex;

/// In-memory tag store. Paths without an entry read as corrupt.
#[derive(Default)]
pub struct FakeTags {
    tags: Mutex<HashMap<PathBuf, TagInfo>>,
    read_only: HashSet<PathBuf>,
    pub writes: Mutex<Vec<(PathBuf, TagField, String)>>,
}

impl FakeTags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, path: &Path, info: TagInfo) {
        self.tags.lock().insert(path.to_path_buf(), info);
    }

    pub fn deny_writes(&mut self, path: &Path) {
        self.read_only.insert(path.to_path_buf());
    }

    pub fn get(&self, path: &Path) -> Option<TagInfo> {
        self.tags.lock().get(path).cloned()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }
}

impl TagAccessor for FakeTags {
    fn read(&self, path: &Path) -> Result<TagInfo, MetadataError> {
        self.get(path).ok_or_else(|| {
            MetadataError::Io(io::Error::new(io::ErrorKind::InvalidData, "unreadable"))
        })
    }

    fn write(&self, path: &Path, field: TagField, value: &str) -> Result<(), MetadataError> {
        if self.read_only.contains(path) {
            return Err(MetadataError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "read-only",
            )));
        }
        let mut tags = self.tags.lock();
        let info = tags.entry(path.to_path_buf()).or_default();
        let slot = match field {
            TagField::Artist => &mut info.artist,
            TagField::AlbumArtist => &mut info.album_artist,
            TagField::Album => &mut info.album,
        };
        *slot = Some(value.to_string());
        self.writes
            .lock()
            .push((path.to_path_buf(), field, value.to_string()));
        Ok(())
    }
}

pub fn tagged(artist: Option<&str>, album_artist: Option<&str>, album: Option<&str>) -> TagInfo {
    TagInfo {
        artist: artist.map(str::to_string),
        album_artist: album_artist.map(str::to_string),
        album: album.map(str::to_string),
        duration_ms: Some(60_000),
        ..TagInfo::default()
    }
}

/// Creates `rel` under `root` (with parents) holding `contents`.
pub fn touch(root: &Path, rel: &str, contents: &[u8]) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    path
}
