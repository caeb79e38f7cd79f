use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// The text fields the scanner checks, normalizes and fixes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagField {
    Artist,
    AlbumArtist,
    Album,
}

impl TagField {
    pub const ALL: [TagField; 3] = [TagField::Artist, TagField::AlbumArtist, TagField::Album];

    /// Human label, as used in prompts and report lines.
    pub fn label(self) -> &'static str {
        match self {
            TagField::Artist => "Artist",
            TagField::AlbumArtist => "Album Artist",
            TagField::Album => "Album",
        }
    }

    /// Short key used in output file names.
    pub fn key(self) -> &'static str {
        match self {
            TagField::Artist => "artist",
            TagField::AlbumArtist => "album_artist",
            TagField::Album => "album",
        }
    }
}

impl fmt::Display for TagField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub fn relpath_from(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(path_to_slash_string(rel))
}

/// Path relative to `root` for display, or the full path when it lies elsewhere.
pub fn display_relpath(root: &Path, path: &Path) -> String {
    relpath_from(root, path).unwrap_or_else(|| path.display().to_string())
}

/// The directory holding `path`. Files at the filesystem root map to an empty path.
pub fn folder_of(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

fn path_to_slash_string(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    parts.join("/")
}
