use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::ScanConfig;

/// What one file contributed to the scan. Produced by scan workers.
#[derive(Debug, Clone, PartialEq)]
pub enum FileEvent<'a> {
    Audio {
        ext: &'a str,
        duration_ms: u64,
        size: u64,
    },
    Corrupt {
        path: &'a Path,
        error: String,
    },
    Image {
        ext: &'a str,
    },
    Video {
        ext: &'a str,
    },
    Other {
        ext: &'a str,
    },
    MarkerRemoved {
        name: &'a str,
    },
    /// A walk or removal failure. Not a file of its own.
    FsIssue {
        path: &'a Path,
        error: String,
    },
    /// Never started because the scan was interrupted.
    Skipped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Audio,
    Image,
    Video,
    Other,
}

/// Buckets a file by its lower-cased extension.
pub fn classify_extension(config: &ScanConfig, ext: &str) -> FileKind {
    let matches = |list: &[String]| list.iter().any(|item| item == ext);
    if matches(&config.audio_extensions) {
        FileKind::Audio
    } else if matches(&config.image_extensions) {
        FileKind::Image
    } else if matches(&config.video_extensions) {
        FileKind::Video
    } else {
        FileKind::Other
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CorruptFile {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FsIssue {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LibraryStats {
    pub total_files: usize,
    /// Readable audio files.
    pub music_files: usize,
    /// Every counted file that was handled without a read failure.
    pub parsed_files: usize,
    pub skipped_files: usize,
    pub audio_extensions: BTreeMap<String, usize>,
    pub image_extensions: BTreeMap<String, usize>,
    pub video_extensions: BTreeMap<String, usize>,
    pub other_extensions: BTreeMap<String, usize>,
    pub corrupt_files: Vec<CorruptFile>,
    pub total_duration_ms: u64,
    pub total_size: u64,
    pub markers_removed: BTreeMap<String, usize>,
    pub fs_issues: Vec<FsIssue>,
}

impl LibraryStats {
    pub fn observe(&mut self, event: &FileEvent<'_>) {
        match event {
            FileEvent::Audio {
                ext,
                duration_ms,
                size,
            } => {
                self.count_file();
                self.music_files += 1;
                bump(&mut self.audio_extensions, ext);
                self.total_duration_ms += duration_ms;
                self.total_size += size;
            }
            FileEvent::Corrupt { path, error } => {
                self.total_files += 1;
                self.corrupt_files.push(CorruptFile {
                    path: path.to_path_buf(),
                    error: error.clone(),
                });
            }
            FileEvent::Image { ext } => {
                self.count_file();
                bump(&mut self.image_extensions, ext);
            }
            FileEvent::Video { ext } => {
                self.count_file();
                bump(&mut self.video_extensions, ext);
            }
            FileEvent::Other { ext } => {
                self.count_file();
                bump(&mut self.other_extensions, ext);
            }
            FileEvent::MarkerRemoved { name } => {
                self.count_file();
                bump(&mut self.markers_removed, name);
            }
            FileEvent::FsIssue { path, error } => {
                self.fs_issues.push(FsIssue {
                    path: path.to_path_buf(),
                    error: error.clone(),
                });
            }
            FileEvent::Skipped => self.skipped_files += 1,
        }
    }

    pub fn merge(&mut self, other: LibraryStats) {
        self.total_files += other.total_files;
        self.music_files += other.music_files;
        self.parsed_files += other.parsed_files;
        self.skipped_files += other.skipped_files;
        merge_counts(&mut self.audio_extensions, other.audio_extensions);
        merge_counts(&mut self.image_extensions, other.image_extensions);
        merge_counts(&mut self.video_extensions, other.video_extensions);
        merge_counts(&mut self.other_extensions, other.other_extensions);
        self.corrupt_files.extend(other.corrupt_files);
        self.total_duration_ms += other.total_duration_ms;
        self.total_size += other.total_size;
        merge_counts(&mut self.markers_removed, other.markers_removed);
        self.fs_issues.extend(other.fs_issues);
    }

    pub fn is_consistent(&self) -> bool {
        self.total_files == self.corrupt_files.len() + self.parsed_files
    }

    pub fn non_audio_files(&self) -> usize {
        [
            &self.image_extensions,
            &self.video_extensions,
            &self.other_extensions,
        ]
        .iter()
        .flat_map(|counts| counts.values())
        .sum()
    }

    /// Sorts the list fields so merged results do not depend on worker order.
    pub fn sort_lists(&mut self) {
        self.corrupt_files.sort_by(|a, b| a.path.cmp(&b.path));
        self.fs_issues.sort_by(|a, b| a.path.cmp(&b.path));
    }

    fn count_file(&mut self) {
        self.total_files += 1;
        self.parsed_files += 1;
    }
}

fn bump(counts: &mut BTreeMap<String, usize>, key: &str) {
    *counts.entry(key.to_string()).or_default() += 1;
}

fn merge_counts(target: &mut BTreeMap<String, usize>, incoming: BTreeMap<String, usize>) {
    for (key, count) in incoming {
        *target.entry(key).or_default() += count;
    }
}
