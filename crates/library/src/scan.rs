use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use common::{folder_of, TagField};
use metadata::{TagAccessor, TagInfo};
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::ScanConfig;
use crate::fingerprint::{fingerprint, Fingerprint};
use crate::normalize::normalize;
use crate::stats::{classify_extension, FileEvent, FileKind, LibraryStats};
use crate::{CancelFlag, LibraryError};

const PROGRESS_EVERY: usize = 500;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NormalizeMode {
    #[default]
    Off,
    /// Compute and report changes without writing.
    Preview,
    /// Write changes back after the scan.
    Apply,
}

#[derive(Clone, Debug, Default)]
pub struct ScanOptions {
    pub config: ScanConfig,
    /// Hash file contents for duplicate-track detection.
    pub fingerprint: bool,
    pub normalize: NormalizeMode,
    pub remove_markers: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TrackRecord {
    pub path: PathBuf,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub disc_no: Option<u16>,
    pub total_discs: Option<u16>,
    pub duration_ms: u32,
    pub size: u64,
    pub fingerprint: Option<Fingerprint>,
}

impl TrackRecord {
    fn from_tags(path: PathBuf, info: TagInfo, size: u64, fingerprint: Option<Fingerprint>) -> Self {
        Self {
            path,
            artist: info.artist,
            album_artist: info.album_artist,
            album: info.album,
            disc_no: info.disc_no,
            total_discs: info.total_discs,
            duration_ms: info.duration_ms.unwrap_or(0),
            size,
            fingerprint,
        }
    }

    pub fn field(&self, field: TagField) -> Option<&str> {
        match field {
            TagField::Artist => self.artist.as_deref(),
            TagField::AlbumArtist => self.album_artist.as_deref(),
            TagField::Album => self.album.as_deref(),
        }
    }

    pub fn set_field(&mut self, field: TagField, value: String) {
        let slot = match field {
            TagField::Artist => &mut self.artist,
            TagField::AlbumArtist => &mut self.album_artist,
            TagField::Album => &mut self.album,
        };
        *slot = Some(value);
    }

    pub fn folder(&self) -> PathBuf {
        folder_of(&self.path)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct MissingFieldEntry {
    pub path: PathBuf,
    pub folder: PathBuf,
    pub field: TagField,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NormalizedChange {
    pub path: PathBuf,
    pub field: TagField,
    pub original: String,
    pub updated: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WriteFailure {
    pub path: PathBuf,
    pub field: TagField,
    pub error: String,
}

/// Per-worker accumulator. Merged once all workers finish.
#[derive(Debug, Default)]
pub struct ScanBuffers {
    pub stats: LibraryStats,
    pub tracks: Vec<TrackRecord>,
    pub missing: Vec<MissingFieldEntry>,
    pub normalized: Vec<NormalizedChange>,
}

impl ScanBuffers {
    pub fn merge(mut self, other: ScanBuffers) -> ScanBuffers {
        self.stats.merge(other.stats);
        self.tracks.extend(other.tracks);
        self.missing.extend(other.missing);
        self.normalized.extend(other.normalized);
        self
    }
}

#[derive(Debug)]
pub struct ScanOutcome {
    pub root: PathBuf,
    pub stats: LibraryStats,
    /// Sorted by path.
    pub tracks: Vec<TrackRecord>,
    pub missing: Vec<MissingFieldEntry>,
    pub normalized: Vec<NormalizedChange>,
    pub write_failures: Vec<WriteFailure>,
    /// Normalization changes written back to disk.
    pub normalized_applied: usize,
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl ScanOutcome {
    pub fn missing_for(&self, field: TagField) -> Vec<&MissingFieldEntry> {
        self.missing
            .iter()
            .filter(|entry| entry.field == field)
            .collect()
    }
}

struct ScanProgress {
    total: usize,
    done: AtomicUsize,
    last_folder: Mutex<Option<PathBuf>>,
}

impl ScanProgress {
    fn new(total: usize) -> Self {
        Self {
            total,
            done: AtomicUsize::new(0),
            last_folder: Mutex::new(None),
        }
    }

    fn record(&self, file: &Path) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        let folder = folder_of(file);
        {
            let mut last = self.last_folder.lock();
            if last.as_deref() != Some(folder.as_path()) {
                debug!("Scanning {:?}", folder);
                *last = Some(folder);
            }
        }
        if done % PROGRESS_EVERY == 0 || done == self.total {
            info!("Processed {}/{} files", done, self.total);
        }
    }
}

struct FileEntry {
    path: PathBuf,
    size: u64,
}

pub fn scan_library<T: TagAccessor + ?Sized>(
    root: &Path,
    options: &ScanOptions,
    tags: &T,
    cancel: &CancelFlag,
) -> Result<ScanOutcome, LibraryError> {
    if !root.is_dir() {
        return Err(LibraryError::InvalidRoot(root.to_path_buf()));
    }
    let started = Instant::now();

    let mut walk_stats = LibraryStats::default();
    let files = collect_files(root, &options.config, &mut walk_stats);
    let workers = options.config.worker_count();
    info!("Found {} files; scanning with {} threads", files.len(), workers);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()?;
    let progress = ScanProgress::new(files.len());

    let buffers = pool.install(|| {
        files
            .par_iter()
            .fold(ScanBuffers::default, |mut buffers, entry| {
                if cancel.is_cancelled() {
                    buffers.stats.observe(&FileEvent::Skipped);
                    return buffers;
                }
                process_file(entry, options, tags, &mut buffers);
                progress.record(&entry.path);
                buffers
            })
            .reduce(ScanBuffers::default, ScanBuffers::merge)
    });

    let ScanBuffers {
        mut stats,
        mut tracks,
        mut missing,
        mut normalized,
    } = buffers;
    stats.merge(walk_stats);
    stats.sort_lists();
    tracks.sort_by(|a, b| a.path.cmp(&b.path));
    missing.sort();
    normalized.sort_by(|a, b| a.path.cmp(&b.path).then(a.field.cmp(&b.field)));

    let interrupted = cancel.is_cancelled();
    if interrupted {
        warn!(
            "Scan interrupted; {} files were not processed",
            stats.skipped_files
        );
    }

    let mut outcome = ScanOutcome {
        root: root.to_path_buf(),
        stats,
        tracks,
        missing,
        normalized,
        write_failures: Vec::new(),
        normalized_applied: 0,
        interrupted,
        elapsed: Duration::ZERO,
    };

    if options.normalize == NormalizeMode::Apply {
        if interrupted {
            warn!("Skipping normalization write-back after interrupt");
        } else {
            apply_normalization(&mut outcome, tags);
        }
    }

    outcome.elapsed = started.elapsed();
    Ok(outcome)
}

/// Writes every pending normalization change and refreshes the in-memory records.
/// Returns the number of fields written.
pub fn apply_normalization<T: TagAccessor + ?Sized>(outcome: &mut ScanOutcome, tags: &T) -> usize {
    let mut applied = 0;
    for change in &outcome.normalized {
        match tags.write(&change.path, change.field, &change.updated) {
            Ok(()) => {
                applied += 1;
                debug!(
                    "Normalized {} '{}' -> '{}' in {:?}",
                    change.field, change.original, change.updated, change.path
                );
                if let Ok(idx) = outcome
                    .tracks
                    .binary_search_by(|track| track.path.as_path().cmp(change.path.as_path()))
                {
                    outcome.tracks[idx].set_field(change.field, change.updated.clone());
                }
            }
            Err(err) => {
                warn!("Failed to write {} for {:?}: {}", change.field, change.path, err);
                outcome.write_failures.push(WriteFailure {
                    path: change.path.clone(),
                    field: change.field,
                    error: err.to_string(),
                });
            }
        }
    }
    outcome.normalized_applied += applied;
    applied
}

fn collect_files(root: &Path, config: &ScanConfig, stats: &mut LibraryStats) -> Vec<FileEntry> {
    let skip_hidden = config.skip_hidden;
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !(skip_hidden && entry.depth() > 0 && is_hidden(entry.file_name())));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                warn!("Failed to walk {:?}: {}", path, err);
                stats.observe(&FileEvent::FsIssue {
                    path: &path,
                    error: err.to_string(),
                });
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let size = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
        files.push(FileEntry {
            path: entry.into_path(),
            size,
        });
    }
    files
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn process_file<T: TagAccessor + ?Sized>(
    entry: &FileEntry,
    options: &ScanOptions,
    tags: &T,
    buffers: &mut ScanBuffers,
) {
    let path = entry.path.as_path();
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    if options.remove_markers && is_marker(&options.config, &file_name) {
        match fs::remove_file(path) {
            Ok(()) => {
                debug!("Removed {:?}", path);
                buffers
                    .stats
                    .observe(&FileEvent::MarkerRemoved { name: &file_name });
                return;
            }
            Err(err) => {
                warn!("Failed to remove {:?}: {}", path, err);
                buffers.stats.observe(&FileEvent::FsIssue {
                    path,
                    error: err.to_string(),
                });
            }
        }
    }

    match classify_extension(&options.config, &ext) {
        FileKind::Audio => process_audio(entry, &ext, options, tags, buffers),
        FileKind::Image => buffers.stats.observe(&FileEvent::Image { ext: &ext }),
        FileKind::Video => buffers.stats.observe(&FileEvent::Video { ext: &ext }),
        FileKind::Other => buffers.stats.observe(&FileEvent::Other { ext: &ext }),
    }
}

fn process_audio<T: TagAccessor + ?Sized>(
    entry: &FileEntry,
    ext: &str,
    options: &ScanOptions,
    tags: &T,
    buffers: &mut ScanBuffers,
) {
    let path = entry.path.as_path();
    let info = match tags.read(path) {
        Ok(info) => info,
        Err(err) => {
            warn!("Failed to read tags for {:?}: {:?}", path, err);
            buffers.stats.observe(&FileEvent::Corrupt {
                path,
                error: err.to_string(),
            });
            return;
        }
    };

    let content_hash = if options.fingerprint {
        match fingerprint(path) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("Failed to hash {:?}: {}", path, err);
                buffers.stats.observe(&FileEvent::Corrupt {
                    path,
                    error: err.to_string(),
                });
                return;
            }
        }
    } else {
        None
    };

    buffers.stats.observe(&FileEvent::Audio {
        ext,
        duration_ms: u64::from(info.duration_ms.unwrap_or(0)),
        size: entry.size,
    });

    let folder = folder_of(path);
    for field in TagField::ALL {
        match info.field(field) {
            None => buffers.missing.push(MissingFieldEntry {
                path: path.to_path_buf(),
                folder: folder.clone(),
                field,
            }),
            Some(value) if options.normalize != NormalizeMode::Off => {
                let updated = normalize(value);
                if updated != value {
                    buffers.normalized.push(NormalizedChange {
                        path: path.to_path_buf(),
                        field,
                        original: value.to_string(),
                        updated,
                    });
                }
            }
            Some(_) => {}
        }
    }

    buffers.tracks.push(TrackRecord::from_tags(
        path.to_path_buf(),
        info,
        entry.size,
        content_hash,
    ));
}

fn is_marker(config: &ScanConfig, file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    config
        .marker_files
        .iter()
        .any(|marker| marker.trim().to_lowercase() == lower)
}
