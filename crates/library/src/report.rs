use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use common::{display_relpath, TagField};
use serde::Serialize;

use crate::fix::FixSummary;
use crate::grouping::{find_duplicate_tracks, group_albums, AlbumGroup, DuplicateReport};
use crate::redundancy::{classify, RedundancyReport, Verdict};
use crate::scan::{MissingFieldEntry, NormalizedChange, ScanOutcome, WriteFailure};
use crate::stats::LibraryStats;
use crate::LibraryError;

const HEADER_WIDTH: usize = 80;

const COL_ALBUM_ARTIST: usize = 25;
const COL_ARTIST: usize = 25;
const COL_ALBUM: usize = 25;
const COL_TRACKS: usize = 11;
const COL_PATH: usize = 95;

/// Everything a run produced, ready for rendering or JSON output.
#[derive(Debug, Serialize)]
pub struct Report {
    pub root: PathBuf,
    pub elapsed_secs: f64,
    pub interrupted: bool,
    pub stats: LibraryStats,
    pub normalized: Vec<NormalizedChange>,
    pub normalized_applied: usize,
    pub write_failures: Vec<WriteFailure>,
    pub missing: Vec<MissingFieldEntry>,
    pub albums: Vec<AlbumGroup>,
    pub redundancy: RedundancyReport,
    pub duplicates: Option<DuplicateReport>,
    pub fixes: Vec<FixSummary>,
}

impl Report {
    /// Groups, classifies and (optionally) pairs duplicate tracks.
    pub fn build(outcome: ScanOutcome, find_duplicates: bool) -> Self {
        let albums = group_albums(&outcome.tracks);
        let redundancy = classify(&albums);
        let duplicates = find_duplicates.then(|| find_duplicate_tracks(&outcome.tracks));
        Self {
            root: outcome.root,
            elapsed_secs: outcome.elapsed.as_secs_f64(),
            interrupted: outcome.interrupted,
            stats: outcome.stats,
            normalized: outcome.normalized,
            normalized_applied: outcome.normalized_applied,
            write_failures: outcome.write_failures,
            missing: outcome.missing,
            albums,
            redundancy,
            duplicates,
            fixes: Vec::new(),
        }
    }

    /// Distinct (album artist, album) identities. Untagged folders count once each.
    pub fn album_count(&self) -> usize {
        let mut identities = BTreeSet::new();
        let mut unknown = 0;
        for group in &self.albums {
            if group.has_unknown {
                unknown += 1;
            } else {
                identities.insert(group.key.identity());
            }
        }
        identities.len() + unknown
    }

    fn rel(&self, path: &Path) -> String {
        display_relpath(&self.root, path)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ReportOptions {
    pub list_missing: Vec<TagField>,
    pub show_normalized: bool,
    pub list_redundant_albums: bool,
    pub list_redundant_tracks: bool,
    pub list_all_albums: bool,
}

/// A flat list written next to the report.
#[derive(Clone, Debug, PartialEq)]
pub struct ListFile {
    pub kind: String,
    pub body: String,
}

pub fn render_report(report: &Report, options: &ReportOptions) -> String {
    let mut out = String::new();
    push_section(&mut out, "LIBRARY STATISTICS", &statistics_section(report, options));
    if report.interrupted {
        return out;
    }

    if options.show_normalized {
        push_section(&mut out, "NORMALIZED METADATA", &normalized_section(report));
    }
    for field in &options.list_missing {
        let title = format!("FILES MISSING METADATA ({})", field.label());
        push_section(&mut out, &title, &missing_section(report, *field));
    }
    if options.list_redundant_albums {
        push_section(&mut out, "POSSIBLE REDUNDANT ALBUMS", &redundant_albums_section(report));
    }
    if options.list_redundant_tracks {
        push_section(&mut out, "REDUNDANT TRACKS", &redundant_tracks_section(report));
    }
    if options.list_all_albums {
        push_section(&mut out, "ALL ALBUMS", &all_albums_section(report));
    }
    out
}

/// The per-category list files implied by `options`.
pub fn list_files(report: &Report, options: &ReportOptions) -> Vec<ListFile> {
    let mut lists = Vec::new();
    if report.interrupted {
        return lists;
    }
    for field in &options.list_missing {
        lists.push(ListFile {
            kind: format!("unknown_{}", field.key()),
            body: missing_section(report, *field),
        });
    }
    if options.show_normalized {
        lists.push(ListFile {
            kind: "normalized_metadata".to_string(),
            body: normalized_section(report),
        });
    }
    if options.list_redundant_albums {
        lists.push(ListFile {
            kind: "redundant_albums".to_string(),
            body: redundant_albums_section(report),
        });
    }
    if options.list_redundant_tracks {
        lists.push(ListFile {
            kind: "redundant_tracks".to_string(),
            body: redundant_tracks_section(report),
        });
    }
    if options.list_all_albums {
        lists.push(ListFile {
            kind: "all_albums".to_string(),
            body: all_albums_section(report),
        });
    }
    lists
}

pub fn render_fix_summary(summary: &FixSummary, root: &Path) -> String {
    let mut body = String::new();
    if summary.applied.is_empty() && summary.skipped.is_empty() {
        body.push_str("No folders needed fixing.\n");
    }
    for applied in &summary.applied {
        let _ = writeln!(
            body,
            "Applied: {} -> '{}' ({} files)",
            display_relpath(root, &applied.folder),
            applied.value,
            applied.files_written
        );
    }
    for skipped in &summary.skipped {
        let _ = writeln!(
            body,
            "Skipped: {} ({})",
            display_relpath(root, &skipped.folder),
            skipped.reason.describe()
        );
    }
    for failure in &summary.failures {
        let _ = writeln!(
            body,
            "Failed: {}: {}",
            display_relpath(root, &failure.path),
            failure.error
        );
    }

    let mut out = String::new();
    let title = format!("FIX SUMMARY ({})", summary.field.label());
    push_section(&mut out, &title, &body);
    out
}

pub fn section_header(title: &str) -> String {
    format!("{:=^width$}", format!(" {} ", title), width = HEADER_WIDTH)
}

fn push_section(out: &mut String, title: &str, body: &str) {
    out.push('\n');
    out.push_str(&section_header(title));
    out.push('\n');
    out.push_str(body);
}

fn statistics_section(report: &Report, options: &ReportOptions) -> String {
    let stats = &report.stats;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} Files parsed in: {} (h:m:s)",
        stats.total_files,
        format_duration((report.elapsed_secs * 1000.0) as u64)
    );
    if report.interrupted {
        let _ = writeln!(
            out,
            "Scan interrupted: {} files were not processed. Statistics are partial.",
            stats.skipped_files
        );
    }

    let categories = [
        ("Audio", &stats.audio_extensions),
        ("Image", &stats.image_extensions),
        ("Video", &stats.video_extensions),
        ("Other", &stats.other_extensions),
    ];
    for (label, counts) in categories {
        if counts.is_empty() {
            continue;
        }
        let _ = writeln!(out, "\nTotal {} File Count:", label);
        for (ext, count) in counts {
            let ext = if ext.is_empty() { "(none)" } else { ext.as_str() };
            let _ = writeln!(out, "{}: {}", ext, count);
        }
    }

    if !stats.corrupt_files.is_empty() {
        let _ = writeln!(out, "\nCorrupt files: {}", stats.corrupt_files.len());
        for corrupt in &stats.corrupt_files {
            let _ = writeln!(out, "    -{} ({})", report.rel(&corrupt.path), corrupt.error);
        }
    }
    if !stats.markers_removed.is_empty() {
        let _ = writeln!(out, "\nMarker files removed:");
        for (name, count) in &stats.markers_removed {
            let _ = writeln!(out, "{}: {}", name, count);
        }
    }
    if !stats.fs_issues.is_empty() {
        let _ = writeln!(out, "\nFilesystem issues: {}", stats.fs_issues.len());
        for issue in &stats.fs_issues {
            let _ = writeln!(out, "    -{} ({})", report.rel(&issue.path), issue.error);
        }
    }

    let _ = writeln!(out, "\nTotal number of files: {}", stats.total_files);
    let _ = writeln!(out, "Total number of music files: {}", stats.music_files);
    let _ = writeln!(
        out,
        "Total duration of supported audio files: {}",
        format_duration(stats.total_duration_ms)
    );
    let _ = writeln!(
        out,
        "Total size of supported audio files: {}",
        format_size(stats.total_size)
    );
    if report.interrupted {
        return out;
    }

    let _ = writeln!(out, "Total number of albums: {}", report.album_count());
    let _ = writeln!(out, "Total number of album folders: {}", report.albums.len());
    let multi_disc = report.redundancy.multi_disc().count();
    if multi_disc > 0 {
        let _ = writeln!(out, "Total number of multi-disc sets: {}", multi_disc);
    }
    if options.list_redundant_albums {
        let _ = writeln!(
            out,
            "Total number of possible redundant albums: {}",
            report.redundancy.redundant_album_count()
        );
        let _ = writeln!(
            out,
            "Track Count of possibly redundant albums: {}",
            report.redundancy.redundant_track_count()
        );
    }
    if let Some(duplicates) = &report.duplicates {
        let _ = writeln!(out, "Total redundant track pairs found: {}", duplicates.pairs.len());
        let _ = writeln!(out, "Total fingerprint collisions detected: {}", duplicates.collisions);
    }
    out
}

fn normalized_section(report: &Report) -> String {
    let mut out = String::new();
    if report.normalized.is_empty() {
        out.push_str("No tracks changed.\n");
        return out;
    }
    for change in &report.normalized {
        let _ = writeln!(
            out,
            "{} | '{}' -> '{}' | {}",
            change.field.label(),
            change.original,
            change.updated,
            report.rel(&change.path)
        );
    }
    if report.normalized_applied > 0 {
        let _ = writeln!(out, "\n{} tags written.", report.normalized_applied);
    }
    if !report.write_failures.is_empty() {
        let _ = writeln!(out, "\nFailed writes: {}", report.write_failures.len());
        for failure in &report.write_failures {
            let _ = writeln!(
                out,
                "    -{} | {} | {}",
                failure.field.label(),
                report.rel(&failure.path),
                failure.error
            );
        }
    }
    out
}

fn missing_section(report: &Report, field: TagField) -> String {
    let mut out = String::new();
    let mut any = false;
    for entry in report.missing.iter().filter(|entry| entry.field == field) {
        any = true;
        let _ = writeln!(out, "{}", report.rel(&entry.path));
    }
    if !any {
        out.push_str("No files missing metadata.\n");
    }
    out
}

fn redundant_albums_section(report: &Report) -> String {
    let mut out = String::new();
    let mut any = false;
    for bucket in report.redundancy.redundant() {
        any = true;
        if let Verdict::Redundant(reason) = bucket.verdict {
            let _ = writeln!(out, "Reason     : {}", reason.describe());
        }
        for (idx, group) in bucket.groups.iter().enumerate() {
            if idx > 0 {
                out.push('\n');
            }
            let _ = writeln!(out, "Album Name : {}", group.album);
            let _ = writeln!(out, "Artist     : {}", group.album_artist);
            let _ = writeln!(out, "Path       : {}", report.rel(&group.directory));
            let _ = writeln!(out, "Track Count: {}", group.track_count());
        }
        let _ = writeln!(out, "{}", "=".repeat(HEADER_WIDTH));
    }
    if !any {
        out.push_str("No redundant albums found.\n");
    }
    out
}

fn redundant_tracks_section(report: &Report) -> String {
    let mut out = String::new();
    let duplicates = match &report.duplicates {
        Some(duplicates) if !duplicates.pairs.is_empty() => duplicates,
        _ => {
            out.push_str("No redundant tracks found.\n");
            return out;
        }
    };
    for pair in &duplicates.pairs {
        let _ = writeln!(out, "Duplicate Pair:");
        for (idx, track) in [&pair.first, &pair.second].into_iter().enumerate() {
            let _ = writeln!(out, "{}. {}", idx + 1, report.rel(&track.path));
            let _ = writeln!(out, "   Artist: {}", track.artist.as_deref().unwrap_or(""));
            let _ = writeln!(
                out,
                "   Album Artist: {}",
                track.album_artist.as_deref().unwrap_or("")
            );
            let _ = writeln!(out, "   Album: {}", track.album.as_deref().unwrap_or(""));
            let _ = writeln!(out, "   File Size: {} bytes", track.size);
        }
        let _ = writeln!(out, "{}", "-".repeat(HEADER_WIDTH));
    }
    out
}

fn all_albums_section(report: &Report) -> String {
    let mut albums: Vec<&AlbumGroup> = report.albums.iter().collect();
    albums.sort_by_cached_key(|group| {
        (
            group.album_artist.to_lowercase(),
            group.artist.to_lowercase(),
            group.album.to_lowercase(),
            group.directory.clone(),
        )
    });

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<a$} | {:<b$} | {:<c$} | {:<d$} | {:<e$}",
        "ALBUM ARTIST",
        "ALBUM",
        "ARTIST",
        "TRACK COUNT",
        "PATH",
        a = COL_ALBUM_ARTIST,
        b = COL_ALBUM,
        c = COL_ARTIST,
        d = COL_TRACKS,
        e = COL_PATH
    );
    let rule = COL_ALBUM_ARTIST + COL_ALBUM + COL_ARTIST + COL_TRACKS + COL_PATH + 12;
    let _ = writeln!(out, "{}", "=".repeat(rule));
    for group in albums {
        let tracks = format!("Tracks: {}", group.track_count());
        let line = format!(
            "{:<a$} | {:<b$} | {:<c$} | {:<d$} | {:<e$}",
            truncate(&group.album_artist, COL_ALBUM_ARTIST),
            truncate(&group.album, COL_ALBUM),
            truncate(&group.artist, COL_ARTIST),
            tracks,
            truncate(&report.rel(&group.directory), COL_PATH),
            a = COL_ALBUM_ARTIST,
            b = COL_ALBUM,
            c = COL_ARTIST,
            d = COL_TRACKS,
            e = COL_PATH
        );
        let _ = writeln!(out, "{}", line.trim_end());
    }
    out
}

/// Cuts `text` to `max` characters, ending in "..." when shortened.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Milliseconds as `hh:mm:ss`. Hours are not capped.
pub fn format_duration(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

pub fn format_size(bytes: u64) -> String {
    let bytes = bytes as f64;
    format!(
        "{:.2} GB / {:.2} GiB",
        bytes / 1_000_000_000.0,
        bytes / (1024.0 * 1024.0 * 1024.0)
    )
}

/// Writes each list to `<basename>_<kind>_<date>_<n>.txt` in `dir`, taking the
/// first `n` not already on disk. Returns the paths written.
pub fn write_list_files(
    dir: &Path,
    basename: &str,
    date: &str,
    lists: &[ListFile],
) -> Result<Vec<PathBuf>, LibraryError> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(lists.len());
    for list in lists {
        let (path, file) = create_unique(dir, basename, &list.kind, date)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(list.body.as_bytes())?;
        writer.flush()?;
        written.push(path);
    }
    Ok(written)
}

fn create_unique(dir: &Path, basename: &str, kind: &str, date: &str) -> io::Result<(PathBuf, File)> {
    let mut counter = 0usize;
    loop {
        let path = dir.join(format!("{}_{}_{}_{}.txt", basename, kind, date, counter));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => counter += 1,
            Err(err) => return Err(err),
        }
    }
}

pub fn write_json(path: &Path, report: &Report) -> Result<(), LibraryError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        format_duration, format_size, list_files, render_fix_summary, render_report,
        section_header, truncate, write_json, write_list_files, ListFile, Report, ReportOptions,
    };
    use crate::fix::{AppliedFolder, FixSummary, SkipReason, SkippedFolder};
    use crate::scan::{MissingFieldEntry, NormalizedChange, ScanOutcome, TrackRecord};
    use crate::stats::{FileEvent, LibraryStats};
    use common::TagField;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    fn record(path: &str, artist: &str, album: &str, fingerprint: u64) -> TrackRecord {
        TrackRecord {
            path: PathBuf::from(path),
            artist: Some(artist.to_string()),
            album_artist: Some(artist.to_string()),
            album: Some(album.to_string()),
            size: 1_000,
            fingerprint: Some(fingerprint),
            ..TrackRecord::default()
        }
    }

    fn outcome(tracks: Vec<TrackRecord>) -> ScanOutcome {
        let mut stats = LibraryStats::default();
        for _ in &tracks {
            stats.observe(&FileEvent::Audio {
                ext: "mp3",
                duration_ms: 3_723_000,
                size: 1_000,
            });
        }
        ScanOutcome {
            root: PathBuf::from("/m"),
            stats,
            tracks,
            missing: vec![MissingFieldEntry {
                path: PathBuf::from("/m/Loose/01.mp3"),
                folder: PathBuf::from("/m/Loose"),
                field: TagField::Artist,
            }],
            normalized: vec![NormalizedChange {
                path: PathBuf::from("/m/A/Album/track1.mp3"),
                field: TagField::Album,
                original: "shredding the guitar ii".to_string(),
                updated: "Shredding the Guitar II".to_string(),
            }],
            write_failures: Vec::new(),
            normalized_applied: 0,
            interrupted: false,
            elapsed: Duration::from_secs(65),
        }
    }

    fn all_options() -> ReportOptions {
        ReportOptions {
            list_missing: vec![TagField::Artist],
            show_normalized: true,
            list_redundant_albums: true,
            list_redundant_tracks: true,
            list_all_albums: true,
        }
    }

    fn copied_album() -> Report {
        let tracks = vec![
            record("/m/X/Album/01.mp3", "Guitar Man", "Shred", 1),
            record("/m/X/Album/02.mp3", "Guitar Man", "Shred", 2),
            record("/m/X/Album (Copy)/01.mp3", "Guitar Man", "Shred", 1),
            record("/m/Z/Other/01.mp3", "Zed", "Other", 3),
        ];
        Report::build(outcome(tracks), true)
    }

    #[test]
    fn headers_are_centered() {
        let header = section_header("ALL ALBUMS");
        assert_eq!(header.chars().count(), 80);
        assert!(header.starts_with("====="));
        assert!(header.contains(" ALL ALBUMS "));
    }

    #[test]
    fn truncates_long_values() {
        assert_eq!(truncate("short", 25), "short");
        assert_eq!(truncate("abcdefghij", 8), "abcde...");
        assert_eq!(truncate("ééééééé", 5), "éé...");
    }

    #[test]
    fn formats_duration_and_size() {
        assert_eq!(format_duration(3_723_000), "01:02:03");
        assert_eq!(format_duration(0), "00:00:00");
        assert_eq!(format_duration(360_000_000), "100:00:00");
        assert_eq!(format_size(1_073_741_824), "1.07 GB / 1.00 GiB");
    }

    #[test]
    fn renders_every_requested_section() {
        let report = copied_album();
        let text = render_report(&report, &all_options());

        assert!(text.contains("4 Files parsed in: 00:01:05 (h:m:s)"));
        assert!(text.contains("mp3: 4"));
        assert!(text.contains("Total number of albums: 2"));
        assert!(text.contains("Total number of album folders: 3"));
        assert!(text.contains("Total number of possible redundant albums: 1"));
        assert!(text.contains("Track Count of possibly redundant albums: 1"));
        assert!(text.contains("Total redundant track pairs found: 1"));
        assert!(text.contains("Total fingerprint collisions detected: 1"));
        assert!(text.contains("Album | 'shredding the guitar ii' -> 'Shredding the Guitar II' | A/Album/track1.mp3"));
        assert!(text.contains("Loose/01.mp3"));
        assert!(text.contains("Path       : X/Album (Copy)"));
        assert!(text.contains("1. X/Album/01.mp3"));
        assert!(text.contains("2. X/Album (Copy)/01.mp3"));
        assert!(text.contains("Tracks: 2"));
    }

    #[test]
    fn all_albums_are_sorted_case_insensitively() {
        let tracks = vec![
            record("/m/b/1.mp3", "beta", "One", 1),
            record("/m/a/1.mp3", "Alpha", "Two", 2),
        ];
        let report = Report::build(outcome(tracks), false);
        let options = ReportOptions {
            list_all_albums: true,
            ..ReportOptions::default()
        };
        let text = render_report(&report, &options);
        let alpha = text.find("Alpha").unwrap();
        let beta = text.find("beta").unwrap();
        assert!(alpha < beta);
    }

    #[test]
    fn interrupted_report_shows_statistics_only() {
        let mut scan = outcome(vec![record("/m/X/Album/01.mp3", "A", "B", 1)]);
        scan.interrupted = true;
        scan.stats.observe(&FileEvent::Skipped);
        let report = Report::build(scan, true);
        let text = render_report(&report, &all_options());
        assert!(text.contains("LIBRARY STATISTICS"));
        assert!(text.contains("Scan interrupted: 1 files were not processed"));
        assert!(!text.contains("ALL ALBUMS"));
        assert!(!text.contains("Total number of albums"));
        assert!(list_files(&report, &all_options()).is_empty());
    }

    #[test]
    fn list_files_never_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let lists = vec![ListFile {
            kind: "unknown_artist".to_string(),
            body: "Loose/01.mp3\n".to_string(),
        }];
        let first = write_list_files(dir.path(), "Music", "2024-05-01", &lists).unwrap();
        let second = write_list_files(dir.path(), "Music", "2024-05-01", &lists).unwrap();
        assert_eq!(first[0], dir.path().join("Music_unknown_artist_2024-05-01_0.txt"));
        assert_eq!(second[0], dir.path().join("Music_unknown_artist_2024-05-01_1.txt"));
        assert_eq!(fs::read_to_string(&second[0]).unwrap(), "Loose/01.mp3\n");
    }

    #[test]
    fn list_kinds_follow_options() {
        let report = copied_album();
        let kinds: Vec<String> = list_files(&report, &all_options())
            .into_iter()
            .map(|list| list.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                "unknown_artist",
                "normalized_metadata",
                "redundant_albums",
                "redundant_tracks",
                "all_albums"
            ]
        );
    }

    #[test]
    fn fix_summary_lists_applied_and_skipped() {
        let mut summary = FixSummary::new(TagField::Artist);
        summary.applied.push(AppliedFolder {
            folder: PathBuf::from("/m/A"),
            value: "Guitar Man".to_string(),
            files_written: 2,
        });
        summary.skipped.push(SkippedFolder {
            folder: PathBuf::from("/m/B"),
            reason: SkipReason::Declined,
        });
        let text = render_fix_summary(&summary, Path::new("/m"));
        assert!(text.contains("FIX SUMMARY (Artist)"));
        assert!(text.contains("Applied: A -> 'Guitar Man' (2 files)"));
        assert!(text.contains("Skipped: B (skipped by user)"));
    }

    #[test]
    fn json_summary_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_json(&path, &copied_album()).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["stats"]["total_files"], 4);
        assert_eq!(value["redundancy"]["buckets"][0]["verdict"]["verdict"], "redundant");
        assert_eq!(
            value["redundancy"]["buckets"][0]["verdict"]["reason"],
            "missing_disc_tags"
        );
    }
}
