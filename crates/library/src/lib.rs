pub mod config;
pub mod fingerprint;
pub mod fix;
pub mod grouping;
pub mod normalize;
pub mod redundancy;
pub mod report;
pub mod scan;
pub mod stats;
#[cfg(test)]
mod test_support;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use config::{config_path_from_env, load_config, ScanConfig};
pub use fingerprint::{fingerprint, Fingerprint};
pub use fix::{run_fix, FixSummary, Prompter, SkipReason, TerminalPrompter};
pub use grouping::{find_duplicate_tracks, AlbumGroup, AlbumIndex, AlbumKey, DuplicateReport};
pub use normalize::normalize;
pub use redundancy::{classify, RedundancyReport, Verdict};
pub use report::{list_files, render_report, write_json, write_list_files, Report, ReportOptions};
pub use scan::{
    apply_normalization, scan_library, NormalizeMode, ScanOptions, ScanOutcome, TrackRecord,
};
pub use stats::LibraryStats;

/// Shared interrupt switch. Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub enum LibraryError {
    Io(std::io::Error),
    InvalidRoot(PathBuf),
    ThreadPool(rayon::ThreadPoolBuildError),
    Config(serde_yaml::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for LibraryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryError::Io(err) => write!(f, "io error: {}", err),
            LibraryError::InvalidRoot(path) => write!(
                f,
                "the specified directory does not exist or is not a directory: {}",
                path.display()
            ),
            LibraryError::ThreadPool(err) => write!(f, "thread pool error: {}", err),
            LibraryError::Config(err) => write!(f, "config error: {}", err),
            LibraryError::Json(err) => write!(f, "json error: {}", err),
        }
    }
}

impl std::error::Error for LibraryError {}

impl From<std::io::Error> for LibraryError {
    fn from(err: std::io::Error) -> Self {
        LibraryError::Io(err)
    }
}

impl From<rayon::ThreadPoolBuildError> for LibraryError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        LibraryError::ThreadPool(err)
    }
}

impl From<serde_yaml::Error> for LibraryError {
    fn from(err: serde_yaml::Error) -> Self {
        LibraryError::Config(err)
    }
}

impl From<serde_json::Error> for LibraryError {
    fn from(err: serde_json::Error) -> Self {
        LibraryError::Json(err)
    }
}

#[cfg(test)]
mod tests {
    use super::CancelFlag;

    #[test]
    fn cancel_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
    }
}
