use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::LibraryError;

pub const CONFIG_ENV: &str = "MUSIC_STATS_CONFIG";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScanConfig {
    /// Worker count. Zero picks twice the available parallelism.
    pub threads: usize,
    pub audio_extensions: Vec<String>,
    pub image_extensions: Vec<String>,
    pub video_extensions: Vec<String>,
    /// File names removed by marker cleanup, matched case-insensitively.
    pub marker_files: Vec<String>,
    /// Skip dot-files entirely; they are not counted.
    pub skip_hidden: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            audio_extensions: to_strings(&[
                "mp3", "flac", "wav", "aac", "ogg", "m4a", "wma", "aiff", "opus", "alac",
            ]),
            image_extensions: to_strings(&[
                "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "ico", "thm", "webp", "svg",
                "raw", "heif", "heic",
            ]),
            video_extensions: to_strings(&[
                "mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg", "ogv",
                "3gp", "3g2", "rm", "rmvb",
            ]),
            marker_files: to_strings(&[
                "desktop.ini",
                "Thumbs.db",
                "AlbumArtSmall.jpg",
                "Folder.jpg",
            ]),
            skip_hidden: true,
        }
    }
}

impl ScanConfig {
    pub fn worker_count(&self) -> usize {
        if self.threads > 0 {
            return self.threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get() * 2)
            .unwrap_or(2)
    }

    /// Lower-cases and strips leading dots so lookups can compare directly.
    pub fn normalized(mut self) -> Self {
        for list in [
            &mut self.audio_extensions,
            &mut self.image_extensions,
            &mut self.video_extensions,
        ] {
            for ext in list.iter_mut() {
                *ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
            }
            list.retain(|ext| !ext.is_empty());
        }
        for name in self.marker_files.iter_mut() {
            *name = name.trim().to_lowercase();
        }
        self.marker_files.retain(|name| !name.is_empty());
        self
    }
}

pub fn config_path_from_env() -> Option<PathBuf> {
    match env::var(CONFIG_ENV) {
        Ok(value) if !value.trim().is_empty() => Some(PathBuf::from(value)),
        _ => None,
    }
}

/// Reads the YAML config at `path`. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<(ScanConfig, bool), LibraryError> {
    if !path.exists() {
        return Ok((ScanConfig::default().normalized(), false));
    }
    let contents = fs::read_to_string(path)?;
    let config: ScanConfig = serde_yaml::from_str(&contents)?;
    Ok((config.normalized(), true))
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}
