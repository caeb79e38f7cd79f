use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;

use clap::Parser;
use common::TagField;
use library::fix::run_fix;
use library::report::{list_files, render_fix_summary, write_json, write_list_files};
use library::{
    config_path_from_env, load_config, render_report, scan_library, CancelFlag, NormalizeMode,
    Report, ReportOptions, ScanConfig, ScanOptions, TerminalPrompter,
};
use metadata::LoftyTags;
use time::OffsetDateTime;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "music_stats")]
#[command(about = "Scan a music library for statistics, missing tags and redundant copies")]
#[command(version)]
struct Cli {
    /// Root of the music library
    directory: PathBuf,

    /// Debug logging (when RUST_LOG is unset)
    #[arg(short, long)]
    verbose: bool,

    /// Also write the report to FILE
    #[arg(long, value_name = "FILE")]
    log_output: Option<PathBuf>,

    #[arg(long)]
    list_unknown_artist: bool,

    #[arg(long)]
    list_unknown_album_artist: bool,

    #[arg(long)]
    list_unknown_album: bool,

    /// Title-case artist, album artist and album tags and write them back
    #[arg(long)]
    normalize_metadata_capitalization: bool,

    /// Report capitalization changes without writing
    #[arg(long)]
    preview_capitalization: bool,

    /// Hash file contents and list duplicate tracks
    #[arg(long)]
    list_redundant_tracks: bool,

    #[arg(long)]
    list_redundant_albums: bool,

    #[arg(long)]
    list_all_albums: bool,

    /// Delete desktop.ini, Thumbs.db and similar marker files
    #[arg(long)]
    remove_windows_hidden_files: bool,

    #[arg(long)]
    fix_missing_album_artist_by_folder: bool,

    #[arg(long)]
    fix_missing_album_by_folder: bool,

    #[arg(long)]
    fix_missing_artist_by_folder: bool,

    /// Worker threads (default: twice the available cores)
    #[arg(long, value_name = "N")]
    num_threads: Option<usize>,

    /// Write each requested list to its own text file in DIR
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Write a JSON summary to FILE
    #[arg(long, value_name = "FILE")]
    json_report: Option<PathBuf>,

    /// YAML config (falls back to MUSIC_STATS_CONFIG)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl Cli {
    fn normalize_mode(&self) -> NormalizeMode {
        if self.normalize_metadata_capitalization {
            NormalizeMode::Apply
        } else if self.preview_capitalization {
            NormalizeMode::Preview
        } else {
            NormalizeMode::Off
        }
    }

    fn report_options(&self) -> ReportOptions {
        let mut list_missing = Vec::new();
        if self.list_unknown_artist {
            list_missing.push(TagField::Artist);
        }
        if self.list_unknown_album_artist {
            list_missing.push(TagField::AlbumArtist);
        }
        if self.list_unknown_album {
            list_missing.push(TagField::Album);
        }
        ReportOptions {
            list_missing,
            show_normalized: self.normalize_mode() != NormalizeMode::Off,
            list_redundant_albums: self.list_redundant_albums,
            list_redundant_tracks: self.list_redundant_tracks,
            list_all_albums: self.list_all_albums,
        }
    }

    /// Requested fixes, in the order they run.
    fn fixes(&self) -> Vec<TagField> {
        [
            (self.fix_missing_album_artist_by_folder, TagField::AlbumArtist),
            (self.fix_missing_album_by_folder, TagField::Album),
            (self.fix_missing_artist_by_folder, TagField::Artist),
        ]
        .into_iter()
        .filter_map(|(enabled, field)| enabled.then_some(field))
        .collect()
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let mut config = match cli.config.clone().or_else(config_path_from_env) {
        Some(path) => {
            let (config, loaded) = load_config(&path)?;
            if loaded {
                info!("Loaded config from {:?}", path);
            } else {
                warn!("Config {:?} not found; using defaults", path);
            }
            config
        }
        None => ScanConfig::default().normalized(),
    };
    if let Some(threads) = cli.num_threads {
        config.threads = threads;
    }

    let options = ScanOptions {
        config,
        fingerprint: cli.list_redundant_tracks,
        normalize: cli.normalize_mode(),
        remove_markers: cli.remove_windows_hidden_files,
    };

    let cancel = CancelFlag::new();
    spawn_interrupt_listener(cancel.clone());

    let outcome = scan_library(&cli.directory, &options, &LoftyTags, &cancel)?;
    let report_options = cli.report_options();
    let mut report = Report::build(outcome, cli.list_redundant_tracks);

    let mut log_text = render_report(&report, &report_options);
    print!("{}", log_text);

    if let Some(dir) = &cli.output_dir {
        let lists = list_files(&report, &report_options);
        let written = write_list_files(dir, &scanned_basename(&cli.directory), &today(), &lists)?;
        for path in written {
            info!("Wrote {:?}", path);
        }
    }

    if report.interrupted {
        warn!("Skipping fixes after interrupt");
    } else {
        let fixes = cli.fixes();
        if !fixes.is_empty() {
            let stdin = io::stdin();
            let mut prompter = TerminalPrompter::new(stdin.lock(), io::stdout());
            for field in fixes {
                if cancel.is_cancelled() {
                    break;
                }
                let summary = run_fix(
                    field,
                    &report.missing,
                    cli.normalize_metadata_capitalization,
                    &mut prompter,
                    &LoftyTags,
                    &cancel,
                );
                let text = render_fix_summary(&summary, &report.root);
                print!("{}", text);
                log_text.push_str(&text);
                report.fixes.push(summary);
            }
        }
    }

    if let Some(path) = &cli.log_output {
        fs::write(path, &log_text)?;
        info!("Report written to {:?}", path);
    }
    if let Some(path) = &cli.json_report {
        write_json(path, &report)?;
        info!("JSON summary written to {:?}", path);
    }

    Ok(())
}

fn scanned_basename(dir: &Path) -> String {
    dir.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "library".to_string())
}

/// UTC date as YYYY-MM-DD.
fn today() -> String {
    let date = OffsetDateTime::now_utc().date();
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// The first interrupt asks the scan to wind down; a second one exits.
fn spawn_interrupt_listener(cancel: CancelFlag) {
    let spawned = thread::Builder::new()
        .name("interrupt".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    warn!("Failed to start signal runtime: {}", err);
                    return;
                }
            };
            runtime.block_on(async move {
                if !interrupt_signal().await {
                    return;
                }
                warn!("Interrupt received; finishing in-flight files. Press Ctrl-C again to quit.");
                cancel.cancel();
                if interrupt_signal().await {
                    std::process::exit(130);
                }
            });
        });
    if let Err(err) = spawned {
        warn!("Failed to spawn interrupt listener: {}", err);
    }
}

async fn interrupt_signal() -> bool {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                warn!("Failed to install terminate signal handler: {}", err);
                return false;
            }
        };
        return tokio::select! {
            result = tokio::signal::ctrl_c() => result.is_ok(),
            _ = term.recv() => true,
        };
    }

    #[cfg(not(unix))]
    {
        return match tokio::signal::ctrl_c().await {
            Ok(()) => true,
            Err(err) => {
                warn!("Failed to listen for ctrl-c: {}", err);
                false
            }
        };
    }
}
