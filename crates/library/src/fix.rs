//! Folder-by-folder repair of missing tags.
//!
//! Each folder with files missing the field is prompted once for a value,
//! the value is echoed back for confirmation and then written to every
//! affected file. Declined or blank folders are left untouched.

use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use common::TagField;
use metadata::TagAccessor;
use serde::Serialize;
use tracing::{info, warn};

use crate::normalize::normalize;
use crate::scan::{MissingFieldEntry, WriteFailure};
use crate::CancelFlag;

/// Asks the user for values. Swappable for scripted or batch use.
pub trait Prompter {
    /// Shows the affected files and returns the raw answer. Blank means skip.
    fn ask_value(&mut self, field: TagField, folder: &Path, files: &[PathBuf]) -> io::Result<String>;

    /// Echoes the proposed value and returns true only on explicit agreement.
    fn confirm(&mut self, field: TagField, folder: &Path, value: &str) -> io::Result<bool>;
}

pub struct TerminalPrompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> TerminalPrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn read_answer(&mut self) -> io::Result<String> {
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input closed"));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

impl<R: BufRead, W: Write> Prompter for TerminalPrompter<R, W> {
    fn ask_value(&mut self, field: TagField, folder: &Path, files: &[PathBuf]) -> io::Result<String> {
        writeln!(self.output, "{}", "=".repeat(80))?;
        writeln!(
            self.output,
            "Metadata '{}' missing for tracks in {}.",
            field.label(),
            folder.display()
        )?;
        writeln!(self.output, "Affected files:")?;
        for file in files {
            let name = file
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| file.display().to_string());
            writeln!(self.output, "- {}", name)?;
        }
        write!(
            self.output,
            "Enter {} for this folder (leave blank to skip): ",
            field.label()
        )?;
        self.read_answer()
    }

    fn confirm(&mut self, field: TagField, _folder: &Path, value: &str) -> io::Result<bool> {
        write!(
            self.output,
            "{} will be set to '{}'. Is that OK? (y/N) ",
            field.label(),
            value
        )?;
        let answer = self.read_answer()?;
        Ok(is_affirmative(&answer))
    }
}

pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoValue,
    Declined,
    Interrupted,
}

impl SkipReason {
    pub fn describe(self) -> &'static str {
        match self {
            SkipReason::NoValue => "no value given",
            SkipReason::Declined => "skipped by user",
            SkipReason::Interrupted => "interrupted",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AppliedFolder {
    pub folder: PathBuf,
    pub value: String,
    pub files_written: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SkippedFolder {
    pub folder: PathBuf,
    pub reason: SkipReason,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FixSummary {
    pub field: TagField,
    pub applied: Vec<AppliedFolder>,
    pub skipped: Vec<SkippedFolder>,
    pub failures: Vec<WriteFailure>,
}

impl FixSummary {
    pub fn new(field: TagField) -> Self {
        Self {
            field,
            applied: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn skip(&mut self, folder: &Path, reason: SkipReason) {
        self.skipped.push(SkippedFolder {
            folder: folder.to_path_buf(),
            reason,
        });
    }
}

/// Per-folder progress through a fix.
#[derive(Clone, Debug, PartialEq)]
enum FixState {
    Prompting,
    Confirming(String),
    Applying(String),
    Done,
    Aborted(SkipReason),
}

/// Affected files per folder, folders in path order.
pub fn collect_folders(entries: &[MissingFieldEntry], field: TagField) -> BTreeMap<PathBuf, Vec<PathBuf>> {
    let mut folders: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
    for entry in entries.iter().filter(|entry| entry.field == field) {
        folders
            .entry(entry.folder.clone())
            .or_default()
            .push(entry.path.clone());
    }
    for files in folders.values_mut() {
        files.sort();
        files.dedup();
    }
    folders
}

pub fn run_fix<P, T>(
    field: TagField,
    entries: &[MissingFieldEntry],
    normalize_values: bool,
    prompter: &mut P,
    tags: &T,
    cancel: &CancelFlag,
) -> FixSummary
where
    P: Prompter + ?Sized,
    T: TagAccessor + ?Sized,
{
    let folders = collect_folders(entries, field);
    let mut summary = FixSummary::new(field);
    if folders.is_empty() {
        info!("No folders missing {}", field.label());
        return summary;
    }

    let mut halted = false;
    for (folder, files) in &folders {
        if halted || cancel.is_cancelled() {
            halted = true;
            summary.skip(folder, SkipReason::Interrupted);
            continue;
        }

        let mut state = FixState::Prompting;
        loop {
            state = match state {
                FixState::Prompting => match prompter.ask_value(field, folder, files) {
                    Ok(answer) => {
                        let value = answer.trim();
                        if value.is_empty() {
                            FixState::Aborted(SkipReason::NoValue)
                        } else if normalize_values {
                            FixState::Confirming(normalize(value))
                        } else {
                            FixState::Confirming(value.to_string())
                        }
                    }
                    Err(err) => {
                        warn!("Prompt failed for {:?}: {}", folder, err);
                        halted = true;
                        FixState::Aborted(SkipReason::Interrupted)
                    }
                },
                FixState::Confirming(value) => match prompter.confirm(field, folder, &value) {
                    Ok(true) => FixState::Applying(value),
                    Ok(false) => FixState::Aborted(SkipReason::Declined),
                    Err(err) => {
                        warn!("Prompt failed for {:?}: {}", folder, err);
                        halted = true;
                        FixState::Aborted(SkipReason::Interrupted)
                    }
                },
                FixState::Applying(value) => {
                    let written = apply_value(field, files, &value, tags, &mut summary.failures);
                    info!(
                        "Set {} to '{}' on {}/{} files in {:?}",
                        field.label(),
                        value,
                        written,
                        files.len(),
                        folder
                    );
                    summary.applied.push(AppliedFolder {
                        folder: folder.clone(),
                        value,
                        files_written: written,
                    });
                    FixState::Done
                }
                FixState::Aborted(reason) => {
                    info!("Skipping {:?}: {}", folder, reason.describe());
                    summary.skip(folder, reason);
                    break;
                }
                FixState::Done => break,
            };
        }
    }

    summary
}

fn apply_value<T: TagAccessor + ?Sized>(
    field: TagField,
    files: &[PathBuf],
    value: &str,
    tags: &T,
    failures: &mut Vec<WriteFailure>,
) -> usize {
    let mut written = 0;
    for file in files {
        match tags.write(file, field, value) {
            Ok(()) => written += 1,
            Err(err) => {
                warn!("Failed to set {} for {:?}: {}", field.label(), file, err);
                failures.push(WriteFailure {
                    path: file.clone(),
                    field,
                    error: err.to_string(),
                });
            }
        }
    }
    written
}
