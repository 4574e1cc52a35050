//! Per-file outcomes and the end-of-batch summary.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::geom::StageTimings;

/// Every input converted, or the drop folder was empty.
pub const EXIT_SUCCESS: u8 = 0;
/// Configuration or usage error, or no eligible input in file/directory mode.
pub const EXIT_USAGE: u8 = 1;
/// Built without a CAD kernel.
pub const EXIT_NO_KERNEL: u8 = 2;
/// At least one file failed after the whole batch ran.
pub const EXIT_PARTIAL_FAILURE: u8 = 3;

/// Pipeline stage a file failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Export,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Load => "load",
            Self::Export => "export",
        })
    }
}

/// What happened to the source file after a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relocation {
    /// The run mode leaves sources in place.
    NotRequested,
    Moved(PathBuf),
    /// The move failed; the conversion still counts.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedFile {
    pub output: PathBuf,
    pub triangle_count: usize,
    pub shape_count: usize,
    pub strategy: &'static str,
    /// [`crate::geom::MeshDiagnostics::summary`] of the merged mesh.
    pub diagnostics: String,
    pub relocation: Relocation,
    pub timings: StageTimings,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConversionResult {
    Success(ConvertedFile),
    Failure { stage: Stage, reason: String },
}

impl ConversionResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileOutcome {
    pub source: PathBuf,
    pub result: ConversionResult,
}

impl FileOutcome {
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// One human-readable line, as printed after each file.
    #[must_use]
    pub fn line(&self) -> String {
        let name = self
            .source
            .file_name()
            .map_or_else(|| self.source.display().to_string(), |n| n.to_string_lossy().into_owned());
        match &self.result {
            ConversionResult::Success(file) => {
                let mut line = format!(
                    "OK: {name} -> {} ({} triangles, {})",
                    file.output.display(),
                    file.triangle_count,
                    file.strategy
                );
                if let Relocation::Failed(reason) = &file.relocation {
                    line.push_str(&format!(" [WARN: {reason}]"));
                }
                line
            }
            ConversionResult::Failure { stage, reason } => {
                format!("FAILED ({stage}): {name}: {reason}")
            }
        }
    }
}

/// Ordered outcomes of one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    outcomes: Vec<FileOutcome>,
}

impl BatchReport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, outcome: FileOutcome) {
        self.outcomes.push(outcome);
    }

    #[must_use]
    pub fn outcomes(&self) -> &[FileOutcome] {
        &self.outcomes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn converted(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| !o.result.is_success())
    }

    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_success())
    }

    #[must_use]
    pub fn exit_code(&self) -> u8 {
        if self.all_succeeded() {
            EXIT_SUCCESS
        } else {
            EXIT_PARTIAL_FAILURE
        }
    }

    /// Stage timings summed over converted files.
    #[must_use]
    pub fn total_timings(&self) -> StageTimings {
        let mut total = StageTimings::default();
        for outcome in &self.outcomes {
            if let ConversionResult::Success(file) = &outcome.result {
                total.accumulate(&file.timings);
            }
        }
        total
    }

    /// `Done. 2/3 converted.` followed by one line per failure.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut text = format!("Done. {}/{} converted.", self.converted().count(), self.len());
        for outcome in self.failed() {
            if let ConversionResult::Failure { stage, reason } = &outcome.result {
                text.push_str(&format!(
                    "\n  failed ({stage}): {}: {reason}",
                    outcome.source.display()
                ));
            }
        }
        text
    }
}
