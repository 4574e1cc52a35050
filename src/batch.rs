//! Discovery, per-file conversion and drop-folder bookkeeping.
//!
//! The filesystem is the only ledger: a file waiting in the input root is
//! pending, a file in `<input>/_processed/` is done. Nothing else is recorded,
//! so rerunning over an unchanged drop folder touches nothing.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

use crate::config::ResolvedConfig;
use crate::export::{ExportError, Exporter, output_path_for};
use crate::geom::{StageMetrics, TimingBucket};
use crate::kernel::CadKernel;
use crate::loader::{GeometryLoader, LoadError};
use crate::report::{BatchReport, ConversionResult, ConvertedFile, FileOutcome, Relocation, Stage};

/// Drop-folder input directory, next to the executable.
pub const INPUT_DIR_NAME: &str = "STEP-INPUT";
/// Drop-folder output directory, next to the executable.
pub const OUTPUT_DIR_NAME: &str = "STL-OUTPUT";
/// Where converted sources are moved, inside the input directory.
pub const PROCESSED_DIR_NAME: &str = "_processed";

const STEP_EXTENSIONS: [&str; 2] = ["step", "stp"];

const SUFFIX_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day]-[hour][minute][second]");

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Failure of one file's conversion, tagged with its stage.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

impl ConvertError {
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::Load(_) => Stage::Load,
            Self::Export(_) => Stage::Export,
        }
    }
}

/// The conversion succeeded but the source could not be moved aside.
#[derive(Debug, Error)]
#[error("could not move {} -> {}: {source}", from.display(), to.display())]
pub struct RelocationError {
    pub from: PathBuf,
    pub to: PathBuf,
    #[source]
    pub source: io::Error,
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("input {} does not exist", path.display())]
    MissingInput { path: PathBuf },

    #[error("{} is not a .step/.stp file", path.display())]
    UnsupportedFile { path: PathBuf },

    #[error("cannot scan {}: {source}", path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Discovery
// ─────────────────────────────────────────────────────────────────────────────

/// True for `.step` / `.stp` in any letter case.
#[must_use]
pub fn is_step_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| STEP_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

/// STEP files directly inside `dir`, sorted by file name. Subdirectories
/// (including `_processed/`) are not entered.
///
/// # Errors
///
/// Returns the I/O error from listing `dir`.
pub fn discover(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && is_step_file(&path) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// STEP files anywhere below `dir`, skipping `_processed` directories,
/// sorted by path.
///
/// # Errors
///
/// Returns the first I/O error met while walking.
pub fn discover_recursive(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            let kind = entry.file_type()?;
            if kind.is_dir() {
                if entry.file_name() != PROCESSED_DIR_NAME {
                    pending.push(path);
                }
            } else if kind.is_file() && is_step_file(&path) {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

// ─────────────────────────────────────────────────────────────────────────────
// Planning
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// `<base>/STEP-INPUT` → `<base>/STL-OUTPUT`, sources moved to `_processed/`.
    DropFolder,
    Directory { recursive: bool },
    SingleFile,
}

/// One file to convert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub source: PathBuf,
    pub output: PathBuf,
    /// Set in drop-folder mode.
    pub processed_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    mode: RunMode,
    input_root: PathBuf,
    output_root: PathBuf,
    jobs: Vec<Job>,
}

impl BatchPlan {
    /// Plans a drop-folder run rooted at `base`. A missing input directory
    /// yields an empty plan; [`BatchPlan::prepare`] creates it.
    ///
    /// # Errors
    ///
    /// [`PlanError::Scan`] when the input directory exists but cannot be listed.
    pub fn drop_folder(base: &Path, config: &ResolvedConfig) -> Result<Self, PlanError> {
        let input_root = base.join(INPUT_DIR_NAME);
        let output_root = config
            .out_dir()
            .map_or_else(|| base.join(OUTPUT_DIR_NAME), Path::to_path_buf);
        let processed = input_root.join(PROCESSED_DIR_NAME);

        let sources = if input_root.is_dir() {
            discover(&input_root).map_err(|source| PlanError::Scan {
                path: input_root.clone(),
                source,
            })?
        } else {
            Vec::new()
        };

        let jobs = sources
            .into_iter()
            .map(|source| Job {
                output: output_path_for(&source, &output_root),
                source,
                processed_dir: Some(processed.clone()),
            })
            .collect();

        Ok(Self::new(RunMode::DropFolder, input_root, output_root, jobs))
    }

    /// Plans a directory run. With `recursive`, the relative sub-path of each
    /// file is mirrored under `output_root`.
    ///
    /// # Errors
    ///
    /// [`PlanError::MissingInput`] or [`PlanError::Scan`].
    pub fn directory(dir: &Path, recursive: bool, output_root: &Path) -> Result<Self, PlanError> {
        if !dir.is_dir() {
            return Err(PlanError::MissingInput {
                path: dir.to_path_buf(),
            });
        }
        let scan = |source| PlanError::Scan {
            path: dir.to_path_buf(),
            source,
        };
        let sources = if recursive {
            discover_recursive(dir).map_err(scan)?
        } else {
            discover(dir).map_err(scan)?
        };

        let jobs = sources
            .into_iter()
            .map(|source| {
                let sub = source
                    .parent()
                    .and_then(|parent| parent.strip_prefix(dir).ok())
                    .map_or_else(PathBuf::new, Path::to_path_buf);
                Job {
                    output: output_path_for(&source, &output_root.join(sub)),
                    source,
                    processed_dir: None,
                }
            })
            .collect();

        Ok(Self::new(
            RunMode::Directory { recursive },
            dir.to_path_buf(),
            output_root.to_path_buf(),
            jobs,
        ))
    }

    /// Plans a single-file run.
    ///
    /// # Errors
    ///
    /// [`PlanError::MissingInput`] or [`PlanError::UnsupportedFile`].
    pub fn single_file(path: &Path, output_root: &Path) -> Result<Self, PlanError> {
        if !path.is_file() {
            return Err(PlanError::MissingInput {
                path: path.to_path_buf(),
            });
        }
        if !is_step_file(path) {
            return Err(PlanError::UnsupportedFile {
                path: path.to_path_buf(),
            });
        }
        let input_root = path.parent().map_or_else(PathBuf::new, Path::to_path_buf);
        let job = Job {
            source: path.to_path_buf(),
            output: output_path_for(path, output_root),
            processed_dir: None,
        };
        Ok(Self::new(
            RunMode::SingleFile,
            input_root,
            output_root.to_path_buf(),
            vec![job],
        ))
    }

    /// Jobs arrive in discovery order. A later source whose output name is
    /// already taken (`a.step` and `a.stp`) gets its extension folded into
    /// the name, `a-stp.stl`, plus a counter if that clashes too.
    fn new(mode: RunMode, input_root: PathBuf, output_root: PathBuf, mut jobs: Vec<Job>) -> Self {
        let mut taken = HashSet::new();
        for job in &mut jobs {
            if !taken.contains(&job.output) {
                taken.insert(job.output.clone());
                continue;
            }
            let renamed = disambiguated_output(&job.source, &job.output, &taken);
            log::warn!(
                "{} would overwrite {}; writing {} instead",
                job.source.display(),
                job.output.display(),
                renamed.display()
            );
            taken.insert(renamed.clone());
            job.output = renamed;
        }
        Self {
            mode,
            input_root,
            output_root,
            jobs,
        }
    }

    #[must_use]
    pub fn mode(&self) -> &RunMode {
        &self.mode
    }

    #[must_use]
    pub fn input_root(&self) -> &Path {
        &self.input_root
    }

    #[must_use]
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    #[must_use]
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Creates the drop-folder input directory and the output root.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from directory creation.
    pub fn prepare(&self) -> io::Result<()> {
        if self.mode == RunMode::DropFolder {
            fs::create_dir_all(&self.input_root)?;
        }
        fs::create_dir_all(&self.output_root)
    }

    /// `source -> output` lines for `--dry-run`.
    #[must_use]
    pub fn describe(&self) -> Vec<String> {
        self.jobs
            .iter()
            .map(|job| {
                let mut line = format!("{} -> {}", job.source.display(), job.output.display());
                if let Some(dir) = &job.processed_dir {
                    line.push_str(&format!(" (then moved to {})", dir.display()));
                }
                line
            })
            .collect()
    }
}

fn disambiguated_output(source: &Path, output: &Path, taken: &HashSet<PathBuf>) -> PathBuf {
    let dir = output.parent().map_or_else(PathBuf::new, Path::to_path_buf);
    let stem = source
        .file_stem()
        .map_or_else(|| "mesh".to_string(), |s| s.to_string_lossy().into_owned());
    let ext = source
        .extension()
        .map(|e| format!("-{}", e.to_string_lossy()))
        .unwrap_or_default();

    let candidate = dir.join(format!("{stem}{ext}.stl"));
    if !taken.contains(&candidate) {
        return candidate;
    }
    (2u32..)
        .map(|n| dir.join(format!("{stem}{ext}-{n}.stl")))
        .find(|path| !taken.contains(path))
        .unwrap_or(candidate)
}

// ─────────────────────────────────────────────────────────────────────────────
// Relocation
// ─────────────────────────────────────────────────────────────────────────────

/// Moves `source` into `processed_dir`. An existing file of the same name is
/// never overwritten: the new one gets a `-YYYYMMDD-HHMMSS` suffix, then `-2`,
/// `-3`, ... if that is taken too.
///
/// # Errors
///
/// [`RelocationError`] when the directory cannot be created or the rename fails.
pub fn relocate(
    source: &Path,
    processed_dir: &Path,
    now: OffsetDateTime,
) -> Result<PathBuf, RelocationError> {
    let fail = |to: PathBuf, source_err: io::Error| RelocationError {
        from: source.to_path_buf(),
        to,
        source: source_err,
    };

    fs::create_dir_all(processed_dir).map_err(|e| fail(processed_dir.to_path_buf(), e))?;

    let file_name = source
        .file_name()
        .ok_or_else(|| fail(processed_dir.to_path_buf(), io::Error::other("source has no file name")))?;
    let mut dest = processed_dir.join(file_name);

    if dest.exists() {
        let stem = source
            .file_stem()
            .map_or_else(String::new, |s| s.to_string_lossy().into_owned());
        let ext = source
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let stamp = now
            .format(SUFFIX_FORMAT)
            .map_err(|e| fail(dest.clone(), io::Error::other(e)))?;

        dest = processed_dir.join(format!("{stem}-{stamp}{ext}"));
        let mut n = 2u32;
        while dest.exists() {
            dest = processed_dir.join(format!("{stem}-{stamp}-{n}{ext}"));
            n += 1;
        }
        log::debug!("{} already processed once, using {}", source.display(), dest.display());
    }

    fs::rename(source, &dest).map_err(|e| fail(dest.clone(), e))?;
    Ok(dest)
}

/// Local wall-clock time, or UTC when the local offset cannot be determined.
#[must_use]
pub fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

// ─────────────────────────────────────────────────────────────────────────────
// Orchestration
// ─────────────────────────────────────────────────────────────────────────────

/// Runs the load → export → relocate pipeline over a plan.
pub struct Converter<'k, K: CadKernel> {
    loader: GeometryLoader<'k, K::Shape>,
    exporter: Exporter<'k, K>,
}

impl<'k, K: CadKernel> Converter<'k, K> {
    /// Standard loader chain for `kernel`.
    #[must_use]
    pub fn new(kernel: &'k K, config: &ResolvedConfig) -> Self {
        Self::with_loader(kernel, config, GeometryLoader::for_kernel(kernel))
    }

    #[must_use]
    pub fn with_loader(
        kernel: &'k K,
        config: &ResolvedConfig,
        loader: GeometryLoader<'k, K::Shape>,
    ) -> Self {
        Self {
            loader,
            exporter: Exporter::new(kernel, config),
        }
    }

    /// Converts one file. The loaded shapes are dropped before returning.
    ///
    /// # Errors
    ///
    /// [`ConvertError`] naming the failed stage.
    pub fn convert(
        &self,
        source: &Path,
        output: &Path,
        metrics: &mut StageMetrics,
    ) -> Result<ConvertedFile, ConvertError> {
        let geometry = metrics.time(TimingBucket::Load, || self.loader.load(source))?;
        let summary = self.exporter.export(source, &geometry, output, metrics)?;
        Ok(ConvertedFile {
            output: summary.output,
            triangle_count: summary.triangle_count,
            shape_count: geometry.len(),
            strategy: geometry.strategy(),
            diagnostics: summary.diagnostics.summary(),
            relocation: Relocation::NotRequested,
            timings: metrics.end(),
        })
    }

    /// Converts every job in order. A failed file never stops the batch.
    #[must_use]
    pub fn run(&self, plan: &BatchPlan) -> BatchReport {
        let mut report = BatchReport::new();
        let mut metrics = StageMetrics::default();

        for job in plan.jobs() {
            metrics.begin();
            let result = match self.convert(&job.source, &job.output, &mut metrics) {
                Ok(mut converted) => {
                    if let Some(processed) = &job.processed_dir {
                        converted.relocation = metrics.time(TimingBucket::Relocation, || {
                            match relocate(&job.source, processed, local_now()) {
                                Ok(dest) => Relocation::Moved(dest),
                                Err(err) => {
                                    log::warn!("{err}");
                                    Relocation::Failed(err.to_string())
                                }
                            }
                        });
                        converted.timings = metrics.end();
                    }
                    ConversionResult::Success(converted)
                }
                Err(err) => {
                    log::error!("{err}");
                    ConversionResult::Failure {
                        stage: err.stage(),
                        reason: err.to_string(),
                    }
                }
            };

            let outcome = FileOutcome {
                source: job.source.clone(),
                result,
            };
            log::info!("{}", outcome.line());
            report.push(outcome);
        }

        report
    }
}
