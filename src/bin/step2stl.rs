//! `step2stl` command-line front end.
//!
//! Without an input argument the drop folder next to the executable is used:
//! files in `STEP-INPUT/` are converted into `STL-OUTPUT/` and moved to
//! `STEP-INPUT/_processed/`. With a file or directory argument the sources are
//! left where they are.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};

use step2stl::batch::{BatchPlan, OUTPUT_DIR_NAME, RunMode};
use step2stl::config::{self, ConfigLayer, ConfigMerger, ResolvedConfig};
use step2stl::orientation::Axis;
use step2stl::quality::QualityLevel;
use step2stl::report::{EXIT_SUCCESS, EXIT_USAGE};

#[derive(Debug, Parser)]
#[command(name = "step2stl", version, about = "Convert STEP solids into STL meshes", long_about = None)]
struct Cli {
    /// STEP file or directory of STEP files. Omit to use the drop folder.
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,

    /// Output directory
    #[arg(short = 'o', long = "out", value_name = "DIR")]
    out: Option<PathBuf>,

    /// Mesh quality preset, or `custom` with explicit deflections
    #[arg(short, long, value_enum)]
    quality: Option<QualityLevel>,

    /// Linear deflection (custom quality only)
    #[arg(long, value_name = "F")]
    linear_deflection: Option<f64>,

    /// Angular deflection in degrees (custom quality only)
    #[arg(long, value_name = "DEG")]
    angular_deflection: Option<f64>,

    /// Treat the linear deflection as a fraction of each shape's diagonal
    #[arg(long, value_name = "BOOL", action = ArgAction::Set)]
    relative: Option<bool>,

    /// Write binary STL
    #[arg(long, conflicts_with = "ascii")]
    binary: bool,

    /// Write ASCII STL
    #[arg(long)]
    ascii: bool,

    /// Up axis of the input models
    #[arg(long, value_enum, value_name = "AXIS")]
    source_up: Option<Axis>,

    /// Up axis expected by the consumer of the STL files
    #[arg(long, value_enum, value_name = "AXIS")]
    target_up: Option<Axis>,

    /// Extra rotation about X, applied after the axis remap
    #[arg(long, value_name = "DEG", allow_negative_numbers = true)]
    rotate_x: Option<f64>,

    /// Extra rotation about Y
    #[arg(long, value_name = "DEG", allow_negative_numbers = true)]
    rotate_y: Option<f64>,

    /// Extra rotation about Z
    #[arg(long, value_name = "DEG", allow_negative_numbers = true)]
    rotate_z: Option<f64>,

    /// Config file (default: step2stl.config.json beside the executable)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Walk subdirectories of a directory input
    #[arg(long)]
    recursive: bool,

    /// List what would be converted without touching the filesystem
    #[arg(long)]
    dry_run: bool,

    /// Print the resolved configuration as JSON and exit
    #[arg(long)]
    print_config: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigLayer {
        let binary = if self.binary {
            Some(true)
        } else if self.ascii {
            Some(false)
        } else {
            None
        };
        ConfigLayer {
            quality: self.quality,
            source_up: self.source_up,
            target_up: self.target_up,
            rotate_x: self.rotate_x,
            rotate_y: self.rotate_y,
            rotate_z: self.rotate_z,
            binary,
            linear_deflection: self.linear_deflection,
            angular_deflection: self.angular_deflection,
            relative: self.relative,
            out_dir: self.out.clone(),
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match usage_exit_code(&err) {
            Some(code) => {
                let _ = err.print();
                return ExitCode::from(code);
            }
            None => err.exit(),
        },
    };
    init_logger(cli.verbose);

    match run(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_USAGE)
        }
    }
}

/// Bad flags are a usage error like any other; `None` for `--help` and
/// `--version`, which clap prints and exits on by itself.
fn usage_exit_code(err: &clap::Error) -> Option<u8> {
    err.use_stderr().then_some(EXIT_USAGE)
}

fn init_logger(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<u8> {
    let config = resolve_config(cli)?;
    if cli.print_config {
        println!("{}", config.to_json_pretty());
        return Ok(EXIT_SUCCESS);
    }

    let base = base_dir()?;
    let plan = plan(cli, &config, &base)?;

    if cli.dry_run {
        println!(
            "Would convert {} file(s). Output: {}",
            plan.jobs().len(),
            plan.output_root().display()
        );
        for line in plan.describe() {
            println!("  {line}");
        }
        return Ok(EXIT_SUCCESS);
    }

    if plan.is_empty() {
        return Ok(match plan.mode() {
            RunMode::DropFolder => {
                plan.prepare()
                    .with_context(|| format!("cannot create {}", plan.input_root().display()))?;
                println!(
                    "No .step/.stp files found in {}. Drop files there and re-run.",
                    plan.input_root().display()
                );
                EXIT_SUCCESS
            }
            RunMode::Directory { .. } | RunMode::SingleFile => {
                eprintln!("No .step/.stp files found in {}.", plan.input_root().display());
                EXIT_USAGE
            }
        });
    }

    plan.prepare()
        .with_context(|| format!("cannot create {}", plan.output_root().display()))?;
    println!(
        "Found {} file(s). Output: {}",
        plan.jobs().len(),
        plan.output_root().display()
    );
    Ok(convert(&plan, &config))
}

fn resolve_config(cli: &Cli) -> Result<ResolvedConfig> {
    let file_layer = match &cli.config {
        Some(path) => match config::load_config_file(path)? {
            Some(layer) => layer,
            None => bail!("config file {} does not exist", path.display()),
        },
        None => config::default_config_path()
            .map(|path| config::load_config_file(&path))
            .transpose()?
            .flatten()
            .unwrap_or_default(),
    };

    let resolved = ConfigMerger::new()
        .with_file_layer(file_layer)
        .with_overrides(cli.overrides())
        .resolve()?;
    log::debug!(
        "quality {} ({:?}), {} -> {} up, encoding {:?}",
        resolved.quality(),
        resolved.tolerance(),
        resolved.source_up(),
        resolved.target_up(),
        resolved.encoding()
    );
    Ok(resolved)
}

/// Directory holding the executable; the drop folder lives here.
fn base_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("cannot locate the executable")?;
    exe.parent()
        .map(Path::to_path_buf)
        .context("executable has no parent directory")
}

fn plan(cli: &Cli, config: &ResolvedConfig, base: &Path) -> Result<BatchPlan> {
    let Some(input) = &cli.input else {
        return Ok(BatchPlan::drop_folder(base, config)?);
    };

    let output_root = config
        .out_dir()
        .map_or_else(|| base.join(OUTPUT_DIR_NAME), Path::to_path_buf);
    let plan = if input.is_dir() {
        BatchPlan::directory(input, cli.recursive, &output_root)?
    } else {
        if cli.recursive {
            log::warn!("--recursive ignored for a single file input");
        }
        BatchPlan::single_file(input, &output_root)?
    };
    Ok(plan)
}

cfg_if::cfg_if! {
    if #[cfg(feature = "truck")] {
        fn convert(plan: &BatchPlan, config: &ResolvedConfig) -> u8 {
            use step2stl::batch::Converter;
            use step2stl::kernel::{CadKernel, TruckKernel};

            let kernel = TruckKernel::new();
            log::debug!("using the {} kernel", kernel.name());

            let report = Converter::new(&kernel, config).run(plan);
            let timings = report.total_timings();
            log::debug!(
                "total {:.1} ms (load {:.1} ms, tessellation {:.1} ms)",
                timings.total_ms(),
                timings.load_ms(),
                timings.tessellation_ms()
            );
            println!("{}", report.summary());
            report.exit_code()
        }
    } else {
        fn convert(_plan: &BatchPlan, _config: &ResolvedConfig) -> u8 {
            eprintln!("step2stl was built without a CAD kernel; rebuild with `--features truck`.");
            step2stl::report::EXIT_NO_KERNEL
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_error(args: &[&str]) -> clap::Error {
        Cli::try_parse_from(args).unwrap_err()
    }

    #[test]
    fn bad_flag_values_are_usage_errors() {
        for args in [
            ["step2stl", "--quality", "ultra"],
            ["step2stl", "--source-up", "w"],
            ["step2stl", "--rotate-x", "left"],
        ] {
            assert_eq!(usage_exit_code(&parse_error(&args)), Some(EXIT_USAGE), "{args:?}");
        }
        assert_ne!(EXIT_USAGE, step2stl::report::EXIT_NO_KERNEL);
    }

    #[test]
    fn help_is_not_an_error() {
        assert_eq!(usage_exit_code(&parse_error(&["step2stl", "--help"])), None);
    }

    #[test]
    fn flags_become_the_override_layer() {
        let cli = Cli::try_parse_from(["step2stl", "--binary", "-q", "low", "--rotate-z", "-90"]).unwrap();
        let layer = cli.overrides();
        assert_eq!(layer.binary, Some(true));
        assert_eq!(layer.quality, Some(QualityLevel::Low));
        assert_eq!(layer.rotate_z, Some(-90.0));
    }
}
