#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! STEP → STL conversion pipeline.
//!
//! A run resolves one [`config::ResolvedConfig`], plans the input files
//! ([`batch::BatchPlan`]) and drives each through the [`loader`], the
//! [`export`] stage and, in drop-folder mode, relocation into `_processed/`.
//! Geometry kernels plug in through [`kernel::CadKernel`]; the `truck`
//! feature provides the default one.

pub mod batch;
pub mod config;
pub mod export;
pub mod geom;
pub mod kernel;
pub mod loader;
pub mod orientation;
pub mod quality;
pub mod report;
pub mod stl;

pub use batch::{BatchPlan, ConvertError, Converter, Job, RunMode};
pub use config::{ConfigError, ConfigLayer, ConfigMerger, ResolvedConfig};
pub use export::{ExportError, Exporter};
pub use kernel::{CadKernel, KernelError, TessellationParams};
pub use loader::{GeometryLoader, LoadError, LoadStrategy, LoadedGeometry};
pub use orientation::{Axis, OrientationTransform};
pub use quality::{MeshTolerance, QualityLevel};
pub use report::{BatchReport, ConversionResult, FileOutcome, Stage};
pub use stl::StlEncoding;

#[cfg(feature = "truck")]
pub use kernel::{TruckKernel, TruckShape};
