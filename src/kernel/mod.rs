//! CAD kernel abstraction.
//!
//! The converter never touches B-rep data directly. Everything it needs from a
//! geometry kernel goes through [`CadKernel`]: turning STEP text into shapes
//! (strictly or tolerantly), measuring a shape, and tessellating it. Mesh
//! serialization stays in [`crate::stl`].

#[cfg(feature = "truck")]
mod truck;

#[cfg(feature = "truck")]
pub use truck::{TruckKernel, TruckShape};

use thiserror::Error;

use crate::geom::{BBox, TriangleMesh};

pub type KernelResult<T> = Result<T, KernelError>;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("cannot read input: {0}")]
    Io(#[from] std::io::Error),

    #[error("STEP parse error: {0}")]
    Parse(String),

    #[error("shape conversion failed: {0}")]
    Conversion(String),

    #[error("tessellation failed: {0}")]
    Tessellation(String),
}

/// Absolute tolerances for one tessellation call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TessellationParams {
    /// Maximum chord deviation in mesh units.
    pub linear_deflection: f64,
    /// Maximum angle between adjacent facet normals, in radians.
    pub angular_deflection: f64,
}

/// Geometry kernel capabilities used by the pipeline.
pub trait CadKernel {
    /// Opaque handle for one solid or shell.
    type Shape;

    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Direct shape read: the first data section only, every shell must
    /// convert. Any conversion failure fails the whole read.
    ///
    /// # Errors
    ///
    /// Returns a [`KernelError`] when the text does not parse or a shell
    /// cannot be converted.
    fn read_shapes(&self, step: &str) -> KernelResult<Vec<Self::Shape>>;

    /// Document import: every data section, skipping shells that do not
    /// convert.
    ///
    /// # Errors
    ///
    /// Returns a [`KernelError`] when the text does not parse at all.
    fn import_document(&self, step: &str) -> KernelResult<Vec<Self::Shape>>;

    /// Axis-aligned bounds, `None` for a shape with no extent.
    fn bounds(&self, shape: &Self::Shape) -> Option<BBox>;

    /// Triangulates `shape` within `params`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::Tessellation`] when the kernel cannot mesh the shape.
    fn tessellate(&self, shape: &Self::Shape, params: &TessellationParams) -> KernelResult<TriangleMesh>;
}

/// Chord height of an arc spanning `angle` radians on a circle of `radius`.
///
/// Kernels that only take a chord tolerance use this to honour an angular
/// deflection: a facet that turns by at most `angle` on a curve of that radius
/// deviates by at most this much.
#[must_use]
pub fn sagitta(radius: f64, angle: f64) -> f64 {
    radius * (1.0 - (angle * 0.5).cos())
}
