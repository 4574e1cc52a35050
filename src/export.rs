//! Tessellation, orientation and STL output for one input file.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::ResolvedConfig;
use crate::geom::{MeshDiagnostics, StageMetrics, TimingBucket, Tolerance, TriangleMesh};
use crate::kernel::{CadKernel, TessellationParams};
use crate::loader::LoadedGeometry;
use crate::orientation::OrientationTransform;
use crate::quality::MeshTolerance;
use crate::stl::{self, StlEncoding, StlError};

pub type ExportResult<T> = Result<T, ExportError>;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cannot write {}: {source}", path.display())]
    PathNotWritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: tessellation failed: {reason}", path.display())]
    Tessellation { path: PathBuf, reason: String },
}

/// Result of one successful export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    pub output: PathBuf,
    pub triangle_count: usize,
    pub diagnostics: MeshDiagnostics,
}

/// `<out_dir>/<input stem>.stl`.
#[must_use]
pub fn output_path_for(source: &Path, out_dir: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map_or_else(|| "mesh".into(), |s| s.to_os_string());
    let mut name = stem;
    name.push(".stl");
    out_dir.join(name)
}

pub struct Exporter<'k, K> {
    kernel: &'k K,
    tolerance: MeshTolerance,
    orientation: OrientationTransform,
    encoding: StlEncoding,
}

impl<'k, K: CadKernel> Exporter<'k, K> {
    #[must_use]
    pub fn new(kernel: &'k K, config: &ResolvedConfig) -> Self {
        Self {
            kernel,
            tolerance: config.tolerance(),
            orientation: config.orientation(),
            encoding: config.encoding(),
        }
    }

    /// Tessellates every shape, merges them into one mesh and orients it.
    ///
    /// # Errors
    ///
    /// [`ExportError::Tessellation`] when a shape cannot be meshed, has no
    /// extent to scale a relative tolerance by, or the merged mesh is empty.
    pub fn tessellate(
        &self,
        source: &Path,
        geometry: &LoadedGeometry<K::Shape>,
    ) -> ExportResult<TriangleMesh> {
        let failed = |reason: String| ExportError::Tessellation {
            path: source.to_path_buf(),
            reason,
        };

        let mut merged = TriangleMesh::default();
        for (index, shape) in geometry.shapes().iter().enumerate() {
            // Meshing happens in the file's frame and the rigid orientation is
            // applied to the vertices afterwards. Axis remaps leave the box
            // diagonal unchanged; free rotations can grow the oriented box a
            // little, which this scale ignores.
            let diagonal = self.kernel.bounds(shape).map_or(0.0, |b| b.diagonal());
            let linear = self.tolerance.absolute_linear(diagonal).ok_or_else(|| {
                failed(format!("shape {index} has no extent to scale the tolerance by"))
            })?;
            let params = TessellationParams {
                linear_deflection: linear,
                angular_deflection: self.tolerance.angular_deflection,
            };
            log::debug!(
                "{}: shape {index}: diagonal {diagonal:.6}, linear {linear:.6}, angular {:.4} rad",
                source.display(),
                params.angular_deflection
            );

            let mesh = self
                .kernel
                .tessellate(shape, &params)
                .map_err(|e| failed(format!("shape {index}: {e}")))?;
            mesh.validate()
                .map_err(|e| failed(format!("shape {index}: {e}")))?;
            merged.append(&mesh);
        }

        if merged.is_empty() {
            return Err(failed("no triangles produced".to_string()));
        }
        self.orientation.apply_mesh(&mut merged);
        Ok(merged)
    }

    /// Writes `mesh` to `output` through a `.part` sibling, so an interrupted
    /// write never leaves a truncated `.stl` behind.
    ///
    /// # Errors
    ///
    /// [`ExportError::PathNotWritable`] when the directory cannot be created
    /// or the file cannot be written or renamed into place.
    pub fn write(&self, mesh: &TriangleMesh, output: &Path) -> ExportResult<()> {
        let not_writable = |path: &Path, source: io::Error| ExportError::PathNotWritable {
            path: path.to_path_buf(),
            source,
        };

        if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| not_writable(dir, e))?;
        }

        let part = partial_path(output);
        let name = output
            .file_stem()
            .map_or_else(|| "mesh".to_string(), |s| s.to_string_lossy().into_owned());

        let written = File::create(&part)
            .map_err(StlError::Io)
            .and_then(|file| stl::write_stl(mesh, &name, self.encoding, BufWriter::new(file)))
            .and_then(|()| fs::rename(&part, output).map_err(StlError::Io));

        if let Err(err) = written {
            let _ = fs::remove_file(&part);
            let source = match err {
                StlError::Io(e) => e,
                other => io::Error::other(other.to_string()),
            };
            return Err(not_writable(output, source));
        }
        Ok(())
    }

    /// Tessellate, diagnose and write.
    ///
    /// # Errors
    ///
    /// See [`Exporter::tessellate`] and [`Exporter::write`].
    pub fn export(
        &self,
        source: &Path,
        geometry: &LoadedGeometry<K::Shape>,
        output: &Path,
        metrics: &mut StageMetrics,
    ) -> ExportResult<ExportSummary> {
        let mesh = metrics.time(TimingBucket::Tessellation, || self.tessellate(source, geometry))?;

        let diagnostics = metrics.time(TimingBucket::Diagnostics, || mesh.diagnostics(Tolerance::LOOSE));
        log::debug!("{}: {}", source.display(), diagnostics.summary());
        for warning in &diagnostics.warnings {
            log::warn!("{}: {warning}", source.display());
        }

        metrics.time(TimingBucket::Write, || self.write(&mesh, output))?;

        Ok(ExportSummary {
            output: output.to_path_buf(),
            triangle_count: mesh.triangle_count(),
            diagnostics,
        })
    }
}

fn partial_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}
