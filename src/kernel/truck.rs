//! [`CadKernel`] backed by the `truck` crates.
//!
//! STEP text is parsed with the `ruststep` parser re-exported by
//! `truck-stepio`, shells are converted to compressed B-rep shells, and
//! tessellation runs through `truck-meshalgo`'s robust triangulation.

use std::cell::OnceCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use truck_meshalgo::prelude::*;
use truck_polymesh::PolygonMesh;
use truck_stepio::r#in::{Table, ruststep};

use super::{CadKernel, KernelError, KernelResult, TessellationParams, sagitta};
use crate::geom::{BBox, Point3, TriangleMesh};

/// Coarse pre-pass tolerance as a fraction of the vertex bounds.
const BOUNDS_PASS_FRACTION: f64 = 0.01;

/// Pre-pass tolerance when the shell has no vertex extent (e.g. a sphere
/// with a single seam vertex).
const BOUNDS_PASS_FALLBACK: f64 = 0.01;

type Triangulator = Box<dyn Fn(f64) -> PolygonMesh>;

/// One converted shell, ready to tessellate at any tolerance.
pub struct TruckShape {
    label: String,
    triangulate: Triangulator,
    vertex_bounds: Option<BBox>,
    bounds: OnceCell<Option<BBox>>,
}

impl TruckShape {
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    fn run(&self, tol: f64) -> KernelResult<PolygonMesh> {
        panic::catch_unwind(AssertUnwindSafe(|| (self.triangulate)(tol))).map_err(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "kernel panicked".to_string());
            KernelError::Tessellation(format!("shell {}: {message}", self.label))
        })
    }
}

impl fmt::Debug for TruckShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TruckShape")
            .field("label", &self.label)
            .field("vertex_bounds", &self.vertex_bounds)
            .finish_non_exhaustive()
    }
}

/// Converts the shell held under `$id` into a [`TruckShape`], failing when
/// the conversion lost any part of it. A macro because the shell's curve and
/// surface types are only nameable through inference.
macro_rules! truck_shape {
    ($table:expr, $id:expr, $holder:expr) => {{
        let holder = $holder;
        let shell = $table
            .to_compressed_shell(holder)
            .map_err(|e| KernelError::Conversion(format!("shell #{}: {e:?}", $id)))?;
        ShellCheck {
            step_faces: holder.cfs_faces.len(),
            faces: shell.faces.len(),
            vertices: shell.vertices.len(),
            edges: shell.edges.len(),
            max_edge_vertex: shell.edges.iter().map(|e| e.vertices.0.max(e.vertices.1)).max(),
            max_boundary_edge: shell
                .faces
                .iter()
                .flat_map(|f| f.boundaries.iter().flatten())
                .map(|e| e.index)
                .max(),
            unbounded_faces: shell
                .faces
                .iter()
                .filter(|f| f.boundaries.is_empty() || f.boundaries.iter().any(Vec::is_empty))
                .count(),
        }
        .verify($id)?;

        let vertex_bounds =
            BBox::from_points(shell.vertices.iter().map(|p| Point3::new(p.x, p.y, p.z)));
        let triangulate: Triangulator =
            Box::new(move |tol: f64| shell.robust_triangulation(tol).to_polygon());
        TruckShape {
            label: format!("#{}", $id),
            triangulate,
            vertex_bounds,
            bounds: OnceCell::new(),
        }
    }};
}

/// Counts taken from a converted shell. `to_compressed_shell` skips entities
/// it cannot resolve instead of failing, which shows up here as missing
/// faces, dangling indices or faces without a boundary loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ShellCheck {
    step_faces: usize,
    faces: usize,
    vertices: usize,
    edges: usize,
    max_edge_vertex: Option<usize>,
    max_boundary_edge: Option<usize>,
    unbounded_faces: usize,
}

impl ShellCheck {
    fn verify(&self, id: u64) -> KernelResult<()> {
        let lost = |what: String| Err(KernelError::Conversion(format!("shell #{id}: {what}")));
        if self.faces != self.step_faces {
            return lost(format!("converted {} of {} faces", self.faces, self.step_faces));
        }
        if self.max_edge_vertex.is_some_and(|i| i >= self.vertices) {
            return lost("an edge lost one of its vertices".to_string());
        }
        if self.max_boundary_edge.is_some_and(|i| i >= self.edges) {
            return lost("a face boundary lost one of its edges".to_string());
        }
        if self.unbounded_faces > 0 {
            return lost(format!("{} faces lost a boundary loop", self.unbounded_faces));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TruckKernel;

impl TruckKernel {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl CadKernel for TruckKernel {
    type Shape = TruckShape;

    fn name(&self) -> &'static str {
        "truck"
    }

    fn read_shapes(&self, step: &str) -> KernelResult<Vec<TruckShape>> {
        let exchange =
            ruststep::parser::parse(step).map_err(|e| KernelError::Parse(e.to_string()))?;
        let section = exchange
            .data
            .first()
            .ok_or_else(|| KernelError::Parse("file contains no DATA section".to_string()))?;

        let table = Table::from_data_section(section);
        let mut ids: Vec<u64> = table.shell.keys().copied().collect();
        ids.sort_unstable();

        let mut shapes = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(holder) = table.shell.get(&id) else {
                continue;
            };
            shapes.push(truck_shape!(table, id, holder));
        }
        Ok(shapes)
    }

    fn import_document(&self, step: &str) -> KernelResult<Vec<TruckShape>> {
        let exchange =
            ruststep::parser::parse(step).map_err(|e| KernelError::Parse(e.to_string()))?;

        let mut shapes = Vec::new();
        for section in &exchange.data {
            let table = Table::from_data_section(section);
            let mut ids: Vec<u64> = table.shell.keys().copied().collect();
            ids.sort_unstable();

            for id in ids {
                let Some(holder) = table.shell.get(&id) else {
                    continue;
                };
                shapes.push(truck_shape!(table, id, holder));
            }
        }
        Ok(shapes)
    }

    fn bounds(&self, shape: &TruckShape) -> Option<BBox> {
        *shape.bounds.get_or_init(|| {
            let coarse = shape
                .vertex_bounds
                .map(BBox::diagonal)
                .filter(|d| d.is_finite() && *d > 0.0)
                .map_or(BOUNDS_PASS_FALLBACK, |d| d * BOUNDS_PASS_FRACTION);

            let sampled = match shape.run(coarse) {
                Ok(poly) => polygon_bounds(&poly),
                Err(err) => {
                    log::debug!("bounds pre-pass failed: {err}");
                    None
                }
            };
            match (sampled, shape.vertex_bounds) {
                (Some(a), Some(b)) => Some(a.union(b)),
                (a, b) => a.or(b),
            }
        })
    }

    fn tessellate(&self, shape: &TruckShape, params: &TessellationParams) -> KernelResult<TriangleMesh> {
        let mut tol = params.linear_deflection;
        if let Some(bounds) = self.bounds(shape) {
            let radius = bounds.diagonal() * 0.5;
            let angular = sagitta(radius, params.angular_deflection);
            if angular.is_finite() && angular > 0.0 {
                tol = tol.min(angular);
            }
        }
        log::debug!("truck: tessellating shell {} with tolerance {tol:.6}", shape.label);

        let poly = shape.run(tol)?;
        let mesh = polygon_to_mesh(&poly);
        if mesh.is_empty() {
            return Err(KernelError::Tessellation(format!(
                "shell {} produced no triangles",
                shape.label
            )));
        }
        Ok(mesh)
    }
}

fn polygon_bounds(poly: &PolygonMesh) -> Option<BBox> {
    BBox::from_points(poly.positions().iter().map(|p| Point3::new(p.x, p.y, p.z)))
}

#[allow(clippy::cast_possible_truncation)]
fn polygon_to_mesh(poly: &PolygonMesh) -> TriangleMesh {
    let positions = poly.positions().iter().map(|p| [p.x, p.y, p.z]).collect();
    let mut indices = Vec::new();

    for tri in poly.tri_faces() {
        indices.extend([tri[0].pos as u32, tri[1].pos as u32, tri[2].pos as u32]);
    }
    for quad in poly.quad_faces() {
        let [a, b, c, d] = [
            quad[0].pos as u32,
            quad[1].pos as u32,
            quad[2].pos as u32,
            quad[3].pos as u32,
        ];
        indices.extend([a, b, c, a, c, d]);
    }
    for face in poly.other_faces() {
        let Some(first) = face.first() else {
            continue;
        };
        for pair in face[1..].windows(2) {
            indices.extend([first.pos as u32, pair[0].pos as u32, pair[1].pos as u32]);
        }
    }

    TriangleMesh::new(positions, indices)
}
