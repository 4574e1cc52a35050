use std::collections::HashMap;

use super::diagnostics::MeshDiagnostics;
use super::{BBox, Point3, Tolerance, Vec3};

/// Indexed triangle list produced by tessellation and consumed by the STL codec.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TriangleMesh {
    pub positions: Vec<[f64; 3]>,
    pub indices: Vec<u32>,
}

impl TriangleMesh {
    #[must_use]
    pub fn new(positions: Vec<[f64; 3]>, indices: Vec<u32>) -> Self {
        Self { positions, indices }
    }

    /// Builds an unindexed mesh: three fresh vertices per triangle.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_triangles(triangles: impl IntoIterator<Item = [[f64; 3]; 3]>) -> Self {
        let mut mesh = Self::default();
        for tri in triangles {
            let base = mesh.positions.len() as u32;
            mesh.positions.extend_from_slice(&tri);
            mesh.indices.extend_from_slice(&[base, base + 1, base + 2]);
        }
        mesh
    }

    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Returns true if any vertex position contains NaN or Inf values.
    #[must_use]
    pub fn has_invalid_vertices(&self) -> bool {
        self.positions
            .iter()
            .any(|p| !p[0].is_finite() || !p[1].is_finite() || !p[2].is_finite())
    }

    /// Returns true if all vertex indices are within bounds.
    #[must_use]
    pub fn has_valid_indices(&self) -> bool {
        let n = self.positions.len();
        self.indices.iter().all(|&i| (i as usize) < n)
    }

    /// Returns true if indices represent a triangle list.
    #[must_use]
    pub fn has_triangle_indices(&self) -> bool {
        self.indices.len() % 3 == 0
    }

    /// Checks the buffers before export.
    ///
    /// # Errors
    ///
    /// A description of the first problem found: a partial triangle, a
    /// non-finite coordinate or an index past the vertex buffer.
    pub fn validate(&self) -> Result<(), String> {
        if !self.has_triangle_indices() {
            return Err("mesh indices are not a triangle list (len % 3 != 0)".to_string());
        }
        if self.has_invalid_vertices() {
            return Err("mesh has invalid vertex coordinates (NaN/Inf)".to_string());
        }
        if !self.has_valid_indices() {
            return Err("mesh has out-of-bounds vertex indices".to_string());
        }
        Ok(())
    }

    /// Appends `other`, offsetting its indices past the current vertices.
    #[allow(clippy::cast_possible_truncation)]
    pub fn append(&mut self, other: &Self) {
        let offset = self.positions.len() as u32;
        self.positions.extend_from_slice(&other.positions);
        self.indices
            .extend(other.indices.iter().map(|&i| i + offset));
    }

    /// Iterates triangles as corner triples. Triangles referencing missing
    /// vertices are skipped.
    pub fn triangles(&self) -> impl Iterator<Item = [Point3; 3]> + '_ {
        self.indices.chunks_exact(3).filter_map(|tri| {
            let a = self.positions.get(tri[0] as usize)?;
            let b = self.positions.get(tri[1] as usize)?;
            let c = self.positions.get(tri[2] as usize)?;
            Some([Point3::from(*a), Point3::from(*b), Point3::from(*c)])
        })
    }

    #[must_use]
    pub fn bounds(&self) -> Option<BBox> {
        BBox::from_points(self.positions.iter().copied().map(Point3::from))
    }

    /// Rewrites every vertex through `f`. Indices are untouched.
    pub fn map_positions(&mut self, mut f: impl FnMut(Point3) -> Point3) {
        for p in &mut self.positions {
            *p = f(Point3::from(*p)).to_array();
        }
    }

    /// Rounds every coordinate to `f32`, the precision STL stores.
    #[must_use]
    pub fn quantized_f32(&self) -> Self {
        let positions = self
            .positions
            .iter()
            .map(|p| p.map(|c| f64::from(c as f32)))
            .collect();
        Self::new(positions, self.indices.clone())
    }

    /// Counts topology and degeneracy problems. Vertices closer than `tol`
    /// are treated as one, since tessellators commonly duplicate seam vertices
    /// per face.
    #[must_use]
    pub fn diagnostics(&self, tol: Tolerance) -> MeshDiagnostics {
        let welded = weld_indices(&self.positions, &self.indices, tol);
        let degenerate_triangle_count = self
            .triangles()
            .filter(|tri| is_degenerate(tri, tol))
            .count();
        let (open_edge_count, non_manifold_edge_count) = count_edge_topology(&welded);

        let mut diagnostics = MeshDiagnostics {
            vertex_count: self.vertex_count(),
            triangle_count: self.triangle_count(),
            degenerate_triangle_count,
            open_edge_count,
            non_manifold_edge_count,
            warnings: Vec::new(),
        };
        if open_edge_count > 0 {
            diagnostics.add_warning("mesh has open edges");
        }
        if non_manifold_edge_count > 0 {
            diagnostics.add_warning("mesh has non-manifold edges");
        }
        if degenerate_triangle_count > 0 {
            diagnostics.add_warning("mesh has degenerate triangles");
        }
        diagnostics
    }
}

/// Unit normal from counter-clockwise winding, or `None` for a degenerate triangle.
#[must_use]
pub fn facet_normal(tri: &[Point3; 3]) -> Option<Vec3> {
    let ab = tri[1].sub_point(tri[0]);
    let ac = tri[2].sub_point(tri[0]);
    ab.cross(ac).normalized()
}

fn is_degenerate(tri: &[Point3; 3], tol: Tolerance) -> bool {
    let ab = tri[1].sub_point(tri[0]);
    let ac = tri[2].sub_point(tri[0]);
    let area2 = ab.cross(ac).length();
    !area2.is_finite() || area2 <= tol.eps * tol.eps
}

#[allow(clippy::cast_possible_truncation)]
fn weld_indices(positions: &[[f64; 3]], indices: &[u32], tol: Tolerance) -> Vec<u32> {
    fn quantize(value: f64, inv: f64) -> i64 {
        (value * inv).round() as i64
    }

    let inv = if tol.eps > 0.0 { 1.0 / tol.eps } else { 1.0 };
    let mut canonical: HashMap<[i64; 3], u32> = HashMap::with_capacity(positions.len());
    let remap: Vec<u32> = positions
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let key = [quantize(p[0], inv), quantize(p[1], inv), quantize(p[2], inv)];
            *canonical.entry(key).or_insert(i as u32)
        })
        .collect();

    indices
        .iter()
        .map(|&i| remap.get(i as usize).copied().unwrap_or(i))
        .collect()
}

fn count_edge_topology(indices: &[u32]) -> (usize, usize) {
    let mut edge_counts: HashMap<(u32, u32), u32> = HashMap::new();

    for tri in indices.chunks_exact(3) {
        let (i0, i1, i2) = (tri[0], tri[1], tri[2]);
        if i0 == i1 || i1 == i2 || i0 == i2 {
            continue;
        }
        for (ea, eb) in [(i0, i1), (i1, i2), (i2, i0)] {
            let key = if ea <= eb { (ea, eb) } else { (eb, ea) };
            *edge_counts.entry(key).or_insert(0) += 1;
        }
    }

    let mut open_edge_count = 0usize;
    let mut non_manifold_edge_count = 0usize;
    for count in edge_counts.into_values() {
        if count == 1 {
            open_edge_count += 1;
        } else if count > 2 {
            non_manifold_edge_count += 1;
        }
    }

    (open_edge_count, non_manifold_edge_count)
}
