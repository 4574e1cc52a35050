//! Printability counts for an exported mesh.
//!
//! Computed once per merged output mesh and logged. Nothing here feeds back
//! into the mesh: a file with open edges is still written exactly as the
//! kernel produced it.

use std::fmt;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MeshDiagnostics {
    /// Vertex buffer length, before welding.
    pub vertex_count: usize,
    pub triangle_count: usize,
    /// Triangles with (near) zero area.
    pub degenerate_triangle_count: usize,
    /// Edges used by exactly one triangle.
    pub open_edge_count: usize,
    /// Edges used by three or more triangles.
    pub non_manifold_edge_count: usize,
    pub warnings: Vec<String>,
}

impl MeshDiagnostics {
    #[must_use]
    pub fn is_watertight(&self) -> bool {
        self.open_edge_count == 0
    }

    #[must_use]
    pub fn is_manifold(&self) -> bool {
        self.non_manifold_edge_count == 0
    }

    /// Closed, manifold and without degenerate facets: what a slicer expects.
    #[must_use]
    pub fn is_printable(&self) -> bool {
        self.is_watertight() && self.is_manifold() && self.degenerate_triangle_count == 0
    }

    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// One-line form for logs and the per-file report, e.g.
    /// `8 vertices, 12 triangles` or `4 vertices, 2 triangles, 4 open edges`.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut text = format!("{} vertices, {} triangles", self.vertex_count, self.triangle_count);
        for (count, label) in [
            (self.degenerate_triangle_count, "degenerate triangles"),
            (self.open_edge_count, "open edges"),
            (self.non_manifold_edge_count, "non-manifold edges"),
        ] {
            if count > 0 {
                text.push_str(&format!(", {count} {label}"));
            }
        }
        text
    }
}

impl fmt::Display for MeshDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}
