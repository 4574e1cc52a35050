//! In-memory kernel for driving the pipeline without a real STEP stack.
//!
//! Fixtures are small text files:
//!
//! ```text
//! FAKESTEP
//! sphere 0 0 0 10
//! box 0 0 0 1 2 3
//! ```
//!
//! A `FAKEDOC` header marks a file only the document import understands;
//! anything else fails to parse in both strategies.
#![allow(dead_code)]

use std::f64::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};

use step2stl::geom::{BBox, Point3, TriangleMesh};
use step2stl::kernel::{CadKernel, KernelError, KernelResult, TessellationParams};

pub const STRICT_HEADER: &str = "FAKESTEP";
pub const DOCUMENT_HEADER: &str = "FAKEDOC";

#[derive(Debug, Clone, PartialEq)]
pub enum FakeShape {
    Sphere { center: [f64; 3], radius: f64 },
    Cuboid { min: [f64; 3], max: [f64; 3] },
}

#[derive(Debug, Default)]
pub struct FakeKernel;

impl FakeKernel {
    fn parse(text: &str, accept_document: bool) -> KernelResult<Vec<FakeShape>> {
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
        match lines.next() {
            Some(STRICT_HEADER) => {}
            Some(DOCUMENT_HEADER) if accept_document => {}
            Some(DOCUMENT_HEADER) => {
                return Err(KernelError::Conversion("shell #1: unsupported entity".to_string()));
            }
            _ => return Err(KernelError::Parse("missing ISO-10303-21 header".to_string())),
        }

        lines.map(parse_shape).collect()
    }
}

fn parse_shape(line: &str) -> KernelResult<FakeShape> {
    let mut parts = line.split_whitespace();
    let kind = parts.next().unwrap_or_default();
    let numbers = parts
        .map(str::parse::<f64>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| KernelError::Parse(format!("`{line}`: {e}")))?;

    match (kind, numbers.as_slice()) {
        ("sphere", &[x, y, z, r]) if r > 0.0 => Ok(FakeShape::Sphere {
            center: [x, y, z],
            radius: r,
        }),
        ("box", &[x0, y0, z0, x1, y1, z1]) => Ok(FakeShape::Cuboid {
            min: [x0, y0, z0],
            max: [x1, y1, z1],
        }),
        _ => Err(KernelError::Parse(format!("unknown entity `{line}`"))),
    }
}

impl CadKernel for FakeKernel {
    type Shape = FakeShape;

    fn name(&self) -> &'static str {
        "fake"
    }

    fn read_shapes(&self, step: &str) -> KernelResult<Vec<FakeShape>> {
        Self::parse(step, false)
    }

    fn import_document(&self, step: &str) -> KernelResult<Vec<FakeShape>> {
        Self::parse(step, true)
    }

    fn bounds(&self, shape: &FakeShape) -> Option<BBox> {
        match *shape {
            FakeShape::Sphere { center, radius } => {
                let [x, y, z] = center;
                Some(BBox::new(
                    Point3::new(x - radius, y - radius, z - radius),
                    Point3::new(x + radius, y + radius, z + radius),
                ))
            }
            FakeShape::Cuboid { min, max } => Some(BBox::new(
                Point3::from_array(min),
                Point3::from_array(max),
            )),
        }
    }

    fn tessellate(&self, shape: &FakeShape, params: &TessellationParams) -> KernelResult<TriangleMesh> {
        if !(params.linear_deflection > 0.0) {
            return Err(KernelError::Tessellation("non-positive tolerance".to_string()));
        }
        Ok(match *shape {
            FakeShape::Sphere { center, radius } => sphere(center, radius, params),
            FakeShape::Cuboid { min, max } => cuboid(min, max),
        })
    }
}

/// Segments around the equator so the chord error and the turn per facet
/// both stay within `params`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn sphere_segments(radius: f64, params: &TessellationParams) -> u32 {
    let ratio = (1.0 - params.linear_deflection / radius).clamp(-1.0, 1.0);
    let by_chord = (PI / ratio.acos()).ceil();
    let by_angle = (2.0 * PI / params.angular_deflection).ceil();
    by_chord.max(by_angle).clamp(6.0, 256.0) as u32
}

#[allow(clippy::cast_precision_loss)]
fn sphere(center: [f64; 3], radius: f64, params: &TessellationParams) -> TriangleMesh {
    let segments = sphere_segments(radius, params);
    let stacks = (segments / 2).max(2);
    let [cx, cy, cz] = center;

    let mut positions = vec![[cx, cy, cz + radius]];
    for i in 1..stacks {
        let theta = PI * f64::from(i) / f64::from(stacks);
        for j in 0..segments {
            let phi = 2.0 * PI * f64::from(j) / f64::from(segments);
            positions.push([
                cx + radius * theta.sin() * phi.cos(),
                cy + radius * theta.sin() * phi.sin(),
                cz + radius * theta.cos(),
            ]);
        }
    }
    let south = u32::try_from(positions.len()).unwrap_or(u32::MAX);
    positions.push([cx, cy, cz - radius]);

    let ring = |i: u32, j: u32| 1 + (i - 1) * segments + j % segments;
    let mut indices = Vec::new();
    for j in 0..segments {
        indices.extend([0, ring(1, j), ring(1, j + 1)]);
    }
    for i in 1..stacks - 1 {
        for j in 0..segments {
            let (a, b, c, d) = (ring(i, j), ring(i + 1, j), ring(i + 1, j + 1), ring(i, j + 1));
            indices.extend([a, b, c, a, c, d]);
        }
    }
    for j in 0..segments {
        indices.extend([ring(stacks - 1, j), south, ring(stacks - 1, j + 1)]);
    }

    TriangleMesh::new(positions, indices)
}

fn cuboid(min: [f64; 3], max: [f64; 3]) -> TriangleMesh {
    let positions = (0..8)
        .map(|i| {
            [
                if i & 1 == 0 { min[0] } else { max[0] },
                if i & 2 == 0 { min[1] } else { max[1] },
                if i & 4 == 0 { min[2] } else { max[2] },
            ]
        })
        .collect();
    let faces: [[u32; 4]; 6] = [
        [0, 2, 3, 1],
        [4, 5, 7, 6],
        [0, 1, 5, 4],
        [2, 6, 7, 3],
        [0, 4, 6, 2],
        [1, 3, 7, 5],
    ];
    let indices = faces
        .iter()
        .flat_map(|&[a, b, c, d]| [a, b, c, a, c, d])
        .collect();
    TriangleMesh::new(positions, indices)
}

pub fn fixture(shapes: &[&str]) -> String {
    let mut text = String::from(STRICT_HEADER);
    for shape in shapes {
        text.push('\n');
        text.push_str(shape);
    }
    text.push('\n');
    text
}

pub fn document_fixture(shapes: &[&str]) -> String {
    fixture(shapes).replacen(STRICT_HEADER, DOCUMENT_HEADER, 1)
}

pub const CORRUPT: &str = "this is not a STEP file\n";

pub fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

/// File names directly inside `dir`, sorted. Empty when `dir` is missing.
pub fn listing(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
