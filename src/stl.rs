//! STL encoding and decoding.
//!
//! Coordinates are stored as `f32` in both encodings. The ASCII writer uses the
//! shortest representation that round-trips through `f32`, so a text file and a
//! binary file written from the same mesh decode to identical coordinates.
//!
//! # Binary Format
//!
//! ```text
//! UINT8[80]    – Header
//! UINT32       – Number of triangles
//! foreach triangle
//!     REAL32[3] – Normal vector
//!     REAL32[3] – Vertex 1
//!     REAL32[3] – Vertex 2
//!     REAL32[3] – Vertex 3
//!     UINT16    – Attribute byte count (0)
//! end
//! ```
//!
//! # ASCII Format
//!
//! ```text
//! solid name
//!   facet normal ni nj nk
//!     outer loop
//!       vertex v1x v1y v1z
//!       vertex v2x v2y v2z
//!       vertex v3x v3y v3z
//!     endloop
//!   endfacet
//!   ...
//! endsolid name
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geom::{Point3, TriangleMesh, Vec3, facet_normal};

/// STL binary header size in bytes.
const HEADER_SIZE: usize = 80;

/// Size of one triangle in binary STL (normal + 3 vertices + attribute).
const TRIANGLE_SIZE: usize = 50;

const HEADER_TEXT: &[u8] = b"binary STL written by step2stl";

pub type StlResult<T> = Result<T, StlError>;

#[derive(Debug, Error)]
pub enum StlError {
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("invalid STL content: {message}")]
    InvalidContent { message: String },

    #[error("binary STL declares {expected} triangles but holds {got}")]
    InvalidFaceCount { expected: u32, got: usize },

    #[error("mesh has {0} triangles, more than binary STL can count")]
    TooManyTriangles(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StlError {
    #[must_use]
    pub fn invalid_content(message: impl Into<String>) -> Self {
        Self::InvalidContent {
            message: message.into(),
        }
    }
}

/// Output encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StlEncoding {
    #[default]
    Ascii,
    Binary,
}

impl StlEncoding {
    #[must_use]
    pub fn from_binary_flag(binary: bool) -> Self {
        if binary { Self::Binary } else { Self::Ascii }
    }
}

/// Encodes `mesh` into `writer`. `name` appears on the ASCII `solid` line and
/// is ignored for binary output.
///
/// # Errors
///
/// Returns an error if the writer fails or, for binary output, the triangle
/// count does not fit in a `u32`.
pub fn write_stl<W: Write>(
    mesh: &TriangleMesh,
    name: &str,
    encoding: StlEncoding,
    writer: W,
) -> StlResult<()> {
    match encoding {
        StlEncoding::Ascii => write_ascii(mesh, name, writer),
        StlEncoding::Binary => write_binary(mesh, writer),
    }
}

fn write_binary<W: Write>(mesh: &TriangleMesh, mut writer: W) -> StlResult<()> {
    let mut header = [b' '; HEADER_SIZE];
    header[..HEADER_TEXT.len()].copy_from_slice(HEADER_TEXT);
    writer.write_all(&header)?;

    let count = u32::try_from(mesh.triangle_count())
        .map_err(|_| StlError::TooManyTriangles(mesh.triangle_count()))?;
    writer.write_all(&count.to_le_bytes())?;

    for tri in mesh.triangles() {
        let quantized = tri.map(quantize);
        let normal = facet_normal(&quantized).unwrap_or(Vec3::ZERO);
        write_triplet(&mut writer, normal.to_array())?;
        for corner in quantized {
            write_triplet(&mut writer, corner.to_array())?;
        }
        writer.write_all(&0u16.to_le_bytes())?;
    }

    writer.flush()?;
    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
fn write_triplet<W: Write>(writer: &mut W, v: [f64; 3]) -> StlResult<()> {
    for c in v {
        writer.write_all(&(c as f32).to_le_bytes())?;
    }
    Ok(())
}

fn write_ascii<W: Write>(mesh: &TriangleMesh, name: &str, mut writer: W) -> StlResult<()> {
    let name = sanitize_solid_name(name);
    writeln!(writer, "solid {name}")?;

    for tri in mesh.triangles() {
        let quantized = tri.map(quantize);
        let n = facet_normal(&quantized).unwrap_or(Vec3::ZERO);
        writeln!(writer, "  facet normal {} {} {}", f32_of(n.x), f32_of(n.y), f32_of(n.z))?;
        writeln!(writer, "    outer loop")?;
        for p in quantized {
            writeln!(writer, "      vertex {} {} {}", f32_of(p.x), f32_of(p.y), f32_of(p.z))?;
        }
        writeln!(writer, "    endloop")?;
        writeln!(writer, "  endfacet")?;
    }

    writeln!(writer, "endsolid {name}")?;
    writer.flush()?;
    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
fn f32_of(value: f64) -> f32 {
    value as f32
}

fn quantize(p: Point3) -> Point3 {
    Point3::new(
        f64::from(f32_of(p.x)),
        f64::from(f32_of(p.y)),
        f64::from(f32_of(p.z)),
    )
}

/// Keeps the `solid` line a single whitespace-free token.
fn sanitize_solid_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_whitespace() || c.is_control() { '_' } else { c })
        .collect();
    if cleaned.is_empty() { "mesh".to_string() } else { cleaned }
}

/// Reads an STL file in either encoding.
///
/// # Errors
///
/// Returns an error if the file is missing or its content is not valid STL.
pub fn read_stl<P: AsRef<Path>>(path: P) -> StlResult<TriangleMesh> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StlError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            StlError::Io(e)
        }
    })?;
    decode_stl(&bytes)
}

/// Decodes STL bytes, detecting the encoding.
///
/// A buffer is binary when its length matches the triangle count in the
/// header exactly; otherwise it must start with `solid`.
///
/// # Errors
///
/// Returns an error if the content is neither valid binary nor valid ASCII STL.
pub fn decode_stl(bytes: &[u8]) -> StlResult<TriangleMesh> {
    if let Some(count) = binary_count(bytes) {
        if bytes.len() == HEADER_SIZE + 4 + count as usize * TRIANGLE_SIZE {
            return decode_binary(bytes, count);
        }
    }

    let text = String::from_utf8_lossy(bytes);
    if text.trim_start().starts_with("solid") {
        return decode_ascii(&text);
    }

    match binary_count(bytes) {
        Some(count) => Err(StlError::InvalidFaceCount {
            expected: count,
            got: (bytes.len() - HEADER_SIZE - 4) / TRIANGLE_SIZE,
        }),
        None => Err(StlError::invalid_content("file too small to be valid STL")),
    }
}

fn binary_count(bytes: &[u8]) -> Option<u32> {
    let raw = bytes.get(HEADER_SIZE..HEADER_SIZE + 4)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

fn decode_binary(bytes: &[u8], count: u32) -> StlResult<TriangleMesh> {
    let body = &bytes[HEADER_SIZE + 4..];
    let triangles = body.chunks_exact(TRIANGLE_SIZE).map(|record| {
        [
            read_vertex(&record[12..24]),
            read_vertex(&record[24..36]),
            read_vertex(&record[36..48]),
        ]
    });
    let mesh = TriangleMesh::from_triangles(triangles);
    if mesh.triangle_count() != count as usize {
        return Err(StlError::InvalidFaceCount {
            expected: count,
            got: mesh.triangle_count(),
        });
    }
    Ok(mesh)
}

fn read_vertex(buf: &[u8]) -> [f64; 3] {
    let read = |i: usize| f32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);
    [f64::from(read(0)), f64::from(read(4)), f64::from(read(8))]
}

fn decode_ascii(text: &str) -> StlResult<TriangleMesh> {
    let mut triangles = Vec::new();
    let mut corners: Vec<[f64; 3]> = Vec::with_capacity(3);
    let mut in_loop = false;

    for (line_no, line) in text.lines().enumerate() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(keyword) = parts.first() else {
            continue;
        };

        match keyword.to_ascii_lowercase().as_str() {
            "outer" => {
                in_loop = true;
                corners.clear();
            }
            "vertex" if in_loop => {
                if parts.len() < 4 {
                    return Err(StlError::invalid_content(format!(
                        "line {}: vertex needs three coordinates",
                        line_no + 1
                    )));
                }
                let mut v = [0.0; 3];
                for (slot, raw) in v.iter_mut().zip(&parts[1..4]) {
                    let parsed: f32 = raw.parse().map_err(|_| {
                        StlError::invalid_content(format!(
                            "line {}: bad coordinate `{raw}`",
                            line_no + 1
                        ))
                    })?;
                    *slot = f64::from(parsed);
                }
                corners.push(v);
            }
            "endloop" => in_loop = false,
            "endfacet" => {
                let &[a, b, c] = corners.as_slice() else {
                    return Err(StlError::invalid_content(format!(
                        "line {}: facet has {} vertices",
                        line_no + 1,
                        corners.len()
                    )));
                };
                triangles.push([a, b, c]);
                corners.clear();
            }
            "endsolid" => break,
            _ => {}
        }
    }

    Ok(TriangleMesh::from_triangles(triangles))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_mesh() -> TriangleMesh {
        TriangleMesh::new(
            vec![
                [0.1, 0.2, 0.3],
                [1.000_000_1, 0.0, 0.0],
                [0.0, 1.0 / 3.0, 0.0],
                [0.0, 0.0, 1e-7],
            ],
            vec![0, 1, 2, 0, 2, 3],
        )
    }

    fn encode(mesh: &TriangleMesh, encoding: StlEncoding) -> Vec<u8> {
        let mut buf = Vec::new();
        write_stl(mesh, "part", encoding, &mut buf).unwrap();
        buf
    }

    #[test]
    fn binary_layout() {
        let mesh = create_test_mesh();
        let bytes = encode(&mesh, StlEncoding::Binary);
        assert_eq!(bytes.len(), HEADER_SIZE + 4 + 2 * TRIANGLE_SIZE);
        assert_eq!(binary_count(&bytes), Some(2));
        assert!(bytes.starts_with(HEADER_TEXT));
    }

    #[test]
    fn encodings_decode_to_identical_coordinates() {
        let mesh = create_test_mesh();
        let from_ascii = decode_stl(&encode(&mesh, StlEncoding::Ascii)).unwrap();
        let from_binary = decode_stl(&encode(&mesh, StlEncoding::Binary)).unwrap();

        assert_eq!(from_ascii.triangle_count(), 2);
        assert_eq!(from_ascii.positions, from_binary.positions);

        let expected: Vec<[f64; 3]> = mesh
            .quantized_f32()
            .triangles()
            .flat_map(|t| t.map(Point3::to_array))
            .collect();
        assert_eq!(from_binary.positions, expected);
    }

    #[test]
    fn ascii_uses_sanitized_solid_name() {
        let mut buf = Vec::new();
        write_stl(&create_test_mesh(), "my part", StlEncoding::Ascii, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("solid my_part\n"));
        assert!(text.trim_end().ends_with("endsolid my_part"));
    }

    #[test]
    fn facet_normals_follow_winding() {
        let mesh = TriangleMesh::from_triangles([[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]]);
        let text = String::from_utf8(encode(&mesh, StlEncoding::Ascii)).unwrap();
        assert!(text.contains("facet normal 0 0 1"), "{text}");
    }

    #[test]
    fn ascii_stl_parsing() {
        let ascii_stl = b"solid test
  facet normal 0 0 1
    outer loop
      vertex 0 0 0
      vertex 1 0 0
      vertex 0 1 0
    endloop
  endfacet
endsolid test";

        let mesh = decode_stl(ascii_stl).unwrap();
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.vertex_count(), 3);
    }

    #[test]
    fn truncated_binary_is_rejected() {
        let mut bytes = encode(&create_test_mesh(), StlEncoding::Binary);
        bytes.truncate(bytes.len() - 10);
        assert!(matches!(
            decode_stl(&bytes),
            Err(StlError::InvalidFaceCount { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn facet_with_missing_vertex_is_rejected() {
        let ascii_stl = b"solid t\nfacet normal 0 0 1\nouter loop\nvertex 0 0 0\nvertex 1 0 0\nendloop\nendfacet\nendsolid t";
        assert!(matches!(decode_stl(ascii_stl), Err(StlError::InvalidContent { .. })));
    }

    #[test]
    fn load_nonexistent_file() {
        let result = read_stl("nonexistent_file_12345.stl");
        assert!(matches!(result, Err(StlError::FileNotFound { .. })));
    }

    #[test]
    fn roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("part.stl");
        let mesh = create_test_mesh();
        write_stl(
            &mesh,
            "part",
            StlEncoding::Binary,
            std::fs::File::create(&path).unwrap(),
        )
        .unwrap();
        let loaded = read_stl(&path).unwrap();
        assert_eq!(loaded.triangle_count(), mesh.triangle_count());
        assert_eq!(loaded.bounds(), mesh.quantized_f32().bounds());
    }
}
