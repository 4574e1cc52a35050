//! Rigid re-orientation applied to every exported vertex.
//!
//! The source up-axis is first carried onto the target up-axis by the
//! shortest-arc rotation, a quarter turn about `source × target`, then the
//! user rotations are applied about the fixed X, Y and Z axes in that order:
//!
//! ```text
//! R = Rz · Ry · Rx · P
//! ```
//!
//! For Y-up to Z-up, P keeps X fixed, sends Y to Z and Z to -Y. Every factor
//! is a proper rotation, so triangle winding is preserved.

use std::f64::consts::FRAC_PI_2;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geom::{Mat3, Point3, TriangleMesh, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    #[default]
    Z,
}

impl Axis {
    #[must_use]
    pub const fn unit(self) -> Vec3 {
        match self {
            Self::X => Vec3::X,
            Self::Y => Vec3::Y,
            Self::Z => Vec3::Z,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
        })
    }
}

/// Composed orientation. The identity carries no matrix so applying it
/// touches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum OrientationTransform {
    #[default]
    Identity,
    Rotation(Mat3),
}

impl OrientationTransform {
    /// Builds the transform. Angles are in degrees.
    #[must_use]
    pub fn new(source_up: Axis, target_up: Axis, rotate_x: f64, rotate_y: f64, rotate_z: f64) -> Self {
        let remap = axis_remap(source_up, target_up);
        let angles = [rotate_x, rotate_y, rotate_z];
        if remap.is_none() && angles.iter().all(|a| *a == 0.0) {
            return Self::Identity;
        }

        let rotation = Mat3::rotate_z(rotate_z.to_radians())
            * Mat3::rotate_y(rotate_y.to_radians())
            * Mat3::rotate_x(rotate_x.to_radians());
        Self::Rotation(rotation * remap.unwrap_or_default())
    }

    #[must_use]
    pub const fn is_identity(&self) -> bool {
        matches!(self, Self::Identity)
    }

    #[must_use]
    pub fn matrix(&self) -> Mat3 {
        match self {
            Self::Identity => Mat3::identity(),
            Self::Rotation(m) => *m,
        }
    }

    /// The inverse rotation (transpose).
    #[must_use]
    pub fn inverse(&self) -> Self {
        match self {
            Self::Identity => Self::Identity,
            Self::Rotation(m) => Self::Rotation(m.transpose()),
        }
    }

    #[must_use]
    pub fn apply_point(&self, p: Point3) -> Point3 {
        match self {
            Self::Identity => p,
            Self::Rotation(m) => m.apply_point(p),
        }
    }

    /// Normals rotate with the same matrix as points.
    #[must_use]
    pub fn apply_vec(&self, v: Vec3) -> Vec3 {
        match self {
            Self::Identity => v,
            Self::Rotation(m) => m.apply_vec(v),
        }
    }

    pub fn apply_mesh(&self, mesh: &mut TriangleMesh) {
        if let Self::Rotation(m) = self {
            mesh.map_positions(|p| m.apply_point(p));
        }
    }
}

/// Shortest-arc rotation taking `source` onto `target`; `None` when they
/// match. Distinct coordinate axes are always a quarter turn apart.
fn axis_remap(source: Axis, target: Axis) -> Option<Mat3> {
    if source == target {
        return None;
    }
    Mat3::rotate_axis(source.unit().cross(target.unit()), FRAC_PI_2)
}
