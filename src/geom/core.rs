use std::ops::{Mul, Neg, Sub};

// ─────────────────────────────────────────────────────────────────────────────
// Vec3 / Point3
// ─────────────────────────────────────────────────────────────────────────────

/// Shared storage and array conversions for the two coordinate triples.
macro_rules! coordinate_triple {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Default)]
        pub struct $name {
            pub x: f64,
            pub y: f64,
            pub z: f64,
        }

        impl $name {
            #[must_use]
            pub const fn new(x: f64, y: f64, z: f64) -> Self {
                Self { x, y, z }
            }

            #[must_use]
            pub const fn from_array([x, y, z]: [f64; 3]) -> Self {
                Self { x, y, z }
            }

            #[must_use]
            pub const fn to_array(self) -> [f64; 3] {
                [self.x, self.y, self.z]
            }
        }

        impl From<[f64; 3]> for $name {
            fn from(arr: [f64; 3]) -> Self {
                Self::from_array(arr)
            }
        }
    };
}

coordinate_triple!(
    /// Direction or offset. Rotations apply to it; translations never occur.
    Vec3
);

coordinate_triple!(
    /// Mesh vertex position.
    Point3
);

impl Vec3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);
    pub const X: Self = Self::new(1.0, 0.0, 0.0);
    pub const Y: Self = Self::new(0.0, 1.0, 0.0);
    pub const Z: Self = Self::new(0.0, 0.0, 1.0);

    #[must_use]
    pub fn dot(self, rhs: Self) -> f64 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    #[must_use]
    pub fn cross(self, rhs: Self) -> Self {
        Self::new(
            self.y * rhs.z - self.z * rhs.y,
            self.z * rhs.x - self.x * rhs.z,
            self.x * rhs.y - self.y * rhs.x,
        )
    }

    #[must_use]
    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Unit vector, or `None` for a zero or non-finite vector.
    #[must_use]
    pub fn normalized(self) -> Option<Self> {
        let len = self.length();
        (len.is_finite() && len > 0.0).then(|| Self::new(self.x / len, self.y / len, self.z / len))
    }
}

impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Self;
    fn mul(self, s: f64) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }
}

impl Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self {
        self * -1.0
    }
}

impl Point3 {
    /// `self - rhs` as a vector.
    #[must_use]
    pub fn sub_point(self, rhs: Self) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Sub for Point3 {
    type Output = Vec3;
    fn sub(self, rhs: Self) -> Vec3 {
        self.sub_point(rhs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mat3
// ─────────────────────────────────────────────────────────────────────────────

/// Row-major 3x3 matrix. Only rotations and axis permutations are built, so
/// there is no translation part.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat3 {
    rows: [[f64; 3]; 3],
}

impl Mat3 {
    #[must_use]
    pub const fn identity() -> Self {
        Self::from_rows([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
    }

    #[must_use]
    pub const fn from_rows(rows: [[f64; 3]; 3]) -> Self {
        Self { rows }
    }

    /// Right-handed rotation about X, `angle` in radians.
    #[must_use]
    pub fn rotate_x(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self::from_rows([[1.0, 0.0, 0.0], [0.0, c, -s], [0.0, s, c]])
    }

    /// Right-handed rotation about Y, `angle` in radians.
    #[must_use]
    pub fn rotate_y(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self::from_rows([[c, 0.0, s], [0.0, 1.0, 0.0], [-s, 0.0, c]])
    }

    /// Right-handed rotation about Z, `angle` in radians.
    #[must_use]
    pub fn rotate_z(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self::from_rows([[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]])
    }

    /// Right-handed rotation by `angle` radians about `axis` (Rodrigues).
    /// `None` when the axis has no length.
    #[must_use]
    pub fn rotate_axis(axis: Vec3, angle: f64) -> Option<Self> {
        let k = axis.normalized()?;
        let (s, c) = angle.sin_cos();
        let t = 1.0 - c;
        Some(Self::from_rows([
            [c + t * k.x * k.x, t * k.x * k.y - s * k.z, t * k.x * k.z + s * k.y],
            [t * k.y * k.x + s * k.z, c + t * k.y * k.y, t * k.y * k.z - s * k.x],
            [t * k.z * k.x - s * k.y, t * k.z * k.y + s * k.x, c + t * k.z * k.z],
        ]))
    }

    fn column(&self, j: usize) -> Vec3 {
        Vec3::new(self.rows[0][j], self.rows[1][j], self.rows[2][j])
    }

    fn row(&self, i: usize) -> Vec3 {
        Vec3::from_array(self.rows[i])
    }

    #[must_use]
    pub fn transpose(self) -> Self {
        Self::from_rows([
            self.column(0).to_array(),
            self.column(1).to_array(),
            self.column(2).to_array(),
        ])
    }

    #[must_use]
    pub fn determinant(self) -> f64 {
        self.row(0).dot(self.row(1).cross(self.row(2)))
    }

    /// Orthonormal with determinant +1, within `tol`.
    #[must_use]
    pub fn is_rotation(self, tol: Tolerance) -> bool {
        let gram = self * self.transpose();
        let orthonormal = (0..3).all(|i| {
            (0..3).all(|j| {
                let expected = if i == j { 1.0 } else { 0.0 };
                tol.approx_eq_f64(gram.rows[i][j], expected)
            })
        });
        orthonormal && tol.approx_eq_f64(self.determinant(), 1.0)
    }

    #[must_use]
    pub fn apply_vec(self, v: Vec3) -> Vec3 {
        Vec3::new(self.row(0).dot(v), self.row(1).dot(v), self.row(2).dot(v))
    }

    #[must_use]
    pub fn apply_point(self, p: Point3) -> Point3 {
        Point3::from_array(self.apply_vec(Vec3::from_array(p.to_array())).to_array())
    }
}

impl Default for Mat3 {
    fn default() -> Self {
        Self::identity()
    }
}

/// `a * b` applies `b` first.
impl Mul for Mat3 {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        let mut rows = [[0.0; 3]; 3];
        for (i, row) in rows.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = self.row(i).dot(rhs.column(j));
            }
        }
        Self::from_rows(rows)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BBox
// ─────────────────────────────────────────────────────────────────────────────

/// Axis-aligned bounds. Relative tessellation tolerances scale by
/// [`BBox::diagonal`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub min: Point3,
    pub max: Point3,
}

impl BBox {
    #[must_use]
    pub const fn new(min: Point3, max: Point3) -> Self {
        Self { min, max }
    }

    /// `None` for an empty iterator.
    #[must_use]
    pub fn from_points(points: impl IntoIterator<Item = Point3>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        Some(points.fold(Self::new(first, first), Self::expand_point))
    }

    #[must_use]
    pub fn expand_point(self, p: Point3) -> Self {
        Self::new(
            Point3::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z)),
            Point3::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z)),
        )
    }

    #[must_use]
    pub fn union(self, other: Self) -> Self {
        self.expand_point(other.min).expand_point(other.max)
    }

    #[must_use]
    pub fn size(self) -> Vec3 {
        self.max - self.min
    }

    #[must_use]
    pub fn diagonal(self) -> f64 {
        self.size().length()
    }

    #[must_use]
    pub fn center(self) -> Point3 {
        Point3::new(
            0.5 * (self.min.x + self.max.x),
            0.5 * (self.min.y + self.max.y),
            0.5 * (self.min.z + self.max.z),
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tolerance
// ─────────────────────────────────────────────────────────────────────────────

/// Absolute epsilon for float comparisons.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub eps: f64,
}

impl Tolerance {
    /// 1e-9, exact arithmetic checks.
    pub const DEFAULT: Self = Self { eps: 1e-9 };
    /// 1e-6, mesh welding and anything that went through `f32` or trig.
    pub const LOOSE: Self = Self { eps: 1e-6 };

    #[must_use]
    pub fn approx_eq_f64(self, a: f64, b: f64) -> bool {
        (a - b).abs() <= self.eps
    }

    #[must_use]
    pub fn is_zero_vec3(self, v: Vec3) -> bool {
        v.dot(v) <= self.eps * self.eps
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn cross_follows_the_right_hand_rule() {
        assert_eq!(Vec3::X.cross(Vec3::Y), Vec3::Z);
        assert_eq!(Vec3::Y.cross(Vec3::X), -Vec3::Z);
        assert_eq!(Vec3::new(3.0, 0.0, 4.0).normalized(), Some(Vec3::new(0.6, 0.0, 0.8)));
        assert_eq!(Vec3::ZERO.normalized(), None);
    }

    #[test]
    fn quarter_turns_cycle_the_axes() {
        let tol = Tolerance::DEFAULT;
        assert!(tol.is_zero_vec3(Mat3::rotate_x(FRAC_PI_2).apply_vec(Vec3::Y) - Vec3::Z));
        assert!(tol.is_zero_vec3(Mat3::rotate_y(FRAC_PI_2).apply_vec(Vec3::Z) - Vec3::X));
        assert!(tol.is_zero_vec3(Mat3::rotate_z(FRAC_PI_2).apply_vec(Vec3::X) - Vec3::Y));
    }

    #[test]
    fn axis_rotation_matches_the_fixed_axis_turns() {
        let tol = Tolerance::DEFAULT;
        for (axis, fixed) in [
            (Vec3::X, Mat3::rotate_x(0.7)),
            (Vec3::Y * 3.0, Mat3::rotate_y(0.7)),
            (Vec3::Z, Mat3::rotate_z(0.7)),
        ] {
            let general = Mat3::rotate_axis(axis, 0.7).unwrap();
            let v = Vec3::new(0.3, -1.2, 2.5);
            assert!(tol.is_zero_vec3(general.apply_vec(v) - fixed.apply_vec(v)));
        }
        assert!(Mat3::rotate_axis(Vec3::ZERO, 1.0).is_none());
    }

    #[test]
    fn product_applies_right_operand_first() {
        let a = Mat3::rotate_z(FRAC_PI_2);
        let b = Mat3::rotate_x(FRAC_PI_2);
        let v = Vec3::new(0.3, -1.2, 2.5);
        let expected = a.apply_vec(b.apply_vec(v));
        assert!(Tolerance::DEFAULT.is_zero_vec3((a * b).apply_vec(v) - expected));
    }

    #[test]
    fn transpose_undoes_a_rotation() {
        let r = Mat3::rotate_x(0.3) * Mat3::rotate_y(-1.1) * Mat3::rotate_z(2.0);
        assert!(r.is_rotation(Tolerance::DEFAULT));
        let v = Vec3::new(1.0, -2.0, 0.5);
        assert!(Tolerance::DEFAULT.is_zero_vec3(r.transpose().apply_vec(r.apply_vec(v)) - v));
    }

    #[test]
    fn mirror_is_not_a_rotation() {
        let mirror = Mat3::from_rows([[-1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
        assert!((mirror.determinant() + 1.0).abs() < 1e-12);
        assert!(!mirror.is_rotation(Tolerance::DEFAULT));
    }

    #[test]
    fn bounds_of_points() {
        let bbox = BBox::from_points([
            Point3::new(0.0, 4.0, 0.0),
            Point3::new(2.0, 0.0, 6.0),
            Point3::new(1.0, 1.0, 1.0),
        ])
        .unwrap();

        assert_eq!(bbox.min, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(bbox.max, Point3::new(2.0, 4.0, 6.0));
        assert_eq!(bbox.center(), Point3::new(1.0, 2.0, 3.0));
        assert!((bbox.diagonal() - 56.0_f64.sqrt()).abs() < 1e-12);
        assert!(BBox::from_points(std::iter::empty()).is_none());
    }

    #[test]
    fn union_covers_both() {
        let a = BBox::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        let b = BBox::new(Point3::new(-1.0, 0.5, 0.5), Point3::new(0.5, 3.0, 0.5));
        let u = a.union(b);
        assert_eq!(u.min, Point3::new(-1.0, 0.0, 0.0));
        assert_eq!(u.max, Point3::new(1.0, 3.0, 1.0));
    }
}
