//! Small geometric helpers shared by the recognition stages.
//!
//! Everything here is a pure function of its arguments. The heavy lifting (vectors,
//! matrices, rotations) is left to [`nalgebra`].

use core::f64::consts::FRAC_PI_2;
use nalgebra::{
    IsometryMatrix3, Matrix3, Point3, Rotation3, Translation3, UnitQuaternion, UnitVector3,
    Vector3,
};

/// Two points closer than this are treated as the same point.
const MIN_PAIR_LENGTH: f64 = 1e-9;

/// A sample of a surface: a position and the surface normal at that position.
///
/// The normal is expected to have unit length. Samples with a vanishing or non-finite
/// normal are dropped when an [`Octree`](crate::Octree) is built from them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedPoint {
    pub point: Point3<f64>,
    pub normal: Vector3<f64>,
}

impl OrientedPoint {
    pub fn new(point: Point3<f64>, normal: Vector3<f64>) -> Self {
        Self { point, normal }
    }
}

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Aabb {
    pub fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// The side lengths of the box.
    pub fn extents(&self) -> Vector3<f64> {
        self.max - self.min
    }

    pub fn largest_extent(&self) -> f64 {
        self.extents().max()
    }

    /// Grows the box by `margin` on every side.
    #[must_use]
    pub fn enlarged(&self, margin: f64) -> Self {
        let margin = Vector3::repeat(margin);
        Self {
            min: self.min - margin,
            max: self.max + margin,
        }
    }

    pub fn contains(&self, point: &Point3<f64>) -> bool {
        (0..3).all(|axis| self.min[axis] <= point[axis] && point[axis] <= self.max[axis])
    }
}

/// Angle in `[0, pi]` between two unit vectors.
pub fn angle_between_unit(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    a.dot(b).clamp(-1.0, 1.0).acos()
}

/// Projects `x` on the plane through the origin with normal `plane_normal`.
pub fn project_on_plane(x: &Vector3<f64>, plane_normal: &UnitVector3<f64>) -> Vector3<f64> {
    x - plane_normal.into_inner() * plane_normal.dot(x)
}

/// Computes the rotation and translation invariant signature of an oriented point pair.
///
/// The three components are the angle between `n1` and the line from `p1` to `p2`,
/// the angle between `n2` and the line from `p2` to `p1`, and the angle between the
/// two normals. Returns `None` if the two points coincide.
pub fn pair_signature(
    p1: &Point3<f64>,
    n1: &UnitVector3<f64>,
    p2: &Point3<f64>,
    n2: &UnitVector3<f64>,
) -> Option<Vector3<f64>> {
    let line = UnitVector3::try_new(p2 - p1, MIN_PAIR_LENGTH)?;
    Some(Vector3::new(
        angle_between_unit(n1, &line),
        angle_between_unit(n2, &-line.into_inner()),
        angle_between_unit(n1, n2),
    ))
}

/// Checks if two oriented points lie (approximately) in one plane.
///
/// This is the case when the normals are parallel within `max_angle` and the line
/// connecting the points is perpendicular to `n1` within `max_angle`. Coincident points
/// carry no line at all and count as coplanar.
pub fn points_are_coplanar(
    p1: &Point3<f64>,
    n1: &UnitVector3<f64>,
    p2: &Point3<f64>,
    n2: &UnitVector3<f64>,
    max_angle: f64,
) -> bool {
    match pair_signature(p1, n1, p2, n2) {
        Some(signature) => {
            signature.z <= max_angle && (signature.x - FRAC_PI_2).abs() <= max_angle
        }
        None => true,
    }
}

/// A right-handed orthonormal frame attached to an oriented point pair.
///
/// The origin is the midpoint of the pair. The x-axis points from the first to the second
/// point. The y-axis is the sum of the normals projected on the plane orthogonal to x.
/// The z-axis completes the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairFrame {
    pub origin: Point3<f64>,
    /// The axes of the frame as the columns of the matrix.
    pub basis: Matrix3<f64>,
}

impl PairFrame {
    /// Returns `None` for degenerate pairs: coincident points, or a normal sum that is
    /// parallel to the connecting line.
    pub fn new(
        p1: &Point3<f64>,
        n1: &UnitVector3<f64>,
        p2: &Point3<f64>,
        n2: &UnitVector3<f64>,
    ) -> Option<Self> {
        let x = UnitVector3::try_new(p2 - p1, MIN_PAIR_LENGTH)?;
        let normal_sum = n1.into_inner() + n2.into_inner();
        let y = UnitVector3::try_new(project_on_plane(&normal_sum, &x), MIN_PAIR_LENGTH)?;
        let (x, y) = (x.into_inner(), y.into_inner());
        Some(Self {
            origin: nalgebra::center(p1, p2),
            basis: Matrix3::from_columns(&[x, y, x.cross(&y)]),
        })
    }

    /// The rigid transform that maps `model` onto `self`.
    pub fn transform_from(&self, model: &PairFrame) -> IsometryMatrix3<f64> {
        // The product of the two bases drifts off the rotation manifold by a few ulps.
        let product = Rotation3::from_matrix_unchecked(self.basis * model.basis.transpose());
        let quaternion = UnitQuaternion::from_rotation_matrix(&product).into_inner();
        let rotation = UnitQuaternion::new_normalize(quaternion).to_rotation_matrix();
        let translation = self.origin.coords - rotation * model.origin.coords;
        IsometryMatrix3::from_parts(Translation3::from(translation), rotation)
    }
}

/// The axis-angle vector of `rotation`, with an angle in `[0, pi]`.
///
/// Unlike [`Rotation3::scaled_axis`] this stays finite when rounding pushes the trace of
/// the matrix slightly out of range.
pub fn rotation_vector(rotation: &Rotation3<f64>) -> Vector3<f64> {
    UnitQuaternion::from_rotation_matrix(rotation).scaled_axis()
}

/// Computes the rigid transform that aligns the model pair `(a1, a1_n, b1, b1_n)` with
/// the scene pair `(a2, a2_n, b2, b2_n)`.
///
/// With exact correspondences the transform maps `a1` onto `a2` and `b1` onto `b2`,
/// and the normals onto their counterparts.
#[allow(clippy::too_many_arguments)]
pub fn rigid_transform_from_pairs(
    a1: &Point3<f64>,
    a1_n: &UnitVector3<f64>,
    b1: &Point3<f64>,
    b1_n: &UnitVector3<f64>,
    a2: &Point3<f64>,
    a2_n: &UnitVector3<f64>,
    b2: &Point3<f64>,
    b2_n: &UnitVector3<f64>,
) -> Option<IsometryMatrix3<f64>> {
    let model = PairFrame::new(a1, a1_n, b1, b1_n)?;
    let scene = PairFrame::new(a2, a2_n, b2, b2_n)?;
    Some(scene.transform_from(&model))
}
