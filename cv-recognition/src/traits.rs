//! Narrow interfaces between the recognition stages.
//!
//! The sampler only needs a [`SpatialIndex`], the hypothesis generator a
//! [`PairHashIndex`], and the verifier a [`ProjectionGrid`]. Each stage can therefore be
//! exercised against a small hand-written implementation.

use crate::{HashCell, Leaf};
use arrayvec::ArrayVec;
use nalgebra::{Point3, Vector3};
use rand::Rng;

/// The maximum number of cells a lookup in a 3d hash table can return.
pub const MAX_NEIGHBOR_CELLS: usize = 27;

/// An index over the occupied voxels of a point set.
pub trait SpatialIndex {
    /// All occupied voxels. Leaf ids are indices into this slice.
    fn full_leaves(&self) -> &[Leaf];

    /// Picks a random occupied voxel whose representative point lies at a distance of
    /// `radius ± tolerance` from `center`.
    fn random_leaf_on_sphere<R: Rng + ?Sized>(
        &self,
        center: &Point3<f64>,
        radius: f64,
        tolerance: f64,
        rng: &mut R,
    ) -> Option<usize>;
}

/// Geometric hash table over oriented point pair signatures.
pub trait PairHashIndex {
    /// Retrieves the cell of `signature` along with its existing neighbor cells.
    fn neighbors(&self, signature: &Vector3<f64>) -> ArrayVec<&HashCell, MAX_NEIGHBOR_CELLS>;
}

/// The outcome of testing a 3d point against a range image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthTest {
    /// The point does not project into a pixel with data.
    NoPixel,
    /// The point lies in front of the visible surface, where the sensor should have seen it.
    InFront,
    /// The point lies within the visible depth interval of the contained pixel.
    Visible(usize),
    /// The point is hidden behind the visible surface.
    Behind,
}

/// A 2d grid storing the visible depth interval of a scene.
pub trait ProjectionGrid {
    /// The id of the pixel `point` projects into, if that pixel holds scene data.
    fn pixel_id(&self, point: &Point3<f64>) -> Option<usize>;

    /// The visible depth interval `[z1, z2]` of a pixel.
    fn visible_interval(&self, pixel: usize) -> Option<(f64, f64)>;

    fn classify(&self, point: &Point3<f64>) -> DepthTest {
        let pixel = match self.pixel_id(point) {
            Some(pixel) => pixel,
            None => return DepthTest::NoPixel,
        };
        match self.visible_interval(pixel) {
            Some((z1, _)) if point.z < z1 => DepthTest::InFront,
            Some((_, z2)) if point.z <= z2 => DepthTest::Visible(pixel),
            Some(_) => DepthTest::Behind,
            None => DepthTest::NoPixel,
        }
    }
}
