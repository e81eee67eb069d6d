use crate::{pair_signature, points_are_coplanar, PairFrame, SpatialIndex};
use log::*;
use nalgebra::{Point3, UnitVector3, Vector3};
use rand::Rng;

/// Two oriented points sampled from a scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedPointPair {
    pub p1: Point3<f64>,
    pub n1: UnitVector3<f64>,
    pub p2: Point3<f64>,
    pub n2: UnitVector3<f64>,
}

impl OrientedPointPair {
    /// See [`pair_signature`].
    pub fn signature(&self) -> Option<Vector3<f64>> {
        pair_signature(&self.p1, &self.n1, &self.p2, &self.n2)
    }

    pub fn frame(&self) -> Option<PairFrame> {
        PairFrame::new(&self.p1, &self.n1, &self.p2, &self.n2)
    }

    /// See [`points_are_coplanar`].
    pub fn is_coplanar(&self, max_angle: f64) -> bool {
        points_are_coplanar(&self.p1, &self.n1, &self.p2, &self.n2, max_angle)
    }
}

/// Parameters of [`sample_oriented_point_pairs`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairSampling {
    /// The target distance between the two points of a pair.
    pub pair_width: f64,
    /// The accepted deviation from `pair_width`.
    pub tolerance: f64,
    /// Pairs coplanar within this angle are rejected. `None` keeps coplanar pairs.
    pub max_coplanarity_angle: Option<f64>,
}

/// Samples up to `num_iterations` oriented point pairs from `index`.
///
/// Every iteration draws a first leaf that was not drawn before in this call, so the number
/// of iterations is capped at the number of occupied voxels. The second leaf is a random
/// leaf at `pair_width` from the first one. Iterations without such a leaf, or whose pair
/// is coplanar or has no well-defined frame, produce no pair.
pub fn sample_oriented_point_pairs<I, R>(
    index: &I,
    num_iterations: usize,
    sampling: &PairSampling,
    rng: &mut R,
) -> Vec<OrientedPointPair>
where
    I: SpatialIndex + ?Sized,
    R: Rng + ?Sized,
{
    let leaves = index.full_leaves();
    let num_iterations = num_iterations.min(leaves.len());
    let mut ids: Vec<usize> = (0..leaves.len()).collect();
    let mut pairs = Vec::with_capacity(num_iterations);

    for _ in 0..num_iterations {
        let id = ids.swap_remove(rng.gen_range(0..ids.len()));
        let first = &leaves[id];
        let second = match index.random_leaf_on_sphere(
            &first.point,
            sampling.pair_width,
            sampling.tolerance,
            rng,
        ) {
            Some(second) => &leaves[second],
            None => continue,
        };
        let pair = OrientedPointPair {
            p1: first.point,
            n1: first.normal,
            p2: second.point,
            n2: second.normal,
        };
        if let Some(max_angle) = sampling.max_coplanarity_angle {
            if pair.is_coplanar(max_angle) {
                continue;
            }
        }
        if pair.frame().is_none() {
            continue;
        }
        pairs.push(pair);
    }

    debug!(
        "sampled {} oriented point pairs in {} iterations",
        pairs.len(),
        num_iterations
    );
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Leaf, Octree, OrientedPoint};
    use rand::SeedableRng;
    use rand_pcg::Pcg64;
    use std::cell::RefCell;

    /// Wraps an octree and records the centers of all proximity queries.
    struct RecordingIndex {
        octree: Octree,
        queries: RefCell<Vec<Point3<f64>>>,
    }

    impl SpatialIndex for RecordingIndex {
        fn full_leaves(&self) -> &[Leaf] {
            self.octree.full_leaves()
        }

        fn random_leaf_on_sphere<R: Rng + ?Sized>(
            &self,
            center: &Point3<f64>,
            radius: f64,
            tolerance: f64,
            rng: &mut R,
        ) -> Option<usize> {
            self.queries.borrow_mut().push(*center);
            self.octree.random_leaf_on_sphere(center, radius, tolerance, rng)
        }
    }

    /// A wavy surface, so that most pairs are not coplanar.
    fn wavy_surface() -> Vec<OrientedPoint> {
        (0..20)
            .flat_map(|x| (0..20).map(move |y| (x as f64 + 0.5, y as f64 + 0.5)))
            .map(|(x, y)| {
                let z = 2.0 * (0.4 * x).sin() + 1.5 * (0.3 * y).cos();
                let normal = Vector3::new(0.8 * (0.4 * x).cos(), -0.45 * (0.3 * y).sin(), -1.0);
                OrientedPoint::new(Point3::new(x, y, z), normal)
            })
            .collect()
    }

    fn sampling() -> PairSampling {
        PairSampling {
            pair_width: 5.0,
            tolerance: 1.0,
            max_coplanarity_angle: Some(3f64.to_radians()),
        }
    }

    #[test]
    fn first_points_are_drawn_without_replacement() {
        let index = RecordingIndex {
            octree: Octree::build(&wavy_surface(), 1.0),
            queries: RefCell::new(vec![]),
        };
        let num_leaves = index.full_leaves().len();
        let mut rng = Pcg64::seed_from_u64(1);
        let pairs = sample_oriented_point_pairs(&index, 10 * num_leaves, &sampling(), &mut rng);

        let queries = index.queries.borrow();
        assert_eq!(queries.len(), num_leaves);
        assert!(pairs.len() <= queries.len());
        let mut drawn: Vec<usize> = queries
            .iter()
            .map(|query| {
                index
                    .full_leaves()
                    .iter()
                    .position(|leaf| leaf.point == *query)
                    .unwrap()
            })
            .collect();
        drawn.sort_unstable();
        drawn.dedup();
        assert_eq!(drawn.len(), num_leaves);
    }

    #[test]
    fn emitted_pairs_are_not_coplanar() {
        let octree = Octree::build(&wavy_surface(), 1.0);
        let mut rng = Pcg64::seed_from_u64(2);
        let sampling = sampling();
        let pairs = sample_oriented_point_pairs(&octree, 300, &sampling, &mut rng);
        assert!(!pairs.is_empty());
        for pair in &pairs {
            assert!(!pair.is_coplanar(sampling.max_coplanarity_angle.unwrap()));
            let distance = (pair.p2 - pair.p1).norm();
            assert!((distance - sampling.pair_width).abs() <= sampling.tolerance);
        }
    }

    #[test]
    fn coplanar_pairs_survive_without_the_filter() {
        let plane: Vec<_> = (0..12)
            .flat_map(|x| (0..12).map(move |y| (x, y)))
            .map(|(x, y)| {
                OrientedPoint::new(Point3::new(x as f64 + 0.5, y as f64 + 0.5, 0.5), -Vector3::z())
            })
            .collect();
        let octree = Octree::build(&plane, 1.0);
        let mut rng = Pcg64::seed_from_u64(3);
        let filtered = sample_oriented_point_pairs(&octree, 50, &sampling(), &mut rng);
        assert!(filtered.is_empty());
        let unfiltered = PairSampling {
            max_coplanarity_angle: None,
            ..sampling()
        };
        assert!(!sample_oriented_point_pairs(&octree, 50, &unfiltered, &mut rng).is_empty());
    }

    #[test]
    fn empty_index_yields_nothing() {
        let octree = Octree::build(&[], 1.0);
        let mut rng = Pcg64::seed_from_u64(4);
        assert!(sample_oriented_point_pairs(&octree, 100, &sampling(), &mut rng).is_empty());
    }
}
