use crate::{Aabb, OrientedPoint, SpatialIndex};
use nalgebra::{Point3, UnitVector3, Vector3};
use log::*;
use rand::{seq::SliceRandom, Rng};

/// Normals shorter than this carry no usable direction.
const MIN_NORMAL_NORM: f64 = 1e-9;

/// Points whose voxel coordinates exceed this magnitude are dropped, so the extent of the
/// tree and its power-of-two size always fit into an `i64`.
const MAX_VOXEL_COORD: f64 = (1u64 << 52) as f64;

/// The representative of an occupied voxel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Leaf {
    /// The mean of all points inside the voxel.
    pub point: Point3<f64>,
    /// The normalized sum of all normals inside the voxel.
    pub normal: UnitVector3<f64>,
    /// The integer coordinates of the voxel on the lattice `floor(p / voxel_size)`.
    pub voxel: [i64; 3],
}

/// A cube of voxels. Children are created lazily, so only occupied branches exist.
#[derive(Debug, Clone)]
struct Node {
    min: [i64; 3],
    /// Side length in voxels, always a power of two.
    size: i64,
    children: [Option<u32>; 8],
    leaf: Option<usize>,
}

impl Node {
    fn new(min: [i64; 3], size: i64) -> Self {
        Self {
            min,
            size,
            children: [None; 8],
            leaf: None,
        }
    }

    /// The child slot containing `voxel` and the minimum corner of that child.
    fn child_slot(&self, voxel: [i64; 3]) -> (usize, [i64; 3]) {
        let half = self.size / 2;
        let mut slot = 0;
        let mut min = self.min;
        for axis in 0..3 {
            if voxel[axis] >= self.min[axis] + half {
                slot |= 1 << axis;
                min[axis] += half;
            }
        }
        (slot, min)
    }
}

struct Accumulator {
    voxel: [i64; 3],
    point_sum: Vector3<f64>,
    normal_sum: Vector3<f64>,
    first_normal: UnitVector3<f64>,
    count: usize,
}

impl Accumulator {
    fn finish(self) -> Leaf {
        Leaf {
            point: Point3::from(self.point_sum / self.count as f64),
            normal: UnitVector3::try_new(self.normal_sum, MIN_NORMAL_NORM)
                .unwrap_or(self.first_normal),
            voxel: self.voxel,
        }
    }
}

/// A voxel octree over a set of oriented points.
///
/// Nodes live in one arena and refer to each other by index. The leaves of the tree are
/// the occupied voxels; each holds one representative oriented point. Leaves are
/// numbered in order of the first input point falling into them, so identical input
/// always produces an identical tree.
#[derive(Debug, Clone)]
pub struct Octree {
    voxel_size: f64,
    nodes: Vec<Node>,
    leaves: Vec<Leaf>,
    bounds: Option<Aabb>,
}

impl Octree {
    /// Builds the octree. Points with non-finite coordinates, without a usable normal, or
    /// too far from the origin to be addressed by the voxel lattice are skipped.
    pub fn build(points: &[OrientedPoint], voxel_size: f64) -> Self {
        let samples: Vec<(Point3<f64>, UnitVector3<f64>, [i64; 3])> = points
            .iter()
            .filter(|sample| {
                sample.point.coords.iter().all(|c| c.is_finite())
                    && sample.normal.iter().all(|c| c.is_finite())
            })
            .filter_map(|sample| {
                let normal = UnitVector3::try_new(sample.normal, MIN_NORMAL_NORM)?;
                Some((sample.point, normal, voxel_of(&sample.point, voxel_size)?))
            })
            .collect();

        let mut octree = Self {
            voxel_size,
            nodes: vec![],
            leaves: vec![],
            bounds: None,
        };
        if samples.is_empty() {
            return octree;
        }

        let mut min_voxel = [i64::MAX; 3];
        let mut max_voxel = [i64::MIN; 3];
        for (_, _, voxel) in &samples {
            for axis in 0..3 {
                min_voxel[axis] = min_voxel[axis].min(voxel[axis]);
                max_voxel[axis] = max_voxel[axis].max(voxel[axis]);
            }
        }
        let extent = (0..3)
            .map(|axis| max_voxel[axis] - min_voxel[axis] + 1)
            .max()
            .unwrap_or(1);
        let root_size = (extent as u64).next_power_of_two() as i64;
        trace!(
            "octree over {} points, root of {} voxels",
            samples.len(),
            root_size
        );

        octree.nodes.push(Node::new(min_voxel, root_size));
        let mut accumulators: Vec<Accumulator> = vec![];
        for (point, normal, voxel) in samples {
            let mut ix = 0;
            while octree.nodes[ix].size > 1 {
                let (slot, child_min) = octree.nodes[ix].child_slot(voxel);
                ix = match octree.nodes[ix].children[slot] {
                    Some(child) => child as usize,
                    None => {
                        let child = octree.nodes.len();
                        let child_size = octree.nodes[ix].size / 2;
                        octree.nodes.push(Node::new(child_min, child_size));
                        octree.nodes[ix].children[slot] = Some(child as u32);
                        child
                    }
                };
            }
            match octree.nodes[ix].leaf {
                Some(leaf) => {
                    let accumulator = &mut accumulators[leaf];
                    accumulator.point_sum += point.coords;
                    accumulator.normal_sum += normal.into_inner();
                    accumulator.count += 1;
                }
                None => {
                    octree.nodes[ix].leaf = Some(accumulators.len());
                    accumulators.push(Accumulator {
                        voxel,
                        point_sum: point.coords,
                        normal_sum: normal.into_inner(),
                        first_normal: normal,
                        count: 1,
                    });
                }
            }
        }

        octree.leaves = accumulators.into_iter().map(Accumulator::finish).collect();
        octree.bounds = Some(Aabb::new(
            lattice_point(min_voxel, voxel_size),
            lattice_point(max_voxel.map(|v| v + 1), voxel_size),
        ));
        octree
    }

    pub fn voxel_size(&self) -> f64 {
        self.voxel_size
    }

    /// The bounding box of all occupied voxels or `None` if there are none.
    pub fn bounds(&self) -> Option<Aabb> {
        self.bounds
    }

    pub fn leaf(&self, id: usize) -> Option<&Leaf> {
        self.leaves.get(id)
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// The mean of the leaf representatives.
    pub fn centroid(&self) -> Option<Point3<f64>> {
        if self.leaves.is_empty() {
            return None;
        }
        let sum: Vector3<f64> = self.leaves.iter().map(|leaf| leaf.point.coords).sum();
        Some(Point3::from(sum / self.leaves.len() as f64))
    }

    /// All leaves whose representative lies at `radius ± tolerance` from `center`, in
    /// depth-first order.
    pub fn leaves_on_sphere(
        &self,
        center: &Point3<f64>,
        radius: f64,
        tolerance: f64,
    ) -> Vec<usize> {
        let mut found = vec![];
        let mut stack = if self.nodes.is_empty() { vec![] } else { vec![0] };
        while let Some(ix) = stack.pop() {
            let node = &self.nodes[ix];
            if let Some(leaf) = node.leaf {
                if self.leaf_on_sphere(leaf, center, radius, tolerance) {
                    found.push(leaf);
                }
                continue;
            }
            stack.extend(
                node.children
                    .iter()
                    .rev()
                    .flatten()
                    .map(|&child| child as usize)
                    .filter(|&child| self.node_meets_shell(child, center, radius, tolerance)),
            );
        }
        found
    }

    fn leaf_on_sphere(
        &self,
        leaf: usize,
        center: &Point3<f64>,
        radius: f64,
        tolerance: f64,
    ) -> bool {
        ((self.leaves[leaf].point - center).norm() - radius).abs() <= tolerance
    }

    /// Checks if the bounding sphere of a node can reach the spherical shell.
    fn node_meets_shell(
        &self,
        ix: usize,
        center: &Point3<f64>,
        radius: f64,
        tolerance: f64,
    ) -> bool {
        let node = &self.nodes[ix];
        let half = 0.5 * node.size as f64;
        let node_center = Point3::from(
            Vector3::new(
                node.min[0] as f64 + half,
                node.min[1] as f64 + half,
                node.min[2] as f64 + half,
            ) * self.voxel_size,
        );
        let node_radius = half * self.voxel_size * 3f64.sqrt();
        ((node_center - center).norm() - radius).abs() <= node_radius + tolerance
    }
}

impl SpatialIndex for Octree {
    fn full_leaves(&self) -> &[Leaf] {
        &self.leaves
    }

    /// Descends the tree depth-first, visiting the children that reach the shell in random
    /// order, and returns the first leaf found on the shell.
    fn random_leaf_on_sphere<R: Rng + ?Sized>(
        &self,
        center: &Point3<f64>,
        radius: f64,
        tolerance: f64,
        rng: &mut R,
    ) -> Option<usize> {
        let mut stack = if self.nodes.is_empty() { vec![] } else { vec![0] };
        let mut children = Vec::with_capacity(8);
        while let Some(ix) = stack.pop() {
            let node = &self.nodes[ix];
            if let Some(leaf) = node.leaf {
                if self.leaf_on_sphere(leaf, center, radius, tolerance) {
                    return Some(leaf);
                }
                continue;
            }
            children.clear();
            children.extend(
                node.children
                    .iter()
                    .flatten()
                    .map(|&child| child as usize)
                    .filter(|&child| self.node_meets_shell(child, center, radius, tolerance)),
            );
            children.shuffle(rng);
            stack.extend_from_slice(&children);
        }
        None
    }
}

fn voxel_of(point: &Point3<f64>, voxel_size: f64) -> Option<[i64; 3]> {
    let voxel = [0, 1, 2].map(|axis| (point[axis] / voxel_size).floor());
    if voxel.iter().all(|v| v.abs() <= MAX_VOXEL_COORD) {
        Some(voxel.map(|v| v as i64))
    } else {
        None
    }
}

fn lattice_point(voxel: [i64; 3], voxel_size: f64) -> Point3<f64> {
    Point3::new(
        voxel[0] as f64 * voxel_size,
        voxel[1] as f64 * voxel_size,
        voxel[2] as f64 * voxel_size,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    fn up(point: Point3<f64>) -> OrientedPoint {
        OrientedPoint::new(point, Vector3::z())
    }

    fn grid(n: usize) -> Vec<OrientedPoint> {
        (0..n)
            .flat_map(|x| (0..n).map(move |y| (x as f64 + 0.5, y as f64 + 0.5)))
            .map(|(x, y)| up(Point3::new(x, y, 0.5)))
            .collect()
    }

    #[test]
    fn representative_is_the_mean() {
        let octree = Octree::build(
            &[
                OrientedPoint::new(Point3::new(0.2, 0.2, 0.2), Vector3::x()),
                OrientedPoint::new(Point3::new(0.6, 0.4, 0.8), Vector3::y()),
                up(Point3::new(3.5, 0.5, 0.5)),
            ],
            1.0,
        );
        assert_eq!(octree.len(), 2);
        let leaf = octree.full_leaves()[0];
        assert_eq!(leaf.voxel, [0, 0, 0]);
        assert_relative_eq!(leaf.point, Point3::new(0.4, 0.3, 0.5));
        assert_relative_eq!(
            leaf.normal.into_inner(),
            Vector3::new(1.0, 1.0, 0.0).normalize()
        );
        assert_eq!(octree.full_leaves()[1].voxel, [3, 0, 0]);
    }

    #[test]
    fn opposite_normals_fall_back_to_the_first() {
        let octree = Octree::build(
            &[
                OrientedPoint::new(Point3::new(0.5, 0.5, 0.5), Vector3::x()),
                OrientedPoint::new(Point3::new(0.5, 0.5, 0.5), -Vector3::x()),
            ],
            1.0,
        );
        assert_relative_eq!(octree.full_leaves()[0].normal.into_inner(), Vector3::x());
    }

    #[test]
    fn degenerate_points_are_skipped() {
        let octree = Octree::build(
            &[
                OrientedPoint::new(Point3::new(0.5, 0.5, 0.5), Vector3::zeros()),
                OrientedPoint::new(Point3::new(f64::NAN, 0.5, 0.5), Vector3::z()),
                OrientedPoint::new(
                    Point3::new(0.5, 0.5, 0.5),
                    Vector3::new(f64::INFINITY, 0.0, 0.0),
                ),
                OrientedPoint::new(Point3::new(1e300, 0.5, 0.5), Vector3::z()),
            ],
            1.0,
        );
        assert!(octree.is_empty());
        assert!(octree.bounds().is_none());
        assert!(octree.centroid().is_none());
    }

    #[test]
    fn bounds_cover_occupied_voxels() {
        let octree = Octree::build(
            &[up(Point3::new(-0.5, 0.2, 1.1)), up(Point3::new(2.5, 0.9, 1.9))],
            0.5,
        );
        let bounds = octree.bounds().unwrap();
        assert_relative_eq!(bounds.min, Point3::new(-0.5, 0.0, 1.0));
        assert_relative_eq!(bounds.max, Point3::new(3.0, 1.0, 2.0));
    }

    #[test]
    fn sphere_queries_agree() {
        let octree = Octree::build(&grid(12), 1.0);
        let center = octree.full_leaves()[0].point;
        let on_sphere = octree.leaves_on_sphere(&center, 5.0, 0.5);
        assert!(!on_sphere.is_empty());
        for &leaf in &on_sphere {
            let distance = (octree.full_leaves()[leaf].point - center).norm();
            assert!((distance - 5.0).abs() <= 0.5);
        }
        let brute_force = octree
            .full_leaves()
            .iter()
            .filter(|leaf| ((leaf.point - center).norm() - 5.0).abs() <= 0.5)
            .count();
        assert_eq!(on_sphere.len(), brute_force);

        let mut rng = Pcg64::seed_from_u64(0);
        for _ in 0..32 {
            let leaf = octree.random_leaf_on_sphere(&center, 5.0, 0.5, &mut rng).unwrap();
            assert!(on_sphere.contains(&leaf));
        }
    }

    #[test]
    fn no_leaf_beyond_the_cloud() {
        let octree = Octree::build(&grid(4), 1.0);
        let mut rng = Pcg64::seed_from_u64(0);
        let center = octree.full_leaves()[0].point;
        assert!(octree.random_leaf_on_sphere(&center, 50.0, 1.0, &mut rng).is_none());
        assert!(Octree::build(&[], 1.0)
            .random_leaf_on_sphere(&center, 1.0, 1.0, &mut rng)
            .is_none());
    }

    #[test]
    fn far_apart_points_share_one_tree() {
        let mut rng = Pcg64::seed_from_u64(1);
        let octree = Octree::build(
            &[
                up(Point3::new(0.5, 0.5, 0.5)),
                up(Point3::new(2e6, 2e6, 0.5)),
                up(Point3::new(-1e15, 0.5, 0.5)),
            ],
            1.0,
        );
        assert_eq!(octree.len(), 3);
        let bounds = octree.bounds().unwrap();
        assert_relative_eq!(bounds.min.x, -1e15);
        assert_relative_eq!(bounds.max.y, 2e6 + 1.0);
        let near = octree.full_leaves()[0].point;
        assert_eq!(octree.leaves_on_sphere(&near, 3.0, 0.5), Vec::<usize>::new());
        let far = octree.full_leaves()[1].point;
        let distance = (far - near).norm();
        assert_eq!(
            octree.random_leaf_on_sphere(&near, distance, 0.5, &mut rng),
            Some(1)
        );
    }
}
