use crate::{Octree, ProjectionGrid, SpatialIndex};
use nalgebra::Point3;
use std::collections::{BTreeSet, HashMap};

/// A pixel of the [`DepthProjection`].
#[derive(Debug, Clone, PartialEq)]
pub struct Pixel {
    /// The coordinates of the pixel on the lattice `floor(xy / pixel_size)`.
    pub lattice: [i64; 2],
    /// Start of the visible depth interval.
    pub z1: f64,
    /// End of the visible depth interval.
    pub z2: f64,
    hypotheses: BTreeSet<usize>,
}

impl Pixel {
    pub fn contains_depth(&self, z: f64) -> bool {
        self.z1 <= z && z <= self.z2
    }

    /// Ids of the hypotheses explaining this pixel.
    pub fn hypotheses(&self) -> &BTreeSet<usize> {
        &self.hypotheses
    }
}

/// An orthographic range image of an [`Octree`] on the xy-plane.
///
/// The sensor is assumed to look along the positive z-axis, so smaller z is closer. Each
/// pixel with at least one leaf in it stores the depth interval in which the scene surface
/// is visible, widened by a tolerance on both sides.
///
/// Only pixels holding data are stored. Pixel ids index into [`Self::full_pixels`] and
/// follow the order in which the pixels were first hit.
#[derive(Debug, Clone)]
pub struct DepthProjection {
    pixel_size: f64,
    lattice: HashMap<[i64; 2], usize>,
    pixels: Vec<Pixel>,
}

impl DepthProjection {
    /// Projects every leaf of `octree`. The pixel size equals the voxel size.
    pub fn build(octree: &Octree, abs_zdist_thresh: f64) -> Self {
        let mut projection = Self {
            pixel_size: octree.voxel_size(),
            lattice: HashMap::new(),
            pixels: vec![],
        };
        for leaf in octree.full_leaves() {
            let lattice = match projection.lattice_of(&leaf.point) {
                Some(lattice) => lattice,
                None => continue,
            };
            let z = leaf.point.z;
            match projection.lattice.get(&lattice) {
                Some(&id) => {
                    let pixel = &mut projection.pixels[id];
                    pixel.z1 = pixel.z1.min(z - abs_zdist_thresh);
                    pixel.z2 = pixel.z2.max(z + abs_zdist_thresh);
                }
                None => {
                    projection.lattice.insert(lattice, projection.pixels.len());
                    projection.pixels.push(Pixel {
                        lattice,
                        z1: z - abs_zdist_thresh,
                        z2: z + abs_zdist_thresh,
                        hypotheses: BTreeSet::new(),
                    });
                }
            }
        }
        projection
    }

    pub fn pixel_size(&self) -> f64 {
        self.pixel_size
    }

    pub fn pixel(&self, id: usize) -> Option<&Pixel> {
        self.pixels.get(id)
    }

    /// All pixels holding data, indexed by their id.
    pub fn full_pixels(&self) -> &[Pixel] {
        &self.pixels
    }

    /// Records that `hypothesis` explains `pixel`. Returns `false` for unknown pixels.
    pub fn insert_hypothesis(&mut self, pixel: usize, hypothesis: usize) -> bool {
        match self.pixels.get_mut(pixel) {
            Some(pixel) => {
                pixel.hypotheses.insert(hypothesis);
                true
            }
            None => false,
        }
    }

    pub fn clear_hypotheses(&mut self) {
        for pixel in &mut self.pixels {
            pixel.hypotheses.clear();
        }
    }

    /// The lattice coordinates of the pixel containing the xy-coordinates of `point`.
    fn lattice_of(&self, point: &Point3<f64>) -> Option<[i64; 2]> {
        let x = (point.x / self.pixel_size).floor();
        let y = (point.y / self.pixel_size).floor();
        if x.is_finite() && y.is_finite() {
            Some([x as i64, y as i64])
        } else {
            None
        }
    }
}

impl ProjectionGrid for DepthProjection {
    fn pixel_id(&self, point: &Point3<f64>) -> Option<usize> {
        self.lattice.get(&self.lattice_of(point)?).copied()
    }

    fn visible_interval(&self, pixel: usize) -> Option<(f64, f64)> {
        self.pixel(pixel).map(|pixel| (pixel.z1, pixel.z2))
    }
}
