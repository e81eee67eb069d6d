//! A discretized space of rigid transforms used to cluster hypotheses.
//!
//! The translational part is discretized by the position of the transformed model
//! centroid. Every position cell owns a [`RotationSpace`] which in turn discretizes the
//! axis-angle vector of the rotation. All hypotheses of one model that end up in the same
//! rotation cell are merged into a single averaged transform.

use crate::{rotation_vector, Aabb, ModelKey};
use core::f64::consts::PI;
use log::*;
use nalgebra::{IsometryMatrix3, Point3, Rotation3, Translation3, Vector3};
use std::collections::BTreeMap;

/// Accumulates the transforms of one model that fell into one rotation cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformEntry {
    axis_angle_sum: Vector3<f64>,
    translation_sum: Vector3<f64>,
    count: usize,
}

impl TransformEntry {
    pub fn add(&mut self, transform: &IsometryMatrix3<f64>) {
        self.axis_angle_sum += rotation_vector(&transform.rotation);
        self.translation_sum += transform.translation.vector;
        self.count += 1;
    }

    /// The number of transforms added so far.
    pub fn count(&self) -> usize {
        self.count
    }

    /// The transform built from the mean axis-angle vector and the mean translation.
    pub fn average_transform(&self) -> IsometryMatrix3<f64> {
        if self.count == 0 {
            return IsometryMatrix3::identity();
        }
        let n = self.count as f64;
        IsometryMatrix3::from_parts(
            Translation3::from(self.translation_sum / n),
            Rotation3::new(self.axis_angle_sum / n),
        )
    }
}

/// A rotation cell with one [`TransformEntry`] per model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RotationCell {
    entries: BTreeMap<ModelKey, TransformEntry>,
}

impl RotationCell {
    pub fn entries(&self) -> &BTreeMap<ModelKey, TransformEntry> {
        &self.entries
    }
}

/// The rotation cells of one position cell.
#[derive(Debug, Clone, PartialEq)]
pub struct RotationSpace {
    position_cell: [i64; 3],
    cells: BTreeMap<[i64; 3], RotationCell>,
}

impl RotationSpace {
    pub fn position_cell(&self) -> [i64; 3] {
        self.position_cell
    }

    /// The non-empty rotation cells, keyed by their discretized axis-angle vector.
    pub fn cells(&self) -> &BTreeMap<[i64; 3], RotationCell> {
        &self.cells
    }
}

#[derive(Debug, Clone)]
pub struct RigidTransformSpace {
    bounds: Aabb,
    position_discretization: f64,
    rotation_discretization: f64,
    rotation_spaces: BTreeMap<[i64; 3], RotationSpace>,
}

impl RigidTransformSpace {
    /// Creates an empty space. Transformed centroids outside `bounds` are rejected.
    pub fn new(bounds: Aabb, position_discretization: f64, rotation_discretization: f64) -> Self {
        Self {
            bounds,
            position_discretization,
            rotation_discretization,
            rotation_spaces: BTreeMap::new(),
        }
    }

    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    /// Adds the transform of a hypothesis of `model`, whose centroid in model coordinates is
    /// `model_centroid`.
    ///
    /// Returns `false` and leaves the space unchanged if the transformed centroid lies
    /// outside the bounds.
    pub fn add_rigid_transform(
        &mut self,
        model: ModelKey,
        model_centroid: &Point3<f64>,
        transform: &IsometryMatrix3<f64>,
    ) -> bool {
        let centroid = transform * model_centroid;
        if !self.bounds.contains(&centroid) {
            trace!("dropped hypothesis with centroid {:?} outside the bounds", centroid);
            return false;
        }
        let position_cell = discretize(
            &(centroid - self.bounds.min),
            self.position_discretization,
        );
        let rotation_cell = discretize(
            &(rotation_vector(&transform.rotation) + Vector3::repeat(PI)),
            self.rotation_discretization,
        );
        self.rotation_spaces
            .entry(position_cell)
            .or_insert_with(|| RotationSpace {
                position_cell,
                cells: BTreeMap::new(),
            })
            .cells
            .entry(rotation_cell)
            .or_default()
            .entries
            .entry(model)
            .or_default()
            .add(transform);
        true
    }

    /// The rotation spaces in the order of their position cells.
    pub fn rotation_spaces(&self) -> impl Iterator<Item = &RotationSpace> {
        self.rotation_spaces.values()
    }

    pub fn num_rotation_spaces(&self) -> usize {
        self.rotation_spaces.len()
    }

    pub fn clear(&mut self) {
        self.rotation_spaces.clear();
    }
}

fn discretize(v: &Vector3<f64>, step: f64) -> [i64; 3] {
    [
        (v.x / step).floor() as i64,
        (v.y / step).floor() as i64,
        (v.z / step).floor() as i64,
    ]
}
