use crate::{
    points_are_coplanar, Error, ModelPair, Octree, OrientedPoint, PairFrame, PairHashTable,
    SpatialIndex,
};
use log::*;
use nalgebra::Point3;
use slotmap::{new_key_type, SlotMap};
use std::collections::HashMap;

new_key_type! {
    /// Identifies a model registered in a [`ModelLibrary`].
    pub struct ModelKey;
}

/// A registered object model.
#[derive(Debug, Clone)]
pub struct Model<D> {
    name: String,
    octree: Octree,
    centroid: Point3<f64>,
    user_data: D,
}

impl<D> Model<D> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn octree(&self) -> &Octree {
        &self.octree
    }

    /// The mean of the model's voxel representatives.
    pub fn centroid(&self) -> Point3<f64> {
        self.centroid
    }

    pub fn user_data(&self) -> &D {
        &self.user_data
    }

    /// The number of occupied voxels of the model.
    pub fn num_voxels(&self) -> usize {
        self.octree.len()
    }
}

/// Stores the object models and the geometric hash table of all their oriented point pairs.
#[derive(Debug, Clone)]
pub struct ModelLibrary<D> {
    pair_width: f64,
    pair_width_tolerance: f64,
    voxel_size: f64,
    max_coplanarity_angle: f64,
    ignore_coplanar_opps: bool,
    models: SlotMap<ModelKey, Model<D>>,
    names: HashMap<String, ModelKey>,
    hash_table: PairHashTable,
}

impl<D> ModelLibrary<D> {
    pub fn new(
        pair_width: f64,
        pair_width_tolerance: f64,
        voxel_size: f64,
        max_coplanarity_angle: f64,
        ignore_coplanar_opps: bool,
    ) -> Self {
        Self {
            pair_width,
            pair_width_tolerance,
            voxel_size,
            max_coplanarity_angle,
            ignore_coplanar_opps,
            models: SlotMap::with_key(),
            names: HashMap::new(),
            hash_table: PairHashTable::default(),
        }
    }

    /// Registers a model and hashes every ordered pair of its voxels lying `pair_width`
    /// apart.
    ///
    /// Fails if a model with the same name exists or if no point of the model is usable.
    pub fn add_model(
        &mut self,
        name: impl Into<String>,
        points: &[OrientedPoint],
        user_data: D,
    ) -> Result<ModelKey, Error> {
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(Error::DuplicateModel(name));
        }
        let octree = Octree::build(points, self.voxel_size);
        let centroid = match octree.centroid() {
            Some(centroid) => centroid,
            None => return Err(Error::EmptyModel(name)),
        };

        let key = self.models.insert(Model {
            name: name.clone(),
            octree,
            centroid,
            user_data,
        });
        self.names.insert(name, key);

        let octree = &self.models[key].octree;
        let leaves = octree.full_leaves();
        let mut num_pairs = 0;
        for (first, leaf1) in leaves.iter().enumerate() {
            for second in
                octree.leaves_on_sphere(&leaf1.point, self.pair_width, self.pair_width_tolerance)
            {
                let leaf2 = &leaves[second];
                if self.ignore_coplanar_opps
                    && points_are_coplanar(
                        &leaf1.point,
                        &leaf1.normal,
                        &leaf2.point,
                        &leaf2.normal,
                        self.max_coplanarity_angle,
                    )
                {
                    continue;
                }
                let frame =
                    PairFrame::new(&leaf1.point, &leaf1.normal, &leaf2.point, &leaf2.normal);
                let signature = crate::pair_signature(
                    &leaf1.point,
                    &leaf1.normal,
                    &leaf2.point,
                    &leaf2.normal,
                );
                if let (Some(frame), Some(signature)) = (frame, signature) {
                    let pair = ModelPair {
                        first,
                        second,
                        frame,
                    };
                    if self.hash_table.insert(&signature, key, pair) {
                        num_pairs += 1;
                    }
                }
            }
        }
        debug!(
            "added model {:?}: {} voxels, {} oriented point pairs",
            self.models[key].name,
            leaves.len(),
            num_pairs
        );
        Ok(key)
    }

    pub fn model(&self, key: ModelKey) -> Option<&Model<D>> {
        self.models.get(key)
    }

    pub fn key(&self, name: &str) -> Option<ModelKey> {
        self.names.get(name).copied()
    }

    pub fn model_by_name(&self, name: &str) -> Option<&Model<D>> {
        self.model(self.key(name)?)
    }

    pub fn models(&self) -> impl Iterator<Item = (ModelKey, &Model<D>)> {
        self.models.iter()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn hash_table(&self) -> &PairHashTable {
        &self.hash_table
    }

    /// Removes all models along with their hash table entries.
    pub fn clear(&mut self) {
        self.models.clear();
        self.names.clear();
        self.hash_table.clear();
    }
}
