use crate::{ModelKey, PairFrame, PairHashIndex, MAX_NEIGHBOR_CELLS};
use arrayvec::ArrayVec;
use core::f64::consts::PI;
use nalgebra::Vector3;
use std::collections::{BTreeMap, HashMap};

/// Keeps signatures of exactly `0` or `pi` inside the table.
const BOUNDS_EPS: f64 = 1e-6;

/// The default number of cells along each axis of the signature space.
pub const DEFAULT_CELLS_PER_AXIS: usize = 60;

/// An oriented point pair of a model, stored as two leaf ids of the model's octree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPair {
    pub first: usize,
    pub second: usize,
    /// The pair frame, computed once when the model is registered.
    pub frame: PairFrame,
}

/// The content of one hash table cell: the pairs of each model that share (approximately)
/// one signature.
pub type HashCell = BTreeMap<ModelKey, Vec<ModelPair>>;

/// A sparse 3d grid over the signature space `[0, pi]^3`.
#[derive(Debug, Clone)]
pub struct PairHashTable {
    min: f64,
    cell_size: f64,
    cells_per_axis: i64,
    cells: HashMap<[i64; 3], HashCell>,
}

impl Default for PairHashTable {
    fn default() -> Self {
        Self::new(DEFAULT_CELLS_PER_AXIS)
    }
}

impl PairHashTable {
    pub fn new(cells_per_axis: usize) -> Self {
        let cells_per_axis = cells_per_axis.max(1);
        Self {
            min: -BOUNDS_EPS,
            cell_size: (PI + 2.0 * BOUNDS_EPS) / cells_per_axis as f64,
            cells_per_axis: cells_per_axis as i64,
            cells: HashMap::new(),
        }
    }

    /// The cell coordinates of `signature` or `None` if it lies outside the table.
    pub fn cell_index(&self, signature: &Vector3<f64>) -> Option<[i64; 3]> {
        let mut index = [0; 3];
        for (axis, value) in signature.iter().enumerate() {
            let cell = ((value - self.min) / self.cell_size).floor();
            if !(cell >= 0.0 && cell < self.cells_per_axis as f64) {
                return None;
            }
            index[axis] = cell as i64;
        }
        Some(index)
    }

    /// Adds a model pair under `signature`. Returns `false` if the signature lies outside the
    /// table.
    pub fn insert(&mut self, signature: &Vector3<f64>, model: ModelKey, pair: ModelPair) -> bool {
        match self.cell_index(signature) {
            Some(index) => {
                self.cells
                    .entry(index)
                    .or_default()
                    .entry(model)
                    .or_default()
                    .push(pair);
                true
            }
            None => false,
        }
    }

    pub fn cell(&self, index: [i64; 3]) -> Option<&HashCell> {
        self.cells.get(&index)
    }

    /// All non-empty cells, in no particular order.
    pub fn cells(&self) -> impl Iterator<Item = &HashCell> {
        self.cells.values()
    }

    /// The number of non-empty cells.
    pub fn num_occupied_cells(&self) -> usize {
        self.cells.len()
    }

    /// The number of stored model pairs.
    pub fn num_entries(&self) -> usize {
        self.cells
            .values()
            .flat_map(|cell| cell.values())
            .map(Vec::len)
            .sum()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }
}

impl PairHashIndex for PairHashTable {
    fn neighbors(&self, signature: &Vector3<f64>) -> ArrayVec<&HashCell, MAX_NEIGHBOR_CELLS> {
        let mut neighbors = ArrayVec::new();
        let [x, y, z] = match self.cell_index(signature) {
            Some(index) => index,
            None => return neighbors,
        };
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    if let Some(cell) = self.cells.get(&[x + dx, y + dy, z + dz]) {
                        neighbors.push(cell);
                    }
                }
            }
        }
        neighbors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Point3, UnitVector3};
    use slotmap::SlotMap;

    fn pair(first: usize) -> ModelPair {
        let n = UnitVector3::new_normalize(Vector3::new(0.0, 0.0, 1.0));
        let frame = PairFrame::new(
            &Point3::origin(),
            &n,
            &Point3::new(1.0, 0.0, 0.0),
            &n,
        )
        .unwrap();
        ModelPair {
            first,
            second: first + 1,
            frame,
        }
    }

    #[test]
    fn boundary_angles_stay_inside() {
        let table = PairHashTable::default();
        assert_eq!(table.cell_index(&Vector3::zeros()), Some([0, 0, 0]));
        assert_eq!(table.cell_index(&Vector3::repeat(PI)), Some([59, 59, 59]));
        assert_eq!(table.cell_index(&Vector3::new(PI + 0.1, 0.0, 0.0)), None);
        assert_eq!(table.cell_index(&Vector3::new(f64::NAN, 0.0, 0.0)), None);
    }

    #[test]
    fn neighbors_cover_adjacent_cells_only() {
        let mut models: SlotMap<ModelKey, ()> = SlotMap::with_key();
        let a = models.insert(());
        let b = models.insert(());
        let mut table = PairHashTable::default();
        let step = PI / 60.0;
        let center = Vector3::repeat(30.5 * step);
        assert!(table.insert(&center, a, pair(0)));
        assert!(table.insert(&(center + Vector3::new(step, -step, step)), a, pair(2)));
        assert!(table.insert(&(center + Vector3::new(step, -step, step)), b, pair(4)));
        assert!(table.insert(&(center + Vector3::new(2.0 * step, 0.0, 0.0)), b, pair(6)));
        assert_eq!(table.num_occupied_cells(), 3);
        assert_eq!(table.num_entries(), 4);

        let neighbors = table.neighbors(&center);
        assert_eq!(neighbors.len(), 2);
        let entries: usize = neighbors
            .iter()
            .flat_map(|cell| cell.values())
            .map(Vec::len)
            .sum();
        assert_eq!(entries, 3);
    }

    #[test]
    fn corner_cell_has_few_neighbors() {
        let mut models: SlotMap<ModelKey, ()> = SlotMap::with_key();
        let a = models.insert(());
        let mut table = PairHashTable::new(4);
        for x in 0..4 {
            for y in 0..4 {
                for z in 0..4 {
                    let signature = (Vector3::new(x as f64, y as f64, z as f64)
                        + Vector3::repeat(0.5))
                        * (PI / 4.0);
                    table.insert(&signature, a, pair(0));
                }
            }
        }
        assert_eq!(table.neighbors(&Vector3::repeat(0.1)).len(), 8);
        assert_eq!(table.neighbors(&Vector3::repeat(PI / 2.0 - 0.1)).len(), 27);
    }
}
