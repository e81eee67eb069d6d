use crate::{
    DepthTest, Leaf, ModelKey, ModelLibrary, ProjectionGrid, RigidTransformSpace, RotationSpace,
    SpatialIndex,
};
use log::*;
use nalgebra::IsometryMatrix3;
use std::collections::BTreeSet;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// How well a transformed model agrees with the scene.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HypothesisScore {
    /// The number of model voxels landing on the visible scene surface.
    pub matched: usize,
    /// The number of model voxels landing in front of the visible scene surface.
    pub illegal: usize,
    /// The pixels hit by the matched voxels.
    pub explained_pixels: BTreeSet<usize>,
}

/// Transforms every leaf into the scene and classifies it against `projection`.
pub fn score_hypothesis<P>(
    leaves: &[Leaf],
    transform: &IsometryMatrix3<f64>,
    projection: &P,
) -> HypothesisScore
where
    P: ProjectionGrid + ?Sized,
{
    let mut score = HypothesisScore::default();
    for leaf in leaves {
        match projection.classify(&(transform * leaf.point)) {
            DepthTest::Visible(pixel) => {
                score.matched += 1;
                score.explained_pixels.insert(pixel);
            }
            DepthTest::InFront => score.illegal += 1,
            DepthTest::NoPixel | DepthTest::Behind => {}
        }
    }
    score
}

/// A hypothesis that passed verification.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedHypothesis {
    pub model: ModelKey,
    pub transform: IsometryMatrix3<f64>,
    /// The fraction of model voxels that matched the scene.
    pub confidence: f64,
    pub matched: usize,
    pub illegal: usize,
    pub explained_pixels: BTreeSet<usize>,
    /// The position cell of the rotation space the hypothesis was found in.
    pub position_cell: [i64; 3],
    /// The rotation cell the hypothesis was averaged in.
    pub rotation_cell: [i64; 3],
}

/// The acceptance criteria of [`verify_hypotheses`], as fractions of the model voxel count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Acceptance {
    /// The minimum fraction of matched voxels.
    pub visibility: f64,
    /// The maximum fraction of illegal voxels.
    pub relative_num_of_illegal_pts: f64,
}

impl Acceptance {
    pub fn accepts(&self, score: &HypothesisScore, num_voxels: usize) -> bool {
        let n = num_voxels as f64;
        score.matched > 0
            && score.matched as f64 >= self.visibility * n
            && score.illegal as f64 <= self.relative_num_of_illegal_pts * n
    }
}

/// Scores the averaged transform of every model entry of every rotation cell and keeps the
/// best accepted one per rotation space.
///
/// Within a rotation space the first accepted hypothesis wins unless a later one explains
/// strictly more pixels. The result is ordered by position cell.
pub fn verify_hypotheses<D, P>(
    space: &RigidTransformSpace,
    library: &ModelLibrary<D>,
    projection: &P,
    acceptance: &Acceptance,
) -> Vec<AcceptedHypothesis>
where
    D: Sync,
    P: ProjectionGrid + Sync + ?Sized,
{
    let best_in_space = |rotation_space: &RotationSpace| -> Option<AcceptedHypothesis> {
        let mut best: Option<AcceptedHypothesis> = None;
        for (&rotation_cell, cell) in rotation_space.cells() {
            for (&model_key, entry) in cell.entries() {
                let model = match library.model(model_key) {
                    Some(model) => model,
                    None => continue,
                };
                let transform = entry.average_transform();
                let score = score_hypothesis(model.octree().full_leaves(), &transform, projection);
                if !acceptance.accepts(&score, model.num_voxels()) {
                    continue;
                }
                let better = best.as_ref().map_or(true, |best| {
                    score.explained_pixels.len() > best.explained_pixels.len()
                });
                if better {
                    best = Some(AcceptedHypothesis {
                        model: model_key,
                        transform,
                        confidence: score.matched as f64 / model.num_voxels() as f64,
                        matched: score.matched,
                        illegal: score.illegal,
                        explained_pixels: score.explained_pixels,
                        position_cell: rotation_space.position_cell(),
                        rotation_cell,
                    });
                }
            }
        }
        best
    };

    let rotation_spaces: Vec<&RotationSpace> = space.rotation_spaces().collect();
    #[cfg(not(feature = "rayon"))]
    let accepted: Vec<AcceptedHypothesis> = rotation_spaces
        .iter()
        .filter_map(|&rotation_space| best_in_space(rotation_space))
        .collect();
    #[cfg(feature = "rayon")]
    let accepted: Vec<AcceptedHypothesis> = rotation_spaces
        .par_iter()
        .filter_map(|&rotation_space| best_in_space(rotation_space))
        .collect();

    debug!(
        "accepted {} hypotheses in {} rotation spaces",
        accepted.len(),
        rotation_spaces.len()
    );
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DepthProjection, Octree, OrientedPoint};
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Rotation3, Translation3, Vector3};

    /// A 6x6 patch of the plane `z = depth` seen from below.
    fn patch(depth: f64) -> Vec<OrientedPoint> {
        (0..6)
            .flat_map(|x| (0..6).map(move |y| (x, y)))
            .map(|(x, y)| {
                OrientedPoint::new(
                    Point3::new(x as f64 + 0.5, y as f64 + 0.5, depth),
                    -Vector3::z(),
                )
            })
            .collect()
    }

    fn acceptance() -> Acceptance {
        Acceptance {
            visibility: 0.5,
            relative_num_of_illegal_pts: 0.02,
        }
    }

    fn shift(x: f64, y: f64, z: f64) -> IsometryMatrix3<f64> {
        IsometryMatrix3::from_parts(Translation3::new(x, y, z), Rotation3::identity())
    }

    #[test]
    fn scores_count_each_voxel_once() {
        let scene = Octree::build(&patch(5.5), 1.0);
        let projection = DepthProjection::build(&scene, 0.5);
        let model = Octree::build(&patch(0.5), 1.0);

        let aligned = score_hypothesis(model.full_leaves(), &shift(0.0, 0.0, 5.0), &projection);
        assert_eq!(aligned.matched, 36);
        assert_eq!(aligned.illegal, 0);
        assert_eq!(aligned.explained_pixels.len(), 36);

        let in_front = score_hypothesis(model.full_leaves(), &shift(3.0, 0.0, 2.0), &projection);
        assert_eq!(in_front.matched, 0);
        assert_eq!(in_front.illegal, 18);

        let behind = score_hypothesis(model.full_leaves(), &shift(0.0, 0.0, 9.0), &projection);
        assert_eq!(behind, HypothesisScore::default());
    }

    #[test]
    fn thresholds_are_fractions_of_the_model_size() {
        let acceptance = acceptance();
        let score = |matched, illegal| HypothesisScore {
            matched,
            illegal,
            explained_pixels: BTreeSet::new(),
        };
        assert!(acceptance.accepts(&score(50, 2), 100));
        assert!(!acceptance.accepts(&score(49, 0), 100));
        assert!(!acceptance.accepts(&score(80, 3), 100));
        let lenient = Acceptance {
            visibility: 0.0,
            ..acceptance
        };
        assert!(!lenient.accepts(&score(0, 0), 100));
    }

    #[test]
    fn one_hypothesis_per_rotation_space() {
        let mut library = ModelLibrary::new(3.0, 1.0, 1.0, 3f64.to_radians(), true);
        let key = library.add_model("patch", &patch(0.5), ()).unwrap();
        let centroid = library.model(key).unwrap().centroid();

        let scene = Octree::build(&patch(5.5), 1.0);
        let projection = DepthProjection::build(&scene, 0.5);
        let bounds = scene.bounds().unwrap();
        let mut space = RigidTransformSpace::new(
            bounds.enlarged(0.25 * bounds.largest_extent()),
            5.0,
            5f64.to_radians(),
        );
        // Two rotation cells in the same position cell: a good one and a bad one.
        let good = shift(0.0, 0.0, 5.0);
        let tilted = IsometryMatrix3::from_parts(
            Translation3::new(0.0, 0.0, 5.0),
            Rotation3::from_axis_angle(&Vector3::x_axis(), 0.6),
        );
        assert!(space.add_rigid_transform(key, &centroid, &good));
        assert!(space.add_rigid_transform(key, &centroid, &tilted));
        assert_eq!(space.num_rotation_spaces(), 1);

        let accepted = verify_hypotheses(&space, &library, &projection, &acceptance());
        assert_eq!(accepted.len(), 1);
        let hypothesis = &accepted[0];
        assert_eq!(hypothesis.model, key);
        assert_eq!(hypothesis.matched, 36);
        assert!((hypothesis.confidence - 1.0).abs() < 1e-12);
        assert!(hypothesis.confidence >= acceptance().visibility);
        assert_relative_eq!(hypothesis.transform, good, epsilon = 1e-12);
    }
}
