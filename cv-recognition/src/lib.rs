//! Recognition of rigid objects in 3d scenes of oriented points.
//!
//! Models are registered in a [`ModelLibrary`], which hashes oriented point pairs of every
//! model by a rotation and translation invariant signature. To recognize objects in a
//! scene, [`ObjRecRansac`] samples oriented point pairs from the scene, looks up model
//! pairs with a similar signature, and turns every match into a pose hypothesis. The
//! hypotheses are clustered in a discretized transform space, verified against a range
//! image of the scene, and finally filtered so that no two detections claim the same part
//! of the scene.
//!
//! ```
//! use cv_recognition::{ObjRecRansac, OrientedPoint, RecognitionSettings};
//! use nalgebra::{Point3, Vector3};
//! use rand::SeedableRng;
//! use rand_pcg::Pcg64;
//!
//! let settings = RecognitionSettings::new(4.0, 1.0);
//! let mut recognizer = ObjRecRansac::new(settings, Pcg64::seed_from_u64(0)).unwrap();
//! let points = [OrientedPoint::new(Point3::new(0.5, 0.5, 0.5), Vector3::z())];
//! recognizer.add_model("dot", &points, ()).unwrap();
//! assert!(recognizer.recognize(&[], 0.99).is_empty());
//! ```

mod conflict;
mod error;
mod geom;
mod graph;
mod hash_table;
mod hypothesis;
mod library;
mod octree;
mod projection;
mod sampling;
mod settings;
mod traits;
mod transform_space;
mod verification;

pub use conflict::*;
pub use error::*;
pub use geom::*;
pub use graph::*;
pub use hash_table::*;
pub use hypothesis::*;
pub use library::*;
pub use octree::*;
pub use projection::*;
pub use sampling::*;
pub use settings::*;
pub use traits::*;
pub use transform_space::*;
pub use verification::*;

pub use nalgebra;

use log::*;
use nalgebra::IsometryMatrix3;
use rand::Rng;
use std::time::Instant;

/// A detected object.
#[derive(Debug, Clone, PartialEq)]
pub struct Output<D> {
    pub object_name: String,
    /// Maps model coordinates into scene coordinates.
    pub transform: IsometryMatrix3<f64>,
    /// The fraction of model voxels that matched the scene.
    pub confidence: f64,
    pub user_data: D,
}

/// The object recognizer.
///
/// `D` is arbitrary data attached to every model and handed back with each detection.
/// `R` is the random number generator used for sampling.
#[derive(Debug)]
pub struct ObjRecRansac<D, R> {
    settings: RecognitionSettings,
    library: ModelLibrary<D>,
    rng: R,
    sampled_pairs: Vec<OrientedPointPair>,
    accepted_hypotheses: Vec<AcceptedHypothesis>,
}

impl<D, R> ObjRecRansac<D, R>
where
    R: Rng,
{
    /// Fails if `settings` does not pass [`RecognitionSettings::validate`].
    pub fn new(settings: RecognitionSettings, rng: R) -> Result<Self, Error> {
        settings.validate()?;
        Ok(Self {
            settings,
            library: ModelLibrary::new(
                settings.pair_width,
                settings.pair_width_tolerance,
                settings.voxel_size,
                settings.max_coplanarity_angle,
                settings.ignore_coplanar_opps,
            ),
            rng,
            sampled_pairs: vec![],
            accepted_hypotheses: vec![],
        })
    }

    pub fn settings(&self) -> &RecognitionSettings {
        &self.settings
    }

    pub fn set_mode(&mut self, mode: RecognitionMode) {
        self.settings.mode = mode;
    }

    /// See [`ModelLibrary::add_model`].
    pub fn add_model(
        &mut self,
        name: impl Into<String>,
        points: &[OrientedPoint],
        user_data: D,
    ) -> Result<ModelKey, Error> {
        self.library.add_model(name, points, user_data)
    }

    pub fn model_library(&self) -> &ModelLibrary<D> {
        &self.library
    }

    pub fn model_library_mut(&mut self) -> &mut ModelLibrary<D> {
        &mut self.library
    }

    pub fn remove_all_models(&mut self) {
        self.library.clear();
    }

    /// The pairs sampled by the last call to [`Self::recognize`].
    pub fn sampled_oriented_point_pairs(&self) -> &[OrientedPointPair] {
        &self.sampled_pairs
    }

    /// The hypotheses that passed verification in the last call to [`Self::recognize`],
    /// before conflicts between them were resolved.
    pub fn accepted_hypotheses(&self) -> &[AcceptedHypothesis] {
        &self.accepted_hypotheses
    }

    pub fn clear_test_data(&mut self) {
        self.sampled_pairs.clear();
        self.accepted_hypotheses.clear();
    }

    /// The number of pairs to sample so that an object of `relative_obj_size` is hit at
    /// least once with `success_probability`. Probabilities of `1.0` and above are treated
    /// as `0.99`.
    pub fn number_of_iterations(&self, success_probability: f64) -> usize {
        let success_probability = if success_probability >= 1.0 {
            0.99
        } else {
            success_probability
        };
        // Both points of a pair have to lie on the object.
        let p = 0.25 * self.settings.relative_obj_size;
        if p >= 1.0 {
            return 1;
        }
        let iterations = (1.0 - success_probability).ln() / (1.0 - p).ln() + 1.0;
        iterations.max(0.0).floor() as usize
    }

    /// Finds the models of the library in `scene`.
    ///
    /// Returns nothing unless the mode is [`RecognitionMode::FullRecognition`]. The other
    /// modes only fill the introspection data.
    pub fn recognize(
        &mut self,
        scene: &[OrientedPoint],
        success_probability: f64,
    ) -> Vec<Output<D>>
    where
        D: Clone + Sync,
    {
        self.run(scene, success_probability, None).unwrap_or_default()
    }

    /// Like [`Self::recognize`], but gives up with [`Error::DeadlineExceeded`] if
    /// `deadline` passes before one of the stages starts.
    pub fn recognize_with_deadline(
        &mut self,
        scene: &[OrientedPoint],
        success_probability: f64,
        deadline: Instant,
    ) -> Result<Vec<Output<D>>, Error>
    where
        D: Clone + Sync,
    {
        self.run(scene, success_probability, Some(deadline))
    }

    fn run(
        &mut self,
        scene: &[OrientedPoint],
        success_probability: f64,
        deadline: Option<Instant>,
    ) -> Result<Vec<Output<D>>, Error>
    where
        D: Clone + Sync,
    {
        let check_deadline = |stage: Stage| match deadline {
            Some(deadline) if Instant::now() >= deadline => {
                warn!("deadline exceeded before {}", stage);
                Err(Error::DeadlineExceeded(stage))
            }
            _ => Ok(()),
        };
        let settings = self.settings;
        self.clear_test_data();

        check_deadline(Stage::Projection)?;
        let scene_octree = Octree::build(scene, settings.voxel_size);
        let bounds = match scene_octree.bounds() {
            Some(bounds) => bounds,
            None => {
                info!("scene has no usable points");
                return Ok(vec![]);
            }
        };
        let mut projection = DepthProjection::build(&scene_octree, settings.abs_zdist_thresh);
        debug!(
            "scene: {} points, {} voxels, {} pixels",
            scene.len(),
            scene_octree.len(),
            projection.full_pixels().len()
        );

        check_deadline(Stage::Sampling)?;
        let num_iterations = self
            .number_of_iterations(success_probability)
            .min(scene_octree.len());
        let sampling = PairSampling {
            pair_width: settings.pair_width,
            tolerance: settings.pair_width_tolerance,
            max_coplanarity_angle: if settings.ignore_coplanar_opps {
                Some(settings.max_coplanarity_angle)
            } else {
                None
            },
        };
        self.sampled_pairs =
            sample_oriented_point_pairs(&scene_octree, num_iterations, &sampling, &mut self.rng);
        if settings.mode == RecognitionMode::SampleOrientedPointPairs {
            return Ok(vec![]);
        }

        check_deadline(Stage::HypothesisGeneration)?;
        let hypotheses =
            generate_hypotheses(&self.sampled_pairs, self.library.hash_table(), &self.library);
        let mut space = RigidTransformSpace::new(
            bounds.enlarged(settings.scene_bounds_enlargement_factor * bounds.largest_extent()),
            settings.position_discretization,
            settings.rotation_discretization,
        );
        let mut num_clustered = 0;
        for hypothesis in &hypotheses {
            let model = match self.library.model(hypothesis.model) {
                Some(model) => model,
                None => continue,
            };
            let centroid = model.centroid();
            if space.add_rigid_transform(hypothesis.model, &centroid, &hypothesis.transform) {
                num_clustered += 1;
            }
        }
        debug!(
            "clustered {} of {} hypotheses into {} rotation spaces",
            num_clustered,
            hypotheses.len(),
            space.num_rotation_spaces()
        );

        check_deadline(Stage::Verification)?;
        let acceptance = Acceptance {
            visibility: settings.visibility,
            relative_num_of_illegal_pts: settings.relative_num_of_illegal_pts,
        };
        self.accepted_hypotheses =
            verify_hypotheses(&space, &self.library, &projection, &acceptance);
        if settings.mode == RecognitionMode::TestHypotheses {
            return Ok(vec![]);
        }

        check_deadline(Stage::ConflictResolution)?;
        let selected = select_hypotheses(
            &self.accepted_hypotheses,
            &mut projection,
            settings.intersection_fraction,
        );
        let outputs: Vec<Output<D>> = selected
            .iter()
            .filter_map(|&id| {
                let hypothesis = &self.accepted_hypotheses[id];
                let model = self.library.model(hypothesis.model)?;
                Some(Output {
                    object_name: model.name().to_owned(),
                    transform: hypothesis.transform,
                    confidence: hypothesis.confidence,
                    user_data: model.user_data().clone(),
                })
            })
            .collect();

        info!(
            "recognized {} objects from {} pairs, {} hypotheses, {} accepted",
            outputs.len(),
            self.sampled_pairs.len(),
            hypotheses.len(),
            self.accepted_hypotheses.len()
        );
        Ok(outputs)
    }
}
