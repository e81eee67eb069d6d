use crate::Error;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// What [`ObjRecRansac::recognize`](crate::ObjRecRansac::recognize) runs.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum RecognitionMode {
    /// Run the whole pipeline and report the detected objects.
    #[default]
    FullRecognition,
    /// Stop after sampling and keep the sampled pairs for inspection.
    SampleOrientedPointPairs,
    /// Stop after verification and keep the accepted hypotheses for inspection.
    TestHypotheses,
}

/// The settings of the recognizer.
///
/// The sizes are in the units of the point coordinates, the angles in radians.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RecognitionSettings {
    /// The distance between the two points of an oriented point pair.
    pub pair_width: f64,
    /// The side length of the octree voxels and of the depth projection pixels.
    pub voxel_size: f64,
    /// The accepted deviation from `pair_width`.
    pub pair_width_tolerance: f64,
    /// The side length of the position cells of the transform space.
    pub position_discretization: f64,
    /// The side length of the rotation cells of the transform space.
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_rotation_discretization")
    )]
    pub rotation_discretization: f64,
    /// Widens the visible depth interval of every pixel on both sides.
    pub abs_zdist_thresh: f64,
    /// The expected size of an object relative to the scene, used to derive the number of
    /// iterations.
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_relative_obj_size")
    )]
    pub relative_obj_size: f64,
    /// The minimum fraction of model voxels that must match the scene.
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_visibility"))]
    pub visibility: f64,
    /// The maximum fraction of model voxels that may lie in front of the scene.
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_relative_num_of_illegal_pts")
    )]
    pub relative_num_of_illegal_pts: f64,
    /// Two hypotheses conflict if they share more than this fraction of the explained
    /// pixels of either of them.
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_intersection_fraction")
    )]
    pub intersection_fraction: f64,
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_max_coplanarity_angle")
    )]
    pub max_coplanarity_angle: f64,
    /// The scene bounds are enlarged by this fraction of their largest extent on every
    /// side before hypotheses are clustered.
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_scene_bounds_enlargement_factor")
    )]
    pub scene_bounds_enlargement_factor: f64,
    /// Skip coplanar pairs, both in the models and in the scene.
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_ignore_coplanar_opps")
    )]
    pub ignore_coplanar_opps: bool,
    #[cfg_attr(feature = "serde-serialize", serde(default))]
    pub mode: RecognitionMode,
}

impl RecognitionSettings {
    /// Creates settings for the given pair width and voxel size and derives all sizes
    /// that depend on them.
    pub fn new(pair_width: f64, voxel_size: f64) -> Self {
        Self {
            pair_width,
            voxel_size,
            pair_width_tolerance: voxel_size,
            position_discretization: 5.0 * voxel_size,
            rotation_discretization: default_rotation_discretization(),
            abs_zdist_thresh: 1.5 * voxel_size,
            relative_obj_size: default_relative_obj_size(),
            visibility: default_visibility(),
            relative_num_of_illegal_pts: default_relative_num_of_illegal_pts(),
            intersection_fraction: default_intersection_fraction(),
            max_coplanarity_angle: default_max_coplanarity_angle(),
            scene_bounds_enlargement_factor: default_scene_bounds_enlargement_factor(),
            ignore_coplanar_opps: default_ignore_coplanar_opps(),
            mode: RecognitionMode::default(),
        }
    }

    #[must_use]
    pub fn pair_width_tolerance(self, pair_width_tolerance: f64) -> Self {
        Self {
            pair_width_tolerance,
            ..self
        }
    }

    #[must_use]
    pub fn position_discretization(self, position_discretization: f64) -> Self {
        Self {
            position_discretization,
            ..self
        }
    }

    #[must_use]
    pub fn rotation_discretization(self, rotation_discretization: f64) -> Self {
        Self {
            rotation_discretization,
            ..self
        }
    }

    #[must_use]
    pub fn abs_zdist_thresh(self, abs_zdist_thresh: f64) -> Self {
        Self {
            abs_zdist_thresh,
            ..self
        }
    }

    #[must_use]
    pub fn relative_obj_size(self, relative_obj_size: f64) -> Self {
        Self {
            relative_obj_size,
            ..self
        }
    }

    #[must_use]
    pub fn visibility(self, visibility: f64) -> Self {
        Self { visibility, ..self }
    }

    #[must_use]
    pub fn relative_num_of_illegal_pts(self, relative_num_of_illegal_pts: f64) -> Self {
        Self {
            relative_num_of_illegal_pts,
            ..self
        }
    }

    #[must_use]
    pub fn intersection_fraction(self, intersection_fraction: f64) -> Self {
        Self {
            intersection_fraction,
            ..self
        }
    }

    #[must_use]
    pub fn max_coplanarity_angle(self, max_coplanarity_angle: f64) -> Self {
        Self {
            max_coplanarity_angle,
            ..self
        }
    }

    #[must_use]
    pub fn scene_bounds_enlargement_factor(self, scene_bounds_enlargement_factor: f64) -> Self {
        Self {
            scene_bounds_enlargement_factor,
            ..self
        }
    }

    #[must_use]
    pub fn ignore_coplanar_opps(self, ignore_coplanar_opps: bool) -> Self {
        Self {
            ignore_coplanar_opps,
            ..self
        }
    }

    #[must_use]
    pub fn mode(self, mode: RecognitionMode) -> Self {
        Self { mode, ..self }
    }

    /// Checks that sizes are positive, thresholds are non-negative and fractions lie in
    /// `[0, 1]`.
    pub fn validate(&self) -> Result<(), Error> {
        let positive = [
            ("pair_width", self.pair_width),
            ("voxel_size", self.voxel_size),
            ("position_discretization", self.position_discretization),
            ("rotation_discretization", self.rotation_discretization),
        ];
        let non_negative = [
            ("pair_width_tolerance", self.pair_width_tolerance),
            ("abs_zdist_thresh", self.abs_zdist_thresh),
            ("max_coplanarity_angle", self.max_coplanarity_angle),
            (
                "scene_bounds_enlargement_factor",
                self.scene_bounds_enlargement_factor,
            ),
        ];
        let fractions = [
            ("visibility", self.visibility),
            ("relative_num_of_illegal_pts", self.relative_num_of_illegal_pts),
            ("intersection_fraction", self.intersection_fraction),
        ];

        let invalid = positive
            .iter()
            .find(|(_, value)| !(value.is_finite() && *value > 0.0))
            .or_else(|| {
                non_negative
                    .iter()
                    .find(|(_, value)| !(value.is_finite() && *value >= 0.0))
            })
            .or_else(|| {
                fractions
                    .iter()
                    .find(|(_, value)| !(0.0..=1.0).contains(value))
            });
        if let Some(&(name, value)) = invalid {
            return Err(Error::InvalidSetting { name, value });
        }
        // The success probability of a single draw is a quarter of this.
        if !(self.relative_obj_size > 0.0 && self.relative_obj_size <= 1.0) {
            return Err(Error::InvalidSetting {
                name: "relative_obj_size",
                value: self.relative_obj_size,
            });
        }
        Ok(())
    }
}

fn default_rotation_discretization() -> f64 {
    5f64.to_radians()
}

fn default_relative_obj_size() -> f64 {
    0.05
}

fn default_visibility() -> f64 {
    0.06
}

fn default_relative_num_of_illegal_pts() -> f64 {
    0.02
}

fn default_intersection_fraction() -> f64 {
    0.03
}

fn default_max_coplanarity_angle() -> f64 {
    3f64.to_radians()
}

fn default_scene_bounds_enlargement_factor() -> f64 {
    0.25
}

fn default_ignore_coplanar_opps() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_derive_from_the_voxel_size() {
        let settings = RecognitionSettings::new(40.0, 4.0);
        assert_eq!(settings.pair_width_tolerance, 4.0);
        assert_eq!(settings.position_discretization, 20.0);
        assert_eq!(settings.abs_zdist_thresh, 6.0);
        assert_eq!(settings.mode, RecognitionMode::FullRecognition);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn invalid_values_are_named() {
        let settings = RecognitionSettings::new(40.0, 4.0);
        assert_eq!(
            RecognitionSettings::new(40.0, 0.0).validate(),
            Err(Error::InvalidSetting {
                name: "voxel_size",
                value: 0.0
            })
        );
        assert_eq!(
            settings.visibility(1.5).validate(),
            Err(Error::InvalidSetting {
                name: "visibility",
                value: 1.5
            })
        );
        assert_eq!(
            settings.abs_zdist_thresh(-1.0).validate(),
            Err(Error::InvalidSetting {
                name: "abs_zdist_thresh",
                value: -1.0
            })
        );
        assert!(settings.relative_obj_size(2.0).validate().is_err());
        assert!(settings.pair_width_tolerance(0.0).validate().is_ok());
    }
}
