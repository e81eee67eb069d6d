use crate::{ModelKey, ModelLibrary, OrientedPointPair, PairHashIndex};
use log::*;
use nalgebra::IsometryMatrix3;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// A candidate pose of a model in the scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hypothesis {
    pub model: ModelKey,
    /// Maps model coordinates into scene coordinates.
    pub transform: IsometryMatrix3<f64>,
}

/// Generates one hypothesis for every model pair whose signature falls into the hash cell
/// of a scene pair or one of its neighbors.
///
/// The output is ordered by scene pair, then by hash cell, then by model, regardless of
/// whether the pairs are processed in parallel.
pub fn generate_hypotheses<H, D>(
    pairs: &[OrientedPointPair],
    hash_index: &H,
    library: &ModelLibrary<D>,
) -> Vec<Hypothesis>
where
    H: PairHashIndex + Sync + ?Sized,
    D: Sync,
{
    let hypotheses_for_pair = |pair: &OrientedPointPair| -> Vec<Hypothesis> {
        let (signature, scene_frame) = match (pair.signature(), pair.frame()) {
            (Some(signature), Some(frame)) => (signature, frame),
            _ => return vec![],
        };
        let mut hypotheses = vec![];
        for cell in hash_index.neighbors(&signature) {
            for (&model, model_pairs) in cell {
                if library.model(model).is_none() {
                    continue;
                }
                hypotheses.extend(model_pairs.iter().map(|model_pair| Hypothesis {
                    model,
                    transform: scene_frame.transform_from(&model_pair.frame),
                }));
            }
        }
        hypotheses
    };

    #[cfg(not(feature = "rayon"))]
    let hypotheses: Vec<Hypothesis> = pairs.iter().flat_map(hypotheses_for_pair).collect();
    #[cfg(feature = "rayon")]
    let hypotheses: Vec<Hypothesis> = pairs.par_iter().flat_map_iter(hypotheses_for_pair).collect();

    debug!(
        "generated {} hypotheses from {} oriented point pairs",
        hypotheses.len(),
        pairs.len()
    );
    hypotheses
}
