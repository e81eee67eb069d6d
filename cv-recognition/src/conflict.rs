//! Resolution of hypotheses that claim the same part of the scene.

use crate::{AcceptedHypothesis, DepthProjection, Graph};
use itertools::Itertools;
use log::*;
use std::collections::BTreeSet;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Builds the conflict graph of `hypotheses`. Node `i` is `hypotheses[i]`.
///
/// The id of every hypothesis is recorded in the pixels it explains, and any two hypotheses
/// sharing a pixel are connected. An edge is removed again if the shared pixels make up at
/// most `intersection_fraction` of the explained pixels of both hypotheses.
pub fn build_conflict_graph(
    hypotheses: &[AcceptedHypothesis],
    projection: &mut DepthProjection,
    intersection_fraction: f64,
) -> Graph {
    projection.clear_hypotheses();
    for (id, hypothesis) in hypotheses.iter().enumerate() {
        for &pixel in &hypothesis.explained_pixels {
            projection.insert_hypothesis(pixel, id);
        }
    }

    let mut graph = Graph::new(hypotheses.len());
    for pixel in projection.full_pixels() {
        for (&a, &b) in pixel.hypotheses().iter().tuple_combinations() {
            graph.insert_undirected_edge(a, b);
        }
    }

    let weak_edge = |&(a, b): &(usize, usize)| {
        let pixels_a = &hypotheses[a].explained_pixels;
        let pixels_b = &hypotheses[b].explained_pixels;
        let shared = pixels_a.intersection(pixels_b).count() as f64;
        shared / pixels_a.len() as f64 <= intersection_fraction
            && shared / pixels_b.len() as f64 <= intersection_fraction
    };
    let edges: Vec<(usize, usize)> = graph.edges().collect();
    #[cfg(not(feature = "rayon"))]
    let weak: Vec<(usize, usize)> = edges.iter().copied().filter(weak_edge).collect();
    #[cfg(feature = "rayon")]
    let weak: Vec<(usize, usize)> = edges.par_iter().copied().filter(weak_edge).collect();
    for &(a, b) in &weak {
        graph.delete_undirected_edge(a, b);
    }

    debug!(
        "conflict graph: {} nodes, {} edges ({} pruned)",
        graph.len(),
        edges.len() - weak.len(),
        weak.len()
    );
    graph
}

/// Sets the fitness of every node to the number of pixels its hypothesis explains minus
/// the pixels explained by all of its neighbors.
pub fn assign_fitness(graph: &mut Graph, hypotheses: &[AcceptedHypothesis]) {
    let explained = |id: usize| hypotheses[id].explained_pixels.len() as i64;
    let fitness: Vec<i64> = graph
        .nodes()
        .iter()
        .map(|node| {
            let penalty: i64 = node.neighbors().iter().map(|&n| explained(n)).sum();
            explained(node.id()) - penalty
        })
        .collect();
    for (id, fitness) in fitness.into_iter().enumerate() {
        graph.set_fitness(id, fitness);
    }
}

/// Resolves the conflicts between `hypotheses` and returns the indices of the survivors,
/// fittest first.
pub fn select_hypotheses(
    hypotheses: &[AcceptedHypothesis],
    projection: &mut DepthProjection,
    intersection_fraction: f64,
) -> Vec<usize> {
    let mut graph = build_conflict_graph(hypotheses, projection, intersection_fraction);
    assign_fitness(&mut graph, hypotheses);
    let partition = graph.compute_maximal_on_off_partition();
    trace!("switched off hypotheses {:?}", partition.off);
    partition.on
}

/// Checks that no two of the `selected` hypotheses would be connected in the conflict graph.
pub fn is_conflict_free(
    hypotheses: &[AcceptedHypothesis],
    selected: &[usize],
    intersection_fraction: f64,
) -> bool {
    let selected: BTreeSet<usize> = selected.iter().copied().collect();
    selected.iter().tuple_combinations().all(|(&a, &b)| {
        let pixels_a = &hypotheses[a].explained_pixels;
        let pixels_b = &hypotheses[b].explained_pixels;
        let shared = pixels_a.intersection(pixels_b).count();
        shared == 0
            || (shared as f64 / pixels_a.len() as f64 <= intersection_fraction
                && shared as f64 / pixels_b.len() as f64 <= intersection_fraction)
    })
}
