//! Aggregation (C4): rebuilds internal-node representatives bottom-up,
//! height by height, in mean or min-distance-child mode (§4.4).

use rayon::prelude::*;

use crate::tree::{CellPosition, ParentKind, QuadAssignmentTree};
use crate::vector_ops::{self, DataVector, DistanceKind};

/// Recompute every internal node's representative for heights `1..depth`, in
/// increasing order, so each height sees its children's just-updated values
/// (invariant I3).
///
/// The gather+aggregate step for one height is computed in parallel over
/// that height's nodes (disjoint reads of the children, §5); the write-back
/// is a cheap serial pass since non-leaf assignment sub-ranges are identity,
/// so each node's target data-pool slot is already known to be distinct from
/// every other node's at the same height.
pub fn compute_aggregates(tree: &mut QuadAssignmentTree, distance_kind: DistanceKind) {
    for height in 1..tree.depth() {
        let dims = tree.dims_at(height);
        let num_cells = dims.len();
        let element_len = tree.data_element_len();
        let parent_kind = tree.parent_kind();

        let new_values: Vec<Option<DataVector>> = (0..num_cells)
            .into_par_iter()
            .map(|idx| {
                let pos = CellPosition::new(height, idx);
                aggregate_node(tree, pos, parent_kind, element_len, distance_kind)
            })
            .collect();

        for (idx, value) in new_values.into_iter().enumerate() {
            tree.set_value(CellPosition::new(height, idx), value);
        }
    }
}

/// Computes a single internal node's new representative from its four
/// children's *current* values.
fn aggregate_node(
    tree: &QuadAssignmentTree,
    pos: CellPosition,
    parent_kind: ParentKind,
    element_len: usize,
    distance_kind: DistanceKind,
) -> Option<DataVector> {
    let children = tree.children(pos);
    let child_values: Vec<Option<&DataVector>> = children
        .iter()
        .map(|child| child.and_then(|c| tree.value(c)))
        .collect();

    if child_values.iter().all(Option::is_none) {
        return None;
    }

    match parent_kind {
        ParentKind::Mean => Some(vector_ops::aggregate(&child_values, element_len)),
        ParentKind::MinChild => {
            let idx = vector_ops::find_min(&child_values, |a, b| {
                distance_kind.distance(Some(a), Some(b))
            });
            idx.and_then(|i| child_values[i]).cloned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry;

    fn build_tree(parent_kind: ParentKind) -> QuadAssignmentTree {
        let required = geometry::required_capacity(4, 4, 3);
        let data: Vec<Option<DataVector>> = (0..required)
            .map(|i| {
                if i < 16 {
                    Some(vec![i as f64])
                } else {
                    // internal-height slots start as zero; C4 overwrites them.
                    Some(vec![0.0])
                }
            })
            .collect();
        let assignment: Vec<usize> = (0..required).collect();
        QuadAssignmentTree::new(data, assignment, 4, 4, 3, 16, (1, 1, 1), parent_kind).unwrap()
    }

    #[test]
    fn mean_mode_matches_manual_average() {
        let mut tree = build_tree(ParentKind::Mean);
        compute_aggregates(&mut tree, DistanceKind::Euclidean);

        // height 1, node 0 covers leaves {0,1,4,5} (NW quadrant).
        let value = tree.value(CellPosition::new(1, 0)).unwrap();
        assert!((value[0] - 2.5).abs() < 1e-9, "got {:?}", value);
    }

    #[test]
    fn root_aggregates_all_sixteen_leaves() {
        let mut tree = build_tree(ParentKind::Mean);
        compute_aggregates(&mut tree, DistanceKind::Euclidean);

        let root = tree.value(CellPosition::new(2, 0)).unwrap();
        let expected: f64 = (0..16).sum::<i32>() as f64 / 16.0;
        assert!((root[0] - expected).abs() < 1e-9);
    }

    #[test]
    fn min_child_mode_picks_a_real_child_value() {
        let mut tree = build_tree(ParentKind::MinChild);
        compute_aggregates(&mut tree, DistanceKind::Euclidean);

        let value = tree.value(CellPosition::new(1, 0)).unwrap();
        assert!([0.0, 1.0, 4.0, 5.0].contains(&value[0]));
    }

    #[test]
    fn all_null_children_yield_null_parent() {
        let required = geometry::required_capacity(2, 2, 2);
        let data: Vec<Option<DataVector>> = vec![None; required];
        let assignment: Vec<usize> = (0..required).collect();
        let mut tree =
            QuadAssignmentTree::new(data, assignment, 2, 2, 2, 0, (1, 1, 1), ParentKind::Mean)
                .unwrap();
        compute_aggregates(&mut tree, DistanceKind::Euclidean);
        assert_eq!(tree.value(CellPosition::new(1, 0)), None);
    }

    #[test]
    fn rerunning_aggregation_is_idempotent() {
        // R2: re-running C4 twice in a row produces identical results.
        let mut tree = build_tree(ParentKind::Mean);
        compute_aggregates(&mut tree, DistanceKind::Euclidean);
        let first = tree.value(CellPosition::new(1, 0)).unwrap().clone();
        compute_aggregates(&mut tree, DistanceKind::Euclidean);
        let second = tree.value(CellPosition::new(1, 0)).unwrap().clone();
        assert_eq!(first, second);
    }
}
