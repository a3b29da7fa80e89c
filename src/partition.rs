//! Partition scheduler (C7): groups same-height cells into ≤4-cell
//! partitions on a projected grid, with even-odd/odd-even shift, and drives
//! C5 (targets) + C6 (permutation search) over each group (§4.7).

use rayon::prelude::*;

use crate::aggregation;
use crate::swap;
use crate::target::{self, TargetKind};
use crate::tree::{CellPosition, QuadAssignmentTree};
use crate::vector_ops::DistanceKind;

/// `ceil`-aware signed projection of `performPartitionExchanges`'s iteration
/// grid onto groups of `partition_len`, matching the source's
/// `dim/2 + (dim % (2*partition_len)) % partition_len` formula.
fn projected_len(dim: i64, partition_len: i64) -> i64 {
    dim / 2 + (dim % (2 * partition_len)) % partition_len
}

/// The ≤4 in-bounds corner positions of one projected group, at
/// `comparison_height`.
fn group_nodes(
    idx: i64,
    projected_cols: i64,
    partition_len: i64,
    offset: (i64, i64),
    comparison_height: usize,
    comparison_rows: i64,
    comparison_cols: i64,
) -> Vec<CellPosition> {
    let projected_x = idx % projected_cols;
    let projected_y = idx / projected_cols;

    let partition_x = projected_x / partition_len;
    let partition_y = projected_y / partition_len;
    let within_x = projected_x % partition_len;
    let within_y = projected_y % partition_len;

    let base_x = offset.1 + within_x + partition_x * partition_len * 2;
    let base_y = offset.0 + within_y + partition_y * partition_len * 2;

    let in_bounds = |x: i64, y: i64| x >= 0 && x < comparison_cols && y >= 0 && y < comparison_rows;

    let mut nodes = Vec::with_capacity(4);
    for &(dx, dy) in &[(0, 0), (partition_len, 0), (0, partition_len), (partition_len, partition_len)] {
        let (x, y) = (base_x + dx, base_y + dy);
        if in_bounds(x, y) {
            nodes.push(CellPosition::new(
                comparison_height,
                crate::geometry::row_major(y as usize, x as usize, comparison_cols as usize),
            ));
        }
    }
    nodes
}

/// Runs one even-odd or odd-even exchange pass over every partition at
/// `partition_height`, comparing at `comparison_height`, and returns the
/// number of cells whose assignment changed.
///
/// Recomputes aggregates first (the exchange step needs up-to-date
/// representatives above the comparison height), then searches every
/// group's best permutation in parallel (read-only, disjoint groups by
/// construction — shift never causes two groups to share a corner) before
/// applying all of them in one serial pass.
pub fn optimize_partitions(
    tree: &mut QuadAssignmentTree,
    distance_kind: DistanceKind,
    target_kind: TargetKind,
    partition_height: usize,
    comparison_height: usize,
    apply_shift: bool,
) -> usize {
    aggregation::compute_aggregates(tree, distance_kind);

    let partition_len = 1i64 << (partition_height - comparison_height);
    let comparison_dims = tree.dims_at(comparison_height);
    let (comparison_rows, comparison_cols) = (comparison_dims.rows as i64, comparison_dims.cols as i64);

    let mut offset = (0i64, 0i64);
    let mut iteration_rows = comparison_rows;
    let mut iteration_cols = comparison_cols;
    if apply_shift {
        offset.0 -= partition_len;
        offset.1 -= partition_len;
        iteration_rows += 2 * partition_len;
        iteration_cols += 2 * partition_len;
    }

    let projected_rows = projected_len(iteration_rows, partition_len);
    let projected_cols = projected_len(iteration_cols, partition_len);
    let num_groups = (projected_rows * projected_cols).max(0);

    let targets = target::build_targets(tree, target_kind, partition_height, comparison_height, apply_shift);

    let groups: Vec<Vec<CellPosition>> = (0..num_groups)
        .map(|idx| {
            group_nodes(
                idx,
                projected_cols,
                partition_len,
                offset,
                comparison_height,
                comparison_rows,
                comparison_cols,
            )
        })
        .filter(|nodes| nodes.len() > 1)
        .collect();

    let tree_ref: &QuadAssignmentTree = tree;
    let permutations: Vec<Vec<usize>> = groups
        .par_iter()
        .map(|nodes| swap::best_permutation(tree_ref, nodes, distance_kind, &targets, |pos| pos.index))
        .collect();

    groups
        .iter()
        .zip(permutations.iter())
        .map(|(nodes, permutation)| swap::apply_permutation(tree, nodes, permutation))
        .sum()
}
