//! Target builder (C5): for every cell at a comparison height, the ordered
//! list of target vectors that cell's data should be sorted towards (§4.5).

use crate::geometry;
use crate::tree::{CellPosition, QuadAssignmentTree};
use crate::vector_ops::{self, DataVector};

/// `TargetKind` (§9): a closed sum type with exactly three variants. The
/// 4-connected wrapping described alongside it in §4.5 is an orthogonal
/// boolean (`four_connected` below), not a fourth variant, and the original
/// engine's "highest parent" hierarchy-target variant is excluded entirely
/// (see `DESIGN.md`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TargetKind {
    Hierarchy,
    #[default]
    Neighbourhood,
    HierarchyNeighbourhood,
}

impl TargetKind {
    /// Number of target vectors produced per cell, before any 4-connected
    /// wrapping doubles it.
    fn num_targets(&self) -> usize {
        match self {
            TargetKind::Hierarchy => 1,
            TargetKind::Neighbourhood => 1,
            TargetKind::HierarchyNeighbourhood => 2,
        }
    }
}

/// Block size used by the neighbourhood target's convolution-like window.
const NUM_BLOCKS_PER_DIMENSION: usize = 4;

/// Minimum and maximum height (exclusive) walked when building hierarchy
/// targets: `[partition_height, partition_height+1)` unshifted, or
/// `[partition_height, depth-1)` when `shift` is set.
pub fn hierarchy_target_height_bounds(
    tree: &QuadAssignmentTree,
    partition_height: usize,
    shift: bool,
) -> (usize, usize) {
    let max = if shift {
        tree.depth() - 1
    } else {
        partition_height + 1
    };
    (partition_height, max)
}

/// A cell's ordered target list, plus where (in `comparison_height`'s
/// sub-grid) it applies. `target_map` below is the flattened
/// `comparison_height`-indexed version of this.
pub struct TargetMap {
    pub comparison_height: usize,
    pub num_targets: usize,
    /// Row-major over `comparison_height`'s sub-grid; entry `i` holds
    /// `num_targets` vectors (outer `Vec` length is
    /// `dims_at(comparison_height).len() * num_targets`, laid out
    /// cell-major then target-index).
    pub targets: Vec<Option<DataVector>>,
}

impl TargetMap {
    fn new(comparison_height: usize, num_cells: usize, num_targets: usize) -> Self {
        TargetMap {
            comparison_height,
            num_targets,
            targets: vec![None; num_cells * num_targets],
        }
    }

    fn slot(&self, cell_idx: usize, target_idx: usize) -> usize {
        cell_idx * self.num_targets + target_idx
    }

    pub fn get(&self, cell_idx: usize, target_idx: usize) -> Option<&DataVector> {
        self.targets[self.slot(cell_idx, target_idx)].as_ref()
    }

    fn set(&mut self, cell_idx: usize, target_idx: usize, value: Option<DataVector>) {
        let slot = self.slot(cell_idx, target_idx);
        self.targets[slot] = value;
    }
}

/// Builds the target map for `target_kind` at `partition_height`, broadcast
/// down to `comparison_height` (§4.5).
pub fn build_targets(
    tree: &QuadAssignmentTree,
    target_kind: TargetKind,
    partition_height: usize,
    comparison_height: usize,
    shift: bool,
) -> TargetMap {
    let num_cells = tree.dims_at(comparison_height).len();
    let mut map = TargetMap::new(comparison_height, num_cells, target_kind.num_targets());

    match target_kind {
        TargetKind::Hierarchy => {
            load_hierarchy_targets(&mut map, 0, tree, partition_height, comparison_height, shift);
        }
        TargetKind::Neighbourhood => {
            load_neighbourhood_targets(
                &mut map,
                0,
                tree,
                partition_height,
                comparison_height,
                shift,
            );
        }
        TargetKind::HierarchyNeighbourhood => {
            load_hierarchy_targets(&mut map, 0, tree, partition_height, comparison_height, shift);
            load_neighbourhood_targets(
                &mut map,
                1,
                tree,
                partition_height,
                comparison_height,
                shift,
            );
        }
    }

    map
}

/// Copies `target` into every comparison-height cell covered by the
/// `partition_len x partition_len` block whose top-left partition-height
/// coordinate is `(partition_y, partition_x)`.
fn broadcast_to_block(
    map: &mut TargetMap,
    target_idx: usize,
    target: &DataVector,
    partition_y: usize,
    partition_x: usize,
    partition_len: usize,
    comparison_cols: usize,
) {
    for y in 0..partition_len {
        for x in 0..partition_len {
            let cell_idx = geometry::row_major(
                partition_y * partition_len + y,
                partition_x * partition_len + x,
                comparison_cols,
            );
            if cell_idx < map.targets.len() / map.num_targets {
                map.set(cell_idx, target_idx, Some(target.clone()));
            }
        }
    }
}

/// Walks upward from `partition_height` to `hierarchy_target_height_bounds`'s
/// upper bound, aggregating representatives along the way, and broadcasts
/// the one resulting vector to every comparison-height leaf under that
/// partition.
fn load_hierarchy_targets(
    map: &mut TargetMap,
    target_idx: usize,
    tree: &QuadAssignmentTree,
    partition_height: usize,
    comparison_height: usize,
    shift: bool,
) {
    let (min_height, max_height) = hierarchy_target_height_bounds(tree, partition_height, shift);
    let num_parents = max_height - min_height;
    if num_parents == 0 {
        return;
    }

    let projected_dims = tree.dims_at(min_height);
    let comparison_cols = tree.dims_at(comparison_height).cols;
    let partition_len = 1usize << (min_height - comparison_height);
    let element_len = tree.data_element_len();

    for idx in 0..projected_dims.len() {
        let mut pos = Some(CellPosition::new(min_height, idx));
        let mut values: Vec<Option<&DataVector>> = Vec::with_capacity(num_parents);
        for _ in 0..num_parents {
            let Some(p) = pos else { break };
            values.push(tree.value(p));
            pos = tree.parent(p);
        }
        let target = vector_ops::aggregate(&values, element_len);

        let (partition_y, partition_x) = geometry::row_major_coords(idx, projected_dims.cols);
        broadcast_to_block(
            map,
            target_idx,
            &target,
            partition_y,
            partition_x,
            partition_len,
            comparison_cols,
        );
    }
}

/// Aggregates the K×K block-neighbourhood (K = [`NUM_BLOCKS_PER_DIMENSION`])
/// of `partition_height` representatives around every partition, with
/// shift/parity-dependent window offsets, and broadcasts each aggregate down
/// to `comparison_height`.
fn load_neighbourhood_targets(
    map: &mut TargetMap,
    target_idx: usize,
    tree: &QuadAssignmentTree,
    partition_height: usize,
    comparison_height: usize,
    shift: bool,
) {
    let projected_dims = tree.dims_at(partition_height);
    let comparison_cols = tree.dims_at(comparison_height).cols;
    let partition_len = 1usize << (partition_height - comparison_height);
    let element_len = tree.data_element_len();

    let window_shift: isize = if shift {
        0
    } else {
        ((NUM_BLOCKS_PER_DIMENSION - 1) % 2) as isize
    };
    let blocks_offset = ((NUM_BLOCKS_PER_DIMENSION - 1) / 2) as isize;

    for idx in 0..projected_dims.len() {
        let (partition_y, partition_x) = geometry::row_major_coords(idx, projected_dims.cols);
        let py = partition_y as isize;
        let px = partition_x as isize;

        let y_lo_shift = if partition_y % 2 == 0 { window_shift } else { 0 };
        let y_hi_shift = if partition_y % 2 == 1 { window_shift } else { 0 };
        let x_lo_shift = if partition_x % 2 == 0 { window_shift } else { 0 };
        let x_hi_shift = if partition_x % 2 == 1 { window_shift } else { 0 };

        let min_y = (py - blocks_offset - y_lo_shift).max(0) as usize;
        let max_y = ((py + blocks_offset + y_hi_shift).max(0) as usize)
            .min(projected_dims.rows.saturating_sub(1));
        let min_x = (px - blocks_offset - x_lo_shift).max(0) as usize;
        let max_x = ((px + blocks_offset + x_hi_shift).max(0) as usize)
            .min(projected_dims.cols.saturating_sub(1));

        let mut values: Vec<Option<&DataVector>> = Vec::with_capacity(9);
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let cell = CellPosition::new(
                    partition_height,
                    geometry::row_major(y, x, projected_dims.cols),
                );
                values.push(tree.value(cell));
            }
        }
        let target = vector_ops::aggregate(&values, element_len);

        broadcast_to_block(
            map,
            target_idx,
            &target,
            partition_y,
            partition_x,
            partition_len,
            comparison_cols,
        );
    }
}

/// Wraps `map`'s existing single target at `target_idx` with its 4-connected
/// variant: appends, for every comparison-height cell, the mean of its
/// in-bounds 4-neighbours' targets, pushed ahead of the original (§4.5).
///
/// Returns a new map with `num_targets` one greater than `base`'s.
pub fn apply_four_connected(tree: &QuadAssignmentTree, base: &TargetMap) -> TargetMap {
    let comparison_height = base.comparison_height;
    let dims = tree.dims_at(comparison_height);
    let num_cells = dims.len();
    let element_len = tree.data_element_len();
    let mut out = TargetMap::new(comparison_height, num_cells, base.num_targets + 1);

    for idx in 0..num_cells {
        let (y, x) = geometry::row_major_coords(idx, dims.cols);
        let mut neighbours: Vec<Option<&DataVector>> = Vec::with_capacity(4);
        if x > 0 {
            neighbours.push(base.get(geometry::row_major(y, x - 1, dims.cols), 0));
        }
        if x + 1 < dims.cols {
            neighbours.push(base.get(geometry::row_major(y, x + 1, dims.cols), 0));
        }
        if y > 0 {
            neighbours.push(base.get(geometry::row_major(y - 1, x, dims.cols), 0));
        }
        if y + 1 < dims.rows {
            neighbours.push(base.get(geometry::row_major(y + 1, x, dims.cols), 0));
        }
        let neighbour_aggregate = vector_ops::aggregate(&neighbours, element_len);
        out.set(idx, 0, Some(neighbour_aggregate));
        for t in 0..base.num_targets {
            out.set(idx, t + 1, base.get(idx, t).cloned());
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::ParentKind;

    fn build_tree() -> QuadAssignmentTree {
        let required = geometry::required_capacity(4, 4, 3);
        let data: Vec<Option<DataVector>> = (0..required).map(|i| Some(vec![i as f64])).collect();
        let assignment: Vec<usize> = (0..required).collect();
        let mut tree =
            QuadAssignmentTree::new(data, assignment, 4, 4, 3, 16, (1, 1, 1), ParentKind::Mean)
                .unwrap();
        crate::aggregation::compute_aggregates(&mut tree, crate::vector_ops::DistanceKind::Euclidean);
        tree
    }

    #[test]
    fn hierarchy_height_bounds_unshifted_is_one_level_up() {
        let tree = build_tree();
        assert_eq!(hierarchy_target_height_bounds(&tree, 0, false), (0, 1));
    }

    #[test]
    fn hierarchy_height_bounds_shifted_reaches_root_minus_one() {
        let tree = build_tree();
        assert_eq!(hierarchy_target_height_bounds(&tree, 0, true), (0, 2));
    }

    #[test]
    fn hierarchy_targets_broadcast_uniformly_within_a_partition() {
        let tree = build_tree();
        let map = build_targets(&tree, TargetKind::Hierarchy, 1, 0, false);
        // Cells 0,1,4,5 (NW leaf quadrant) share height-1 node 0 as their
        // single parent target.
        let t0 = map.get(0, 0).unwrap().clone();
        let t1 = map.get(1, 0).unwrap().clone();
        let t4 = map.get(4, 0).unwrap().clone();
        let t5 = map.get(5, 0).unwrap().clone();
        assert_eq!(t0, t1);
        assert_eq!(t0, t4);
        assert_eq!(t0, t5);
        assert!((t0[0] - 2.5).abs() < 1e-9);
    }

    #[test]
    fn hierarchy_neighbourhood_produces_two_targets_per_cell() {
        let tree = build_tree();
        let map = build_targets(&tree, TargetKind::HierarchyNeighbourhood, 1, 0, false);
        assert_eq!(map.num_targets, 2);
        assert!(map.get(0, 0).is_some());
        assert!(map.get(0, 1).is_some());
    }

    #[test]
    fn neighbourhood_targets_cover_every_comparison_cell() {
        let tree = build_tree();
        let map = build_targets(&tree, TargetKind::Neighbourhood, 1, 0, false);
        for idx in 0..16 {
            assert!(map.get(idx, 0).is_some());
        }
    }

    #[test]
    fn four_connected_wrapping_adds_one_target_and_keeps_the_original() {
        let tree = build_tree();
        let base = build_targets(&tree, TargetKind::Hierarchy, 1, 0, false);
        let wrapped = apply_four_connected(&tree, &base);
        assert_eq!(wrapped.num_targets, base.num_targets + 1);
        for idx in 0..16 {
            assert_eq!(wrapped.get(idx, 1), base.get(idx, 0));
        }
    }
}
