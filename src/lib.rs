//! A hierarchical self-sorting engine: a quadtree of aggregated data
//! vectors over a 2D grid, rearranged bottom-up so that spatially nearby
//! leaves converge on locally similar values.
//!
//! The grid is modelled as a [`tree::QuadAssignmentTree`] (C3): a flat array
//! per height, each slot addressed indirectly through a permutation
//! ([`geometry`], C1; [`vector_ops`], C2). [`aggregation`] (C4) rolls leaf
//! values up into parent representatives; [`target`] (C5) builds the
//! per-cell comparison targets a sort pass measures against; [`swap`] (C6)
//! searches the small local permutation space for the best rearrangement;
//! [`partition`] (C7) fans that search out over disjoint groups of cells in
//! parallel; [`sort`] (C8) drives one height's convergence loop; [`metric`]
//! (C9) scores how well a layout has converged; [`run`] (C10) schedules a
//! sequence of sort passes with decaying iteration/threshold budgets.
//!
//! [`config`] and [`cli`] (C11) assemble a run from CLI flags and a JSON
//! data-config file; [`data`] turns that config into the tree constructor's
//! inputs; [`read_write_utils`] (C12) persists the result (raw assignment
//! and disparity dumps, a visualization config, debug PNGs, and a
//! per-iteration CSV log); [`utils`] (C13) wires up logging.

pub mod aggregation;
pub mod cli;
pub mod config;
pub mod data;
pub mod geometry;
pub mod metric;
pub mod partition;
pub mod read_write_utils;
pub mod run;
pub mod sort;
pub mod swap;
pub mod target;
pub mod tree;
pub mod utils;
pub mod vector_ops;

pub use tree::{ParentKind, QuadAssignmentTree, TreeHeight};
pub use vector_ops::DistanceKind;
