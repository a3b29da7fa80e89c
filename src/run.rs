//! Run controller (C10): applies a schedule of sort passes to a tree, with
//! per-pass parameter decay, optional randomization, and invariant checks
//! before handing off to export (§4.10).

use displaydoc::Display;
use log::info;
use logging_timer::stime;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use thiserror::Error;

use crate::metric;
use crate::sort::{self, HeightResult};
use crate::target::TargetKind;
use crate::tree::QuadAssignmentTree;
use crate::vector_ops::DistanceKind;

/// A schedule of sort passes, each applied with the previous pass's
/// iteration/threshold budget decayed by a fixed factor.
#[derive(Clone, Debug)]
pub struct Schedule {
    pub number_of_passes: usize,
    pub max_iterations: usize,
    pub distance_threshold: f64,
    /// Multiplies `max_iterations` (rounded up) after each pass.
    pub iterations_change_factor: f64,
    /// Multiplies `distance_threshold` after each pass.
    pub threshold_change_factor: f64,
    /// How often (in C8 inner-loop iterations) the checkpoint callback fires
    /// within a height's convergence loop; 0 disables intra-height
    /// checkpointing (only the per-pass/per-height boundaries fire).
    pub iterations_per_checkpoint: usize,
    /// When true, every pass uses the full `target_kinds` list combined
    /// (via `TargetKind::HierarchyNeighbourhood`-style concatenation is not
    /// implied here — see `create_target_schedule`); when false, pass `i`
    /// uses `target_kinds[min(i, target_kinds.len()-1)]`.
    pub combine_targets: bool,
}

/// The distance/target configuration a run uses, plus whether to randomize
/// the starting layout.
#[derive(Clone, Debug)]
pub struct SortOptions {
    pub distance_kind: DistanceKind,
    /// One target kind to try per pass (§6's "list of target kinds"); see
    /// [`create_target_schedule`] for how this is reconciled against
    /// `Schedule::number_of_passes`.
    pub target_kinds: Vec<TargetKind>,
    pub randomize_assignment: bool,
    pub randomization_seed: u64,
    /// Whether the cross-height (`comparison_height = height-1`) exchange
    /// passes run in addition to the same-height (`comparison_height = 0`)
    /// ones, per pass, within C8's inner loop.
    pub partition_swaps: bool,
}

/// Builds the per-pass target-kind schedule (§6, `program/run.hpp`'s
/// `createTargetSchedule`): either every pass gets the same full list
/// combined, or pass `i` gets `target_kinds[min(i, len-1)]`, repeating the
/// last entry once the list runs out.
pub fn create_target_schedule(schedule: &Schedule, sort_options: &SortOptions) -> Vec<TargetKind> {
    let kinds = &sort_options.target_kinds;
    assert!(!kinds.is_empty(), "SortOptions::target_kinds must not be empty");

    if schedule.combine_targets {
        let combined = if kinds.contains(&TargetKind::Hierarchy) && kinds.contains(&TargetKind::Neighbourhood) {
            TargetKind::HierarchyNeighbourhood
        } else {
            kinds[0]
        };
        vec![combined; schedule.number_of_passes]
    } else {
        (0..schedule.number_of_passes)
            .map(|idx| kinds[idx.min(kinds.len() - 1)])
            .collect()
    }
}

/// Summary of a completed run, suitable for export/reporting.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub initial_hnd: f64,
    pub randomized_hnd: Option<f64>,
    pub final_hnd: f64,
    pub pass_results: Vec<Vec<HeightResult>>,
}

/// Invariant violations the run controller checks for in debug mode; any
/// occurrence here is fatal (§4.10).
#[derive(Debug, Display, Error)]
pub enum InvariantError {
    /// leaf assignment sub-range is not a permutation of 0..{0} (invariant I2)
    AssignmentNotAPermutation(usize),
}

/// Fisher–Yates shuffle of the leaf sub-range of `tree`'s assignment array,
/// using a caller-seeded generator — the only randomization path this crate
/// exposes (no process-global RNG state, see `DESIGN.md`).
pub fn randomize_assignment(tree: &mut QuadAssignmentTree, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let leaf_range = tree.bounds(0).range();
    tree.assignment_mut()[leaf_range].shuffle(&mut rng);
}

/// Checks invariant I2: the leaf sub-range of `assignment` is a permutation
/// of `0..num_real_elements`.
pub fn assert_unique_assignment(tree: &QuadAssignmentTree) -> Result<(), InvariantError> {
    let leaf_range = tree.bounds(0).range();
    let mut seen: Vec<usize> = tree.assignment()[leaf_range].to_vec();
    seen.sort_unstable();
    let expected_len = seen.len();
    let is_permutation = seen.iter().enumerate().all(|(idx, &v)| idx == v);
    if is_permutation {
        Ok(())
    } else {
        Err(InvariantError::AssignmentNotAPermutation(expected_len))
    }
}

/// Applies `schedule` to `tree`, optionally randomizing first, invoking
/// `checkpoint` (if given) after every pass with a pass label such as
/// `"pass3"`.
#[stime("info")]
pub fn run(
    tree: &mut QuadAssignmentTree,
    schedule: &Schedule,
    sort_options: &SortOptions,
    mut checkpoint: Option<&mut dyn FnMut(&QuadAssignmentTree, &str)>,
) -> Result<RunReport, InvariantError> {
    assert_unique_assignment(tree)?;

    let initial_hnd = metric::compute_hnd(tree, sort_options.distance_kind, 0, false);
    info!("initial HND: {initial_hnd}");

    let randomized_hnd = if sort_options.randomize_assignment {
        randomize_assignment(tree, sort_options.randomization_seed);
        let hnd = metric::compute_hnd(tree, sort_options.distance_kind, 0, false);
        info!("randomized HND: {hnd}");
        Some(hnd)
    } else {
        None
    };

    let mut max_iterations = schedule.max_iterations;
    let mut distance_threshold = schedule.distance_threshold;
    let mut pass_results = Vec::with_capacity(schedule.number_of_passes);
    let target_schedule = create_target_schedule(schedule, sort_options);

    for (pass, &target_kind) in target_schedule.iter().enumerate() {
        info!("--- pass {} ---", pass + 1);

        let results = match checkpoint.as_deref_mut() {
            Some(cb) => {
                let mut wrapped = |t: &QuadAssignmentTree, label: &str| cb(t, &format!("pass{}-{}", pass + 1, label));
                sort::sort(
                    tree,
                    sort_options.distance_kind,
                    target_kind,
                    max_iterations,
                    distance_threshold,
                    sort_options.partition_swaps,
                    schedule.iterations_per_checkpoint,
                    Some(&mut wrapped),
                )
            }
            None => sort::sort(
                tree,
                sort_options.distance_kind,
                target_kind,
                max_iterations,
                distance_threshold,
                sort_options.partition_swaps,
                schedule.iterations_per_checkpoint,
                None,
            ),
        };
        pass_results.push(results);

        if let Some(cb) = checkpoint.as_deref_mut() {
            cb(tree, &format!("pass{}", pass + 1));
        }

        distance_threshold *= schedule.threshold_change_factor;
        max_iterations = (max_iterations as f64 * schedule.iterations_change_factor).ceil() as usize;
    }

    assert_unique_assignment(tree)?;
    let final_hnd = metric::compute_hnd(tree, sort_options.distance_kind, 0, false);
    info!("final HND: {final_hnd}");

    Ok(RunReport {
        initial_hnd,
        randomized_hnd,
        final_hnd,
        pass_results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry;
    use crate::tree::ParentKind;
    use crate::vector_ops::DataVector;

    fn build_tree() -> QuadAssignmentTree {
        let required = geometry::required_capacity(8, 8, 4);
        let data: Vec<Option<DataVector>> = (0..required).map(|i| Some(vec![i as f64 % 5.0])).collect();
        let assignment: Vec<usize> = (0..required).collect();
        QuadAssignmentTree::new(data, assignment, 8, 8, 4, 64, (1, 1, 1), ParentKind::Mean).unwrap()
    }

    #[test]
    fn randomize_assignment_preserves_permutation_invariant() {
        let mut tree = build_tree();
        randomize_assignment(&mut tree, 42);
        assert!(assert_unique_assignment(&tree).is_ok());
    }

    #[test]
    fn randomize_assignment_is_deterministic_for_a_given_seed() {
        let mut a = build_tree();
        let mut b = build_tree();
        randomize_assignment(&mut a, 7);
        randomize_assignment(&mut b, 7);
        assert_eq!(a.assignment(), b.assignment());
    }

    #[test]
    fn assert_unique_assignment_rejects_a_duplicate() {
        let mut tree = build_tree();
        tree.assignment_mut()[1] = tree.assignment_mut()[0];
        assert!(assert_unique_assignment(&tree).is_err());
    }

    #[test]
    fn run_produces_one_pass_result_set_per_scheduled_pass() {
        let mut tree = build_tree();
        let schedule = Schedule {
            number_of_passes: 2,
            max_iterations: 3,
            distance_threshold: 0.01,
            iterations_change_factor: 0.5,
            threshold_change_factor: 2.0,
            iterations_per_checkpoint: 0,
            combine_targets: false,
        };
        let sort_options = SortOptions {
            distance_kind: DistanceKind::Euclidean,
            target_kinds: vec![TargetKind::Hierarchy],
            randomize_assignment: true,
            randomization_seed: 1,
            partition_swaps: true,
        };
        let report = run(&mut tree, &schedule, &sort_options, None).unwrap();
        assert_eq!(report.pass_results.len(), 2);
        assert!(report.randomized_hnd.is_some());
    }

    #[test]
    fn run_invokes_the_checkpoint_callback_once_per_pass() {
        let mut tree = build_tree();
        let schedule = Schedule {
            number_of_passes: 3,
            max_iterations: 2,
            distance_threshold: 0.01,
            iterations_change_factor: 1.0,
            threshold_change_factor: 1.0,
            iterations_per_checkpoint: 0,
            combine_targets: false,
        };
        let sort_options = SortOptions {
            distance_kind: DistanceKind::Euclidean,
            target_kinds: vec![TargetKind::Neighbourhood],
            randomize_assignment: false,
            randomization_seed: 0,
            partition_swaps: true,
        };
        let mut labels = Vec::new();
        let mut callback = |_: &QuadAssignmentTree, label: &str| labels.push(label.to_string());
        run(&mut tree, &schedule, &sort_options, Some(&mut callback)).unwrap();
        // The per-pass end-of-pass marker fires exactly once per pass,
        // alongside whatever intra-sort checkpoints C8 also emitted.
        for pass in 1..=3 {
            assert!(labels.contains(&format!("pass{pass}")));
        }
    }

    #[test]
    fn create_target_schedule_repeats_last_kind_when_shorter_than_passes() {
        let schedule = Schedule {
            number_of_passes: 3,
            max_iterations: 1,
            distance_threshold: 0.01,
            iterations_change_factor: 1.0,
            threshold_change_factor: 1.0,
            iterations_per_checkpoint: 0,
            combine_targets: false,
        };
        let sort_options = SortOptions {
            distance_kind: DistanceKind::Euclidean,
            target_kinds: vec![TargetKind::Hierarchy, TargetKind::Neighbourhood],
            randomize_assignment: false,
            randomization_seed: 0,
            partition_swaps: true,
        };
        let kinds = create_target_schedule(&schedule, &sort_options);
        assert_eq!(
            kinds,
            vec![TargetKind::Hierarchy, TargetKind::Neighbourhood, TargetKind::Neighbourhood]
        );
    }

    #[test]
    fn create_target_schedule_combines_into_hierarchy_neighbourhood() {
        let schedule = Schedule {
            number_of_passes: 2,
            max_iterations: 1,
            distance_threshold: 0.01,
            iterations_change_factor: 1.0,
            threshold_change_factor: 1.0,
            iterations_per_checkpoint: 0,
            combine_targets: true,
        };
        let sort_options = SortOptions {
            distance_kind: DistanceKind::Euclidean,
            target_kinds: vec![TargetKind::Hierarchy, TargetKind::Neighbourhood],
            randomize_assignment: false,
            randomization_seed: 0,
            partition_swaps: true,
        };
        let kinds = create_target_schedule(&schedule, &sort_options);
        assert_eq!(kinds, vec![TargetKind::HierarchyNeighbourhood; 2]);
    }
}
