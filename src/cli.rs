//! Command-line surface (C11): every flag the binary accepts, matching the
//! source this was distilled from (`program/input_args.hpp`) field for field
//! (§6a).

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};

use crate::target::TargetKind;
use crate::tree::ParentKind;
use crate::vector_ops::DistanceKind;

/// Which seed hierarchy-aggregation rule a run uses (`--parent_type`),
/// parsed from the literal numeric ordinal the external CLI contract
/// documents (`0=mean, 1=min-child`, §6a) rather than a named variant —
/// `--parent_type mean` is not accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParentTypeArg {
    Mean,
    MinChild,
}

impl FromStr for ParentTypeArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0" => Ok(ParentTypeArg::Mean),
            "1" => Ok(ParentTypeArg::MinChild),
            other => Err(format!("expected 0 (mean) or 1 (min-child), got {other}")),
        }
    }
}

impl fmt::Display for ParentTypeArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParentTypeArg::Mean => write!(f, "0"),
            ParentTypeArg::MinChild => write!(f, "1"),
        }
    }
}

impl From<ParentTypeArg> for ParentKind {
    fn from(value: ParentTypeArg) -> Self {
        match value {
            ParentTypeArg::Mean => ParentKind::Mean,
            ParentTypeArg::MinChild => ParentKind::MinChild,
        }
    }
}

/// Which distance function a run uses (`--distance_function`), parsed from
/// the literal numeric ordinal the external CLI contract documents
/// (`0=Euclidean, 1=cosine`, §6a).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DistanceFunctionArg {
    Euclidean,
    Cosine,
}

impl FromStr for DistanceFunctionArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0" => Ok(DistanceFunctionArg::Euclidean),
            "1" => Ok(DistanceFunctionArg::Cosine),
            other => Err(format!("expected 0 (Euclidean) or 1 (cosine), got {other}")),
        }
    }
}

impl fmt::Display for DistanceFunctionArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceFunctionArg::Euclidean => write!(f, "0"),
            DistanceFunctionArg::Cosine => write!(f, "1"),
        }
    }
}

impl From<DistanceFunctionArg> for DistanceKind {
    fn from(value: DistanceFunctionArg) -> Self {
        match value {
            DistanceFunctionArg::Euclidean => DistanceKind::Euclidean,
            DistanceFunctionArg::Cosine => DistanceKind::Cosine,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum TargetArg {
    Hierarchy,
    Neighbourhood,
    HierarchyNeighbourhood,
}

impl From<TargetArg> for TargetKind {
    fn from(value: TargetArg) -> Self {
        match value {
            TargetArg::Hierarchy => TargetKind::Hierarchy,
            TargetArg::Neighbourhood => TargetKind::Neighbourhood,
            TargetArg::HierarchyNeighbourhood => TargetKind::HierarchyNeighbourhood,
        }
    }
}

/// Hierarchical self-sorting engine: repeatedly exchanges grid cells with
/// their hierarchy-neighbourhood targets until a scheduled pass converges.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the input data config JSON (§6a). Required unless `--debug`
    /// is set.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Path to a prior assignment file to resume from, instead of the
    /// identity assignment.
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Directory the assignment/disparity/visualization-config output is
    /// written under.
    #[arg(long, default_value = "output")]
    pub output: PathBuf,

    /// Number of rayon worker threads; 0 lets rayon pick its own default.
    #[arg(long, default_value_t = 0)]
    pub cores: usize,

    #[arg(long, default_value_t = 1)]
    pub passes: usize,

    #[arg(long, default_value_t = 100)]
    pub max_iterations: usize,

    #[arg(long, default_value_t = 1)]
    pub iterations_per_checkpoint: usize,

    #[arg(long, default_value_t = 0.00001)]
    pub min_distance_change: f64,

    #[arg(long, default_value_t = 1.0)]
    pub distance_change_factor: f64,

    #[arg(long, default_value_t = 1.0)]
    pub iterations_change_factor: f64,

    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// `BOOL`-valued (§6a): accepts an explicit `--partition_swaps false` to
    /// turn off a flag whose compiled-in default is `true`.
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    pub partition_swaps: bool,

    /// `BOOL`-valued (§6a): accepts an explicit `--randomize false`.
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    pub randomize: bool,

    #[arg(long, default_value_t = ParentTypeArg::Mean)]
    pub parent_type: ParentTypeArg,

    #[arg(long, default_value_t = DistanceFunctionArg::Euclidean)]
    pub distance_function: DistanceFunctionArg,

    /// Runs against a synthetic uniform RGB grid instead of `--config`, and
    /// also enables per-height PNG export. `BOOL`-valued (§6a).
    #[arg(long, action = clap::ArgAction::Set, default_value_t = false)]
    pub debug: bool,

    /// Grid row count, required with `--debug`.
    #[arg(long)]
    pub rows: Option<usize>,

    /// Grid column count, required with `--debug`.
    #[arg(long)]
    pub columns: Option<usize>,

    /// Only writes the per-iteration CSV log, skipping the final
    /// assignment/disparity/visualization export. `BOOL`-valued (§6a).
    #[arg(long, action = clap::ArgAction::Set, default_value_t = false)]
    pub log_only: bool,

    /// Writes the final assignment/disparity files alongside the
    /// visualization config. `BOOL`-valued (§6a): accepts an explicit
    /// `--export false`.
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    pub export: bool,

    /// Path the visualization config JSON is written to; defaults to
    /// `<output>/visualization_config.json`.
    #[arg(long)]
    pub visualization_config: Option<PathBuf>,

    /// One or more target kinds, combined or scheduled per pass depending on
    /// `Schedule::combine_targets` (§6, `createTargetSchedule`).
    #[arg(long, value_enum, num_args = 1.., default_values_t = vec![TargetArg::Neighbourhood])]
    pub targets: Vec<TargetArg>,

    #[command(flatten)]
    pub verbose: Verbosity<WarnLevel>,
}
