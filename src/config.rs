//! Configuration (C11): the JSON-backed description of input data, and the
//! builder that assembles a full run configuration from CLI flags plus that
//! JSON (§4.11, §6a).

use std::fs;
use std::path::{Path, PathBuf};

use derive_builder::Builder;
use displaydoc::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::run::{Schedule, SortOptions};
use crate::target::TargetKind;
use crate::tree::ParentKind;
use crate::vector_ops::DistanceKind;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Display, Error)]
pub enum ConfigError {
    /// failed to read config file {path}: {source}
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// failed to parse config file {path} as JSON: {source}
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    /// grid dimensions must be positive, got {rows}x{columns}
    EmptyGrid { rows: usize, columns: usize },
}

/// Whether an [`InputConfig`] points at real data or a visualization
/// overlay (§6a).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Data,
    Visualization,
}

/// The `(x, y, z)` shape of one data element, matching `data_dims` in the
/// source this was distilled from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataDims {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl DataDims {
    pub fn element_len(&self) -> usize {
        self.x * self.y * self.z
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridDims {
    pub rows: usize,
    pub columns: usize,
}

/// Width of the floating-point payload in the raw data file. §6a leaves the
/// choice between 32- and 64-bit open per element; resolved here as an
/// explicit (defaulted) config field rather than sniffed from file size,
/// since file size alone can't disambiguate a file that happens to divide
/// evenly both ways.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataPrecision {
    F32,
    F64,
}

impl DataPrecision {
    pub fn byte_width(&self) -> usize {
        match self {
            DataPrecision::F32 => 4,
            DataPrecision::F64 => 8,
        }
    }
}

impl Default for DataPrecision {
    fn default() -> Self {
        DataPrecision::F64
    }
}

/// Description of the input data: where it lives, its grid layout, and the
/// shape of each element. Deserialized from the `--config` JSON file (§6a).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InputConfig {
    #[serde(rename = "type")]
    pub input_type: InputType,
    pub grid: GridDims,
    pub data: InputDataConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InputDataConfig {
    pub length: usize,
    pub path: String,
    pub dimensions: DataDims,
    #[serde(default)]
    pub precision: DataPrecision,
}

impl InputConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: InputConfig = serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
            path: path.display().to_string(),
            source,
        })?;
        if config.grid.rows == 0 || config.grid.columns == 0 {
            return Err(ConfigError::EmptyGrid {
                rows: config.grid.rows,
                columns: config.grid.columns,
            });
        }
        Ok(config)
    }

    pub fn to_json_file(&self, path: &Path) -> Result<(), ConfigError> {
        let serialized = serde_json::to_string_pretty(self).expect("InputConfig is always serializable");
        fs::write(path, serialized).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

/// A fully assembled run configuration, built from CLI flags via
/// [`RunConfigBuilder`] (the teacher's `derive_builder` idiom). Fields with
/// defaults mirror the CLI flag defaults in `input_args.hpp`.
#[derive(Clone, Debug, Builder)]
#[builder(setter(into))]
pub struct RunConfig {
    #[builder(default = "1")]
    pub passes: usize,
    #[builder(default = "100")]
    pub max_iterations: usize,
    #[builder(default = "1")]
    pub iterations_per_checkpoint: usize,
    #[builder(default = "0.00001")]
    pub min_distance_change: f64,
    #[builder(default = "1.0")]
    pub distance_change_factor: f64,
    #[builder(default = "1.0")]
    pub iterations_change_factor: f64,
    #[builder(default = "0")]
    pub seed: u64,
    #[builder(default = "true")]
    pub partition_swaps: bool,
    #[builder(default = "true")]
    pub randomize: bool,
    #[builder(default = "ParentKind::Mean")]
    pub parent_kind: ParentKind,
    #[builder(default = "DistanceKind::Euclidean")]
    pub distance_kind: DistanceKind,
    #[builder(default = "vec![TargetKind::Neighbourhood]")]
    pub target_kinds: Vec<TargetKind>,
    #[builder(default = "true")]
    pub combine_targets: bool,
}

impl RunConfig {
    /// Expands this flat CLI-shaped configuration into the [`Schedule`] /
    /// [`SortOptions`] pair the run controller (C10) actually consumes.
    pub fn to_schedule_and_sort_options(&self) -> (Schedule, SortOptions) {
        let schedule = Schedule {
            number_of_passes: self.passes,
            max_iterations: self.max_iterations,
            distance_threshold: self.min_distance_change,
            iterations_change_factor: self.iterations_change_factor,
            threshold_change_factor: self.distance_change_factor,
            iterations_per_checkpoint: self.iterations_per_checkpoint,
            combine_targets: self.combine_targets,
        };
        let sort_options = SortOptions {
            distance_kind: self.distance_kind,
            target_kinds: self.target_kinds.clone(),
            randomize_assignment: self.randomize,
            randomization_seed: self.seed,
            partition_swaps: self.partition_swaps,
        };
        (schedule, sort_options)
    }
}

/// Settings governing what the run controller writes at the end of a run
/// (§4.12/§6c): the assignment/disparity/visualization-config triple, plus
/// the debug-mode PNG dump and the log-only short-circuit.
#[derive(Clone, Debug)]
pub struct ExportSettings {
    pub output_dir: PathBuf,
    pub visualization_config_path: Option<PathBuf>,
    pub log_only: bool,
    pub debug: bool,
    pub export_visualization: bool,
    pub export_data: bool,
}
