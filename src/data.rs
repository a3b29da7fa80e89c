//! Data loading (C11 boundary): turns the `--config`/`--debug` CLI inputs
//! into the `(data, assignment, grid, depth, num_real_elements, data_dims)`
//! tuple the quad-assignment tree constructor expects (§6a).
//!
//! Grounded on `program/input/input.hpp`'s `loadDataFromInput` /
//! `generateUniformRGBData`, and `adapter/data.hpp`'s `loadData`.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use bzip2::bufread::BzDecoder;
use displaydoc::Display;
use thiserror::Error;

use crate::config::{DataPrecision, InputConfig};
use crate::geometry;
use crate::tree::TreeHeight;
use crate::vector_ops::DataVector;

/// Everything the tree constructor needs, already sized to the tree's full
/// flat-array capacity.
pub struct LoadedData {
    pub data: Vec<Option<DataVector>>,
    pub assignment: Vec<usize>,
    pub num_rows: usize,
    pub num_cols: usize,
    pub depth: usize,
    pub num_real_elements: usize,
    pub data_dims: (usize, usize, usize),
}

#[derive(Debug, Display, Error)]
pub enum DataLoadError {
    /// failed to read data file {path}: {source}
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// data file {path} has {actual} bytes, expected a multiple of {element_bytes}
    TruncatedPayload { path: String, actual: usize, element_bytes: usize },
    /// grid of {rows}x{cols} can only hold {capacity} elements, but the config declares {declared}
    GridTooSmall { rows: usize, cols: usize, capacity: usize, declared: usize },
}

impl From<std::io::Error> for DataLoadError {
    fn from(source: std::io::Error) -> Self {
        DataLoadError::Io { path: String::new(), source }
    }
}

/// Synthetic uniform RGB gradient over `(num_rows, num_cols)`, exactly as
/// `generateUniformRGBData` does: `r` ramps over columns, `b` over rows, `g`
/// over their sum. Used by `--debug` to smoke-test the pipeline without any
/// external files.
pub fn generate_uniform_rgb_data(num_rows: usize, num_cols: usize) -> Vec<Option<DataVector>> {
    let depth = TreeHeight::from_grid_dims(num_rows, num_cols).as_usize();
    let capacity = geometry::required_capacity(num_rows, num_cols, depth);
    let num_elements = num_rows * num_cols;

    let r_denom = (num_cols.saturating_sub(1)).max(1) as f64;
    let b_denom = (num_rows.saturating_sub(1)).max(1) as f64;
    let g_denom = (num_cols + num_rows).saturating_sub(2).max(1) as f64;

    let mut data = Vec::with_capacity(capacity);
    for idx in 0..capacity {
        if idx < num_elements {
            let x = (idx % num_cols) as f64;
            let y = (idx / num_cols) as f64;
            let r = (x * 255.0 / r_denom).round();
            let g = ((x + y) * 255.0 / g_denom).round();
            let b = (y * 255.0 / b_denom).round();
            data.push(Some(vec![r, g, b]));
        } else {
            data.push(Some(vec![0.0, 0.0, 0.0]));
        }
    }
    data
}

/// Identity assignment `0..size`, the starting point when no prior
/// assignment file is supplied.
pub fn identity_assignment(size: usize) -> Vec<usize> {
    (0..size).collect()
}

/// Resolves a raw assignment array read back by `--input` (possibly
/// carrying [`crate::read_write_utils::VOID_SENTINEL`] entries) into a
/// concrete `Vec<usize>` the tree constructor accepts: non-sentinel entries
/// pass through unchanged, and each sentinel is resolved to the next
/// not-yet-claimed void slot in `data` (a data-pool index whose vector is
/// `None`), in position order.
pub fn resume_assignment(raw: &[u32], data: &[Option<DataVector>]) -> Vec<usize> {
    use crate::read_write_utils::VOID_SENTINEL;

    let mut claimed = vec![false; data.len()];
    for &value in raw {
        if value != VOID_SENTINEL {
            let idx = value as usize;
            if idx < claimed.len() {
                claimed[idx] = true;
            }
        }
    }

    let mut void_slots = (0..data.len()).filter(|&i| data[i].is_none() && !claimed[i]);
    raw.iter()
        .map(|&value| {
            if value == VOID_SENTINEL {
                void_slots.next().unwrap_or(0)
            } else {
                value as usize
            }
        })
        .collect()
}

/// Builds the debug-mode [`LoadedData`] for a `rows x cols` synthetic RGB
/// grid, identity assignment, 3-channel elements.
pub fn load_debug_data(num_rows: usize, num_cols: usize) -> LoadedData {
    let data = generate_uniform_rgb_data(num_rows, num_cols);
    let depth = TreeHeight::from_grid_dims(num_rows, num_cols).as_usize();
    let assignment = identity_assignment(data.len());
    LoadedData {
        data,
        assignment,
        num_rows,
        num_cols,
        depth,
        num_real_elements: num_rows * num_cols,
        data_dims: (3, 1, 1),
    }
}

/// Reads a raw row-major float payload (optionally `.raw.bz2`-compressed)
/// and reshapes it into `length` vectors of `element_len` each, padding the
/// tail of the tree's flat array with zero-vectors for the aggregate slots,
/// per `adapter::loadData`.
fn read_raw_payload(
    path: &Path,
    precision: DataPrecision,
    length: usize,
    element_len: usize,
) -> Result<Vec<f64>, DataLoadError> {
    let file = File::open(path).map_err(|source| DataLoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut reader = BufReader::new(file);

    let mut bytes = Vec::new();
    let is_compressed = path.extension().map(|e| e == "bz2").unwrap_or(false);
    if is_compressed {
        let mut decoder = BzDecoder::new(reader);
        decoder.read_to_end(&mut bytes).map_err(|source| DataLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
    } else {
        reader.read_to_end(&mut bytes).map_err(|source| DataLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
    }

    let element_bytes = precision.byte_width();
    let expected = length * element_len * element_bytes;
    if bytes.len() < expected {
        return Err(DataLoadError::TruncatedPayload {
            path: path.display().to_string(),
            actual: bytes.len(),
            element_bytes,
        });
    }

    let values = match precision {
        DataPrecision::F32 => bytes[..expected]
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64)
            .collect(),
        DataPrecision::F64 => bytes[..expected]
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect(),
    };
    Ok(values)
}

/// Loads data from `config`, resolving `data.path` relative to the config
/// file's own directory (not the process CWD), matching
/// `loadDataFromInput`'s `config_dir` handling. `prior_assignment`, when
/// given, replaces the identity starting assignment.
pub fn load_from_config(
    config: &InputConfig,
    config_dir: &Path,
    prior_assignment: Option<Vec<usize>>,
) -> Result<LoadedData, DataLoadError> {
    let (num_rows, num_cols) = (config.grid.rows, config.grid.columns);
    let depth = TreeHeight::from_grid_dims(num_rows, num_cols).as_usize();
    let capacity = geometry::required_capacity(num_rows, num_cols, depth);
    let grid_capacity = num_rows * num_cols;

    if grid_capacity < config.data.length {
        return Err(DataLoadError::GridTooSmall {
            rows: num_rows,
            cols: num_cols,
            capacity: grid_capacity,
            declared: config.data.length,
        });
    }

    let element_len = config.data.dimensions.element_len();
    let data_path: PathBuf = config_dir.join(&config.data.path);
    let precision = config.data.precision;
    let raw = read_raw_payload(&data_path, precision, config.data.length, element_len)?;

    // Leaf positions `length..grid_capacity` have no backing data element and
    // are void (`None`), not a zero-filled vector (§3's "void cell"). Slots
    // beyond `grid_capacity` are internal-height aggregate storage; they're
    // seeded with a zero vector and overwritten by the first aggregation
    // pass regardless.
    let mut data: Vec<Option<DataVector>> = Vec::with_capacity(capacity);
    for row in 0..config.data.length {
        let start = row * element_len;
        data.push(Some(raw[start..start + element_len].to_vec()));
    }
    for _ in config.data.length..grid_capacity {
        data.push(None);
    }
    for _ in grid_capacity..capacity {
        data.push(Some(vec![0.0; element_len]));
    }

    let assignment = prior_assignment.unwrap_or_else(|| identity_assignment(data.len()));

    Ok(LoadedData {
        data,
        assignment,
        num_rows,
        num_cols,
        depth,
        num_real_elements: config.data.length,
        data_dims: (
            config.data.dimensions.x,
            config.data.dimensions.y,
            config.data.dimensions.z,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_rgb_data_ramps_across_corners() {
        let data = generate_uniform_rgb_data(4, 4);
        let top_left = data[0].as_ref().unwrap();
        assert_eq!(top_left, &vec![0.0, 0.0, 0.0]);

        let top_right = data[3].as_ref().unwrap();
        assert!((top_right[0] - 255.0).abs() < 1e-9);
        assert!((top_right[2] - 0.0).abs() < 1e-9);
    }

    #[test]
    fn uniform_rgb_data_pads_aggregate_slots_with_zero() {
        let data = generate_uniform_rgb_data(3, 3);
        let capacity = geometry::required_capacity(3, 3, TreeHeight::from_grid_dims(3, 3).as_usize());
        assert_eq!(data.len(), capacity);
        assert_eq!(data[9], Some(vec![0.0, 0.0, 0.0]));
    }

    #[test]
    fn identity_assignment_is_the_range() {
        assert_eq!(identity_assignment(5), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn resume_assignment_resolves_sentinels_to_void_slots_in_order() {
        use crate::read_write_utils::VOID_SENTINEL;

        let data: Vec<Option<DataVector>> = vec![Some(vec![1.0]), None, Some(vec![2.0]), None];
        let raw = vec![2u32, VOID_SENTINEL, 0u32, VOID_SENTINEL];
        let resolved = resume_assignment(&raw, &data);
        assert_eq!(resolved, vec![2, 1, 0, 3]);
    }

    #[test]
    fn resume_assignment_passes_through_when_no_sentinels_present() {
        let data: Vec<Option<DataVector>> = vec![Some(vec![1.0]), Some(vec![2.0])];
        let raw = vec![1u32, 0u32];
        assert_eq!(resume_assignment(&raw, &data), vec![1, 0]);
    }

    #[test]
    fn load_from_config_leaves_leftover_leaf_slots_void() {
        use crate::config::{DataDims, GridDims, InputConfig, InputDataConfig, InputType};

        let dir = std::env::temp_dir().join("ldg_ssm_data_test_void_cell");
        std::fs::create_dir_all(&dir).unwrap();
        let data_path = dir.join("data.raw");
        // 8 real 1-element rows for a 3x3 (9-leaf) grid: leaf 8 must end up void.
        let payload: Vec<u8> = (0..8u32).flat_map(|i| (i as f64).to_le_bytes()).collect();
        std::fs::write(&data_path, payload).unwrap();

        let config = InputConfig {
            input_type: InputType::Data,
            grid: GridDims { rows: 3, columns: 3 },
            data: InputDataConfig {
                length: 8,
                path: "data.raw".to_string(),
                dimensions: DataDims { x: 1, y: 1, z: 1 },
                precision: DataPrecision::F64,
            },
        };

        let loaded = load_from_config(&config, &dir, None).unwrap();
        assert_eq!(loaded.num_real_elements, 8);
        for i in 0..8 {
            assert!(loaded.data[i].is_some());
        }
        assert!(loaded.data[8].is_none(), "leaf 8 has no backing element and must be void");

        let _ = std::fs::remove_file(&data_path);
        let _ = std::fs::remove_dir(&dir);
    }
}
