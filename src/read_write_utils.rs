//! Persistence and export (C12): raw assignment/disparity dumps, the
//! visualization config JSON, debug-mode PNG snapshots, and the per-iteration
//! CSV log (§4.12, §6c).
//!
//! `parse_serialization_path` keeps the source this was distilled from's
//! directory/file/extension resolution idiom; everything downstream of it
//! (the raw framing, the visualization JSON, the PNG export, the CSV writer)
//! is specific to this crate's payload formats.

use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::PathBuf;

use bzip2::bufread::BzDecoder;
use bzip2::write::BzEncoder;
use bzip2::Compression;
use image::{ImageBuffer, Luma, Rgb};
use logging_timer::stime;
use serde::{Deserialize, Serialize};

use crate::tree::{CellPosition, QuadAssignmentTree};

/// Sentinel written for a void leaf slot in the assignment file (§6c).
pub const VOID_SENTINEL: u32 = 0xFFFF_FFFF;

#[derive(thiserror::Error, Debug)]
pub enum ReadWriteError {
    #[error("problem writing to file")]
    FileWriteError(#[from] std::io::Error),
    #[error("problem serializing visualization config to JSON")]
    JsonError(#[from] serde_json::Error),
    #[error("problem encoding PNG")]
    ImageError(#[from] image::ImageError),
    #[error("unknown file extension {actual:?}, expected {expected}")]
    UnsupportedFileExtension { expected: String, actual: OsString },
}

/// Parse `path` as one that points to a file that will be used for
/// serialization.
///
/// `path` can be either of the following:
/// 1. Existing directory: in this case a default file name is appended to
/// `path`. 2. Non-existing directory: in this case all dirs in the path are
/// created, and a default file name is appended.
/// 3. File in existing dir: in this case the extension is checked to be
/// `expected_extension`, then `path` is returned.
/// 4. File in non-existing dir: dirs in the path are created and the file
/// extension is checked.
///
/// The default file name is `default_file_name_prefix + "_" + <timestamp> + "."
/// + extension`.
pub fn parse_serialization_path(
    mut path: PathBuf,
    extension: &str,
    default_file_name_prefix: &str,
) -> Result<PathBuf, ReadWriteError> {
    if let Some(ext) = path.extension() {
        if ext != extension {
            return Err(ReadWriteError::UnsupportedFileExtension {
                expected: extension.to_owned(),
                actual: ext.to_os_string(),
            });
        }
        if let Some(parent) = path.parent() {
            if !parent.is_dir() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(path)
    } else {
        if !path.is_dir() {
            std::fs::create_dir_all(path.clone())?;
        }
        let mut file_name: String = default_file_name_prefix.to_owned();
        let now = chrono::offset::Local::now();
        file_name.push_str(&now.timestamp().to_string());
        file_name.push('.');
        file_name.push_str(extension);
        path.push(file_name);
        Ok(path)
    }
}

fn open_raw_writer(path: &PathBuf, compress: bool) -> Result<Box<dyn Write>, ReadWriteError> {
    let file = File::create(path)?;
    if compress {
        Ok(Box::new(BzEncoder::new(BufWriter::new(file), Compression::best())))
    } else {
        Ok(Box::new(BufWriter::new(file)))
    }
}

/// Writes the full flat assignment array (every height, leaf-to-root,
/// row-major per height) as raw little-endian `u32`s, with void leaves
/// marked by [`VOID_SENTINEL`] (§6c). `compress` appends `.bz2` framing atop
/// the same `.raw` layout.
#[stime("debug")]
pub fn write_assignment_file(
    tree: &QuadAssignmentTree,
    path: &PathBuf,
    compress: bool,
) -> Result<(), ReadWriteError> {
    let mut writer = open_raw_writer(path, compress)?;
    for height in 0..tree.depth() {
        let dims = tree.dims_at(height);
        for idx in 0..dims.len() {
            let pos = CellPosition::new(height, idx);
            let value = if tree.value(pos).is_some() {
                tree.assignment_value(pos) as u32
            } else {
                VOID_SENTINEL
            };
            writer.write_all(&value.to_le_bytes())?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Reads back a `--input` assignment file written by
/// [`write_assignment_file`]: the full leaf-to-root `u32` array, sentinels
/// included (resolving a sentinel into a concrete data-pool index is the
/// caller's job — see `data::resume_assignment`).
pub fn read_assignment_file(path: &PathBuf, compressed: bool) -> Result<Vec<u32>, ReadWriteError> {
    let file = File::open(path)?;
    let mut bytes = Vec::new();
    if compressed {
        BzDecoder::new(BufReader::new(file)).read_to_end(&mut bytes)?;
    } else {
        BufReader::new(file).read_to_end(&mut bytes)?;
    }
    Ok(bytes.chunks_exact(4).map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect())
}

/// Writes a per-node disparity vector (one `f64` per tree slot, same
/// leaf-to-root layout as the assignment file, no sentinel) (§6c).
#[stime("debug")]
pub fn write_disparities_file(
    disparities: &[f64],
    path: &PathBuf,
    compress: bool,
) -> Result<(), ReadWriteError> {
    let mut writer = open_raw_writer(path, compress)?;
    for value in disparities {
        writer.write_all(&value.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes the flat data pool (every slot, leaf and aggregate alike) as raw
/// little-endian `f64`s, `data_element_len()` values per slot, void slots
/// zero-filled — matching `exportRawData`'s `data_copy` (§6c, SPEC_FULL.md's
/// "raw data payload" export requirement), so the visualization tool's
/// export directory is self-contained.
#[stime("debug")]
pub fn write_data_file(tree: &QuadAssignmentTree, path: &PathBuf, compress: bool) -> Result<(), ReadWriteError> {
    let mut writer = open_raw_writer(path, compress)?;
    let element_len = tree.data_element_len();
    for value in tree.data() {
        match value {
            Some(v) => {
                for x in v {
                    writer.write_all(&x.to_le_bytes())?;
                }
            }
            None => {
                for _ in 0..element_len {
                    writer.write_all(&0.0f64.to_le_bytes())?;
                }
            }
        }
    }
    writer.flush()?;
    Ok(())
}

/// The JSON sidecar a visualization front-end reads to locate the three
/// payload files, plus the grid shape needed to reinterpret them (§6c).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VisualizationConfig {
    pub rows: usize,
    pub columns: usize,
    pub depth: usize,
    pub assignment_path: String,
    pub disparity_path: String,
    pub data_path: String,
}

impl VisualizationConfig {
    pub fn to_json_file(&self, path: &PathBuf) -> Result<(), ReadWriteError> {
        let serialized = serde_json::to_string_pretty(self)?;
        std::fs::write(path, serialized)?;
        Ok(())
    }
}

/// Dumps one PNG per height showing each cell's current representative
/// vector: 3+ channel vectors render as RGB (first 3 channels), everything
/// else renders as grayscale from the first channel, matching the debug
/// visualization the source this was distilled from produces (§6c).
#[stime("debug")]
pub fn write_debug_images(tree: &QuadAssignmentTree, output_dir: &PathBuf) -> Result<(), ReadWriteError> {
    std::fs::create_dir_all(output_dir)?;
    for height in 0..tree.depth() {
        let dims = tree.dims_at(height);
        let path = output_dir.join(format!("height_{height}.png"));

        if tree.data_element_len() >= 3 {
            let mut img = ImageBuffer::new(dims.cols as u32, dims.rows as u32);
            for idx in 0..dims.len() {
                let (row, col) = (idx / dims.cols, idx % dims.cols);
                let pixel = match tree.value(CellPosition::new(height, idx)) {
                    Some(v) => Rgb([
                        v.first().copied().unwrap_or(0.0).clamp(0.0, 255.0) as u8,
                        v.get(1).copied().unwrap_or(0.0).clamp(0.0, 255.0) as u8,
                        v.get(2).copied().unwrap_or(0.0).clamp(0.0, 255.0) as u8,
                    ]),
                    None => Rgb([0, 0, 0]),
                };
                img.put_pixel(col as u32, row as u32, pixel);
            }
            img.save(&path)?;
        } else {
            let mut img: ImageBuffer<Luma<u8>, Vec<u8>> = ImageBuffer::new(dims.cols as u32, dims.rows as u32);
            for idx in 0..dims.len() {
                let (row, col) = (idx / dims.cols, idx % dims.cols);
                let pixel = match tree.value(CellPosition::new(height, idx)) {
                    Some(v) => Luma([v.first().copied().unwrap_or(0.0).clamp(0.0, 255.0) as u8]),
                    None => Luma([0]),
                };
                img.put_pixel(col as u32, row as u32, pixel);
            }
            img.save(&path)?;
        }
    }
    Ok(())
}

/// One row of the per-iteration CSV log (§6c): written unbuffered (flushed
/// after every row), so a killed run still leaves a usable partial log.
pub struct IterationLogRow {
    pub pass: usize,
    pub height: usize,
    pub iteration: usize,
    pub distance: f64,
    pub num_exchanges: usize,
    pub max_iterations: usize,
    pub distance_threshold: f64,
    pub using_partition_swaps: bool,
    pub rows: usize,
    pub columns: usize,
}

/// Semicolon-separated CSV writer over [`IterationLogRow`], header written
/// once at construction.
pub struct IterationLogWriter {
    file: File,
}

impl IterationLogWriter {
    pub fn create(path: &PathBuf) -> Result<Self, ReadWriteError> {
        let mut file = File::create(path)?;
        writeln!(
            file,
            "time;pass;height;iteration;distance;num_exchanges;max_iterations;distance_threshold;using_partition_swaps;rows;columns"
        )?;
        Ok(IterationLogWriter { file })
    }

    pub fn write_row(&mut self, row: &IterationLogRow) -> Result<(), ReadWriteError> {
        let time = chrono::offset::Local::now().to_rfc3339();
        writeln!(
            self.file,
            "{time};{};{};{};{};{};{};{};{};{};{}",
            row.pass,
            row.height,
            row.iteration,
            row.distance,
            row.num_exchanges,
            row.max_iterations,
            row.distance_threshold,
            row.using_partition_swaps,
            row.rows,
            row.columns,
        )?;
        self.file.flush()?;
        Ok(())
    }
}
