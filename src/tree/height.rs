//! Abstracted height data type.
//!
//! Height 0 is the leaf grid, height `depth - 1` is the single root. This
//! mirrors the bottom-up indexing used throughout the quadtree: a cell
//! position is always `(Height, index)`.

use clap::builder::{OsStr, Str};
use log::error;
use std::convert::From;
use std::{num::ParseIntError, str::FromStr};

const UNDERLYING_INT_TYPE_STR: &str = "u8";
type UnderlyingInt = u8;

/// Minimum tree height (depth) supported.
///
/// A depth of 1 is just the leaf grid with no aggregation above it, which
/// none of the partition/target machinery is built to handle.
pub const MIN_HEIGHT: Height = Height(1);

/// Maximum tree height supported.
///
/// Not a theoretic bound, just a soft limit in line with grids that still
/// fit comfortably in memory (a depth of 32 implies a leaf grid up to
/// `2^31 x 2^31`).
pub const MAX_HEIGHT: Height = Height(32);

/// Default depth used when none is given explicitly; prefer
/// [`Height::from_grid_dims`] wherever a grid size is already known.
pub const DEFAULT_HEIGHT: UnderlyingInt = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Height(UnderlyingInt);

impl Height {
    pub fn from_with_err(int: UnderlyingInt) -> Result<Self, HeightError> {
        if int < MIN_HEIGHT.0 {
            Err(HeightError::InputTooSmall)
        } else if int > MAX_HEIGHT.0 {
            Err(HeightError::InputTooBig)
        } else {
            Ok(Height(int))
        }
    }

    /// Panics instead of returning an error.
    /// Useful if you are confident the input is correct.
    pub fn from(int: UnderlyingInt) -> Self {
        match Self::from_with_err(int) {
            Ok(h) => h,
            Err(e) => {
                error!("Malformed input, error: {:?}", e);
                panic!("Malformed input, error: {:?}", e);
            }
        }
    }

    /// Depth `D` for a grid of the given dimensions: invariant I4,
    /// `ceil(log2(max(rows, cols))) + 1`.
    pub fn from_grid_dims(rows: usize, cols: usize) -> Self {
        let max_dim = rows.max(cols).max(1);
        let depth = if max_dim <= 1 {
            1
        } else {
            (usize::BITS - (max_dim - 1).leading_zeros()) as UnderlyingInt + 1
        };
        Height::from(depth)
    }

    pub fn as_raw_int(&self) -> UnderlyingInt {
        self.0
    }

    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }

    pub fn as_u32(&self) -> u32 {
        self.0 as u32
    }
}

impl FromStr for Height {
    type Err = HeightError;

    /// Constructor that takes in a string slice.
    /// If the length of the str is greater than the max then Err is returned.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Height::from_with_err(UnderlyingInt::from_str(s)?)
    }
}

impl From<Height> for OsStr {
    fn from(height: Height) -> OsStr {
        OsStr::from(Str::from(height.as_raw_int().to_string()))
    }
}

impl Default for Height {
    fn default() -> Self {
        Height(DEFAULT_HEIGHT)
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HeightError {
    #[error("Input is greater than the upper bound {MAX_HEIGHT:?}")]
    InputTooBig,
    #[error("Input is smaller than the lower bound {MIN_HEIGHT:?}")]
    InputTooSmall,
    #[error("Malformed string input for {UNDERLYING_INT_TYPE_STR:?} type")]
    MalformedString(#[from] ParseIntError),
}
