//! Reading the heap layout from configuration files.
//!
//! The layout lives in the `[heap]` table of a `Drone.toml`-like document:
//!
//! ```toml
//! [heap]
//! size = "10K"
//! policy = "priority"
//! pools = [
//!     { block = "8", capacity = 640 },
//!     { block = "32", capacity = 80 },
//!     { block = "256", capacity = 10 },
//! ]
//! ```
//!
//! Sizes are given either as integers or as strings with an optional `0x`
//! prefix or `K`/`M` suffix. The `size` field is optional, but if present it
//! should match the resulting size of the pools.

use crate::error::ConfigError;
use crate::heap::{HeapLayout, PoolLayout};
use crate::wait::SuspensionPolicy;
use serde::Deserialize;
use std::str::FromStr;
use thiserror::Error;

/// Configuration parsing error.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Malformed document.
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    /// Malformed size string.
    #[error("invalid size `{0}`")]
    Size(String),
    /// Well-formed but invalid layout.
    #[error(transparent)]
    Layout(#[from] ConfigError),
}

#[derive(Deserialize)]
struct Document {
    heap: Heap,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct Heap {
    size: Option<Size>,
    pools: Vec<Pool>,
    #[serde(default)]
    policy: SuspensionPolicy,
    waiters: Option<usize>,
    #[serde(default)]
    spill: bool,
    #[serde(default)]
    track_leaks: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Pool {
    block: Size,
    capacity: usize,
}

#[derive(Clone, Copy, Deserialize)]
#[serde(try_from = "RawSize")]
struct Size(usize);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSize {
    Int(u64),
    Str(String),
}

impl TryFrom<RawSize> for Size {
    type Error = ParseError;

    fn try_from(raw: RawSize) -> Result<Self, ParseError> {
        match raw {
            RawSize::Int(value) => usize::try_from(value).map(Size).map_err(|_| ParseError::Size(value.to_string())),
            RawSize::Str(value) => parse_size(&value).map(Size),
        }
    }
}

/// Parses a size string like `"256"`, `"0x100"`, `"20K"`, or `"1M"`.
pub fn parse_size(input: &str) -> Result<usize, ParseError> {
    let error = || ParseError::Size(input.to_owned());
    let trimmed = input.trim();
    let (digits, multiplier) = if let Some(digits) = trimmed.strip_suffix('K') {
        (digits, 1 << 10)
    } else if let Some(digits) = trimmed.strip_suffix('M') {
        (digits, 1 << 20)
    } else {
        (trimmed, 1)
    };
    let value = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => digits.parse(),
    };
    value.ok().and_then(|value| value.checked_mul(multiplier)).ok_or_else(error)
}

impl HeapLayout {
    /// Reads the layout from the `[heap]` table of a TOML document.
    ///
    /// Other tables of the document are ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use drone_mempool::heap::{HeapLayout, PoolLayout};
    ///
    /// let layout = HeapLayout::from_toml(
    ///     r#"
    ///     [heap]
    ///     size = "1K"
    ///     pools = [{ block = 16, capacity = 32 }, { block = "0x40", capacity = 8 }]
    ///     "#,
    /// )?;
    /// assert_eq!(layout.pools(), [PoolLayout::new(16, 32), PoolLayout::new(64, 8)]);
    /// # Ok::<(), drone_mempool::config::ParseError>(())
    /// ```
    pub fn from_toml(input: &str) -> Result<Self, ParseError> {
        let Document { heap } = toml::from_str(input)?;
        let mut layout = HeapLayout::new(heap.pools.iter().map(|pool| PoolLayout::new(pool.block.0, pool.capacity)))
            .policy(heap.policy)
            .spill(heap.spill)
            .track_leaks(heap.track_leaks);
        if let Some(waiters) = heap.waiters {
            layout = layout.waiters(waiters);
        }
        if let Some(Size(declared)) = heap.size {
            let actual = layout.size();
            if declared != actual {
                return Err(ConfigError::SizeMismatch { declared, actual }.into());
            }
        }
        layout.validate()?;
        Ok(layout)
    }
}

impl FromStr for HeapLayout {
    type Err = ParseError;

    fn from_str(input: &str) -> Result<Self, ParseError> {
        Self::from_toml(input)
    }
}
