// src/model/size.rs

//! Byte quantities and per-bucket accounting
//!
//! `Size` wraps a non-negative byte count with additive combination and a
//! human-readable rendering. Disk-space comparisons and package sizes both
//! go through this type so the unit systems stay comparable.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

use crate::model::package::Package;

const UNIT_SUFFIXES: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];
const BLOCK_SIZE: f64 = 1024.0;

/// A byte quantity. Ordering is total and purely numeric.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Size(u64);

impl Size {
    pub fn new(bytes: u64) -> Self {
        Size(bytes)
    }

    pub fn bytes(self) -> u64 {
        self.0
    }

    /// Human-readable rendering: divide by 1024 while the magnitude reaches
    /// the block size and a unit suffix remains, two decimal places.
    /// `0 -> "0.00B"`, `1024 -> "1.00KB"`, `1048576 -> "1.00MB"`.
    pub fn human(self) -> String {
        let mut value = self.0 as f64;
        let mut idx = 0;

        while value >= BLOCK_SIZE && idx < UNIT_SUFFIXES.len() - 1 {
            value /= BLOCK_SIZE;
            idx += 1;
        }

        format!("{:.2}{}", value, UNIT_SUFFIXES[idx])
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.human())
    }
}

impl Add for Size {
    type Output = Size;

    fn add(self, other: Size) -> Size {
        Size(self.0 + other.0)
    }
}

impl AddAssign for Size {
    fn add_assign(&mut self, other: Size) {
        self.0 += other.0;
    }
}

impl Sum for Size {
    fn sum<I: Iterator<Item = Size>>(iter: I) -> Size {
        iter.fold(Size::default(), Add::add)
    }
}

/// Accumulates count + download bytes + installed bytes for one class of
/// packages (required or optional).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BucketStats {
    pub count: u64,
    pub download: Size,
    pub installed: Size,
}

impl BucketStats {
    pub fn add(&mut self, pkg: &Package) {
        self.count += 1;
        self.download += pkg.download_size;
        self.installed += pkg.installed_size;
    }
}

impl Add for BucketStats {
    type Output = BucketStats;

    fn add(self, other: BucketStats) -> BucketStats {
        BucketStats {
            count: self.count + other.count,
            download: self.download + other.download,
            installed: self.installed + other.installed,
        }
    }
}
