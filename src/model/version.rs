// src/model/version.rs

//! Package version parsing and prefix-floor comparisons
//!
//! Content metadata carries dotted version strings like `2.1.0.0.20230419`
//! that are not semver; only the leading numeric release components matter
//! for install/upgrade decisions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A version reduced to its release-number tuple. Non-numeric trailing
/// components are ignored (`"2.1b3"` parses as `[2]` + ignored tail).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageVersion {
    raw: String,
    release: Vec<u64>,
}

impl PackageVersion {
    /// Parse a dotted version string. Never fails: the release tuple is
    /// whatever leading numeric components the string carries, possibly
    /// empty.
    pub fn parse(s: &str) -> PackageVersion {
        let trimmed = s.trim();
        let release: Vec<u64> = trimmed
            .split('.')
            .map_while(|part| part.parse::<u64>().ok())
            .collect();

        PackageVersion {
            raw: trimmed.to_string(),
            release,
        }
    }

    /// Version sentinel for "not installed".
    pub fn zero() -> Self {
        PackageVersion {
            raw: "0.0.0".to_string(),
            release: vec![0, 0, 0],
        }
    }

    pub fn release(&self) -> &[u64] {
        &self.release
    }

    /// Prefix-floor satisfaction: treating `self` as the required version,
    /// the installed release tuple (zero-padded or truncated to the required
    /// length) must be >= the required tuple, compared component-wise as a
    /// tuple. Extra trailing components on the installed side (build
    /// metadata suffixes) never disqualify it.
    pub fn satisfied_by(&self, installed: &PackageVersion) -> bool {
        let required = &self.release;

        // an empty required release is an odd source value; treat as no minimum
        if required.is_empty() {
            return true;
        }

        let installed_prefix: Vec<u64> = (0..required.len())
            .map(|i| installed.release.get(i).copied().unwrap_or(0))
            .collect();

        installed_prefix >= *required
    }
}

impl FromStr for PackageVersion {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(PackageVersion::parse(s))
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vers(s: &str) -> PackageVersion {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_release_components() {
        assert_eq!(vers("2.1.0.0.20230419").release(), &[2, 1, 0, 0, 20230419]);
        assert_eq!(vers("2.1").release(), &[2, 1]);
        assert_eq!(vers("2.1b3").release(), &[2]);
    }

    #[test]
    fn test_floor_satisfied_with_trailing_components() {
        // installed=(2,1,0,0), required=(2,1) -> satisfies
        assert!(vers("2.1").satisfied_by(&vers("2.1.0.0")));
    }

    #[test]
    fn test_floor_not_satisfied() {
        // installed=(2,0), required=(2,1) -> does not satisfy
        assert!(!vers("2.1").satisfied_by(&vers("2.0")));
    }

    #[test]
    fn test_floor_zero_padding() {
        // installed=(2,), required=(2,0,0) -> satisfies after zero-padding
        assert!(vers("2.0.0").satisfied_by(&vers("2")));
    }

    #[test]
    fn test_zero_sentinel_never_satisfies() {
        assert!(!vers("2.1").satisfied_by(&PackageVersion::zero()));
    }

    #[test]
    fn test_empty_required_release_is_no_minimum() {
        assert!(vers("beta").satisfied_by(&PackageVersion::zero()));
    }
}
