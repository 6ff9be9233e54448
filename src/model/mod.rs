// src/model/mod.rs

//! Data model for audio content processing
//!
//! This module provides the core value types: `Package` (one installable
//! content unit), `Application` (a detected host application), `Size` and
//! `BucketStats` (byte accounting), and `PackageVersion` (release-tuple
//! version comparisons).

pub mod application;
pub mod package;
pub mod size;
pub mod version;

pub use application::Application;
pub use package::Package;
pub use size::{BucketStats, Size};
pub use version::PackageVersion;
