// src/lib.rs

//! loopdown
//!
//! Downloads, installs, or reports on the additional audio content Apple
//! publishes for GarageBand, Logic Pro X, and MainStage 3.
//!
//! # Architecture
//!
//! - Metadata-first: Apple property-list sources are resolved into one
//!   deduplicated package set before anything is transferred
//! - Deterministic resolution: identity by package id, mandatory records
//!   beat optional ones, stable final ordering
//! - Resumable acquisition: ranged transfers with bounded retries and
//!   stalled-transfer detection
//! - Server selection: mirror > caching proxy (explicit or discovered) >
//!   authoritative origin

pub mod acquire;
pub mod audit;
pub mod context;
mod error;
pub mod lock;
pub mod model;
pub mod platform;
pub mod resolver;
pub mod server;
pub mod source;

pub use error::{Error, Result};
