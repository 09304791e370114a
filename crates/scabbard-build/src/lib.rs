//! # scabbard-build
//!
//! Builds container images from source trees with the external `pack` CLI
//! and Cloud Native Buildpacks, and packages local buildpack directories
//! into images `pack` can consume natively.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod buildpack;
pub mod error;
pub mod pack;

/// Name of the external builder CLI.
pub const PACK_BIN: &str = "pack";
