//! # scabbard-common
//!
//! Shared command-result types, error definitions, configuration models, and
//! path utilities used across the entire Scabbard workspace.
//!
//! This crate is the leaf of the dependency graph — it depends on no other
//! internal crate and provides the foundational primitives that all other
//! crates build upon.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod cmd;
pub mod config;
pub mod error;
pub mod paths;
