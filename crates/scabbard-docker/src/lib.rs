//! # scabbard-docker
//!
//! Synchronous facade over the Docker Engine API for the Scabbard harness:
//! image resolution and removal, container boot sessions with guaranteed
//! deletion, and command execution inside running containers.
//!
//! The harness is synchronous end to end; the async `bollard` client is
//! driven by a privately owned tokio runtime and no async surface leaks out
//! of this crate.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod boot;
pub mod client;
pub mod control;
pub mod error;
pub mod image;
