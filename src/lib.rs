//! runcode daemon library
//!
//! This crate provides the core functionality for the run-code daemon:
//! - Configuration loading from JSON and environment overrides
//! - Per-language build/run command tables
//! - Ephemeral sessions with guaranteed artifact cleanup
//! - A process backend enforcing deadlines and output ceilings
//! - The HTTP server exposing `POST /api/run-code`

pub mod backend;
pub mod config;
pub mod error;
pub mod http;
pub mod language;
pub mod runner;
pub mod session;
