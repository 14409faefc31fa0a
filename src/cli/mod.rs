//! Command-line interface for estate-forge.
//!
//! Provides commands for running batches, inspecting stored batches and
//! scoring rubrics.

mod commands;

pub use commands::{parse_cli, parse_item_file, run, run_with_cli, Cli, Commands};
