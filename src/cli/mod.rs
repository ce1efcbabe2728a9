//! Command-line interface for swebench-harness.
//!
//! Provides commands to run the agent over a dataset, run a single
//! instance, and inspect the tool catalogue.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
