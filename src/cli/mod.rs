//! CLI module for the compute-vm tool.
//!
//! This module provides the command-line interface for validating and
//! resolving instance configurations.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::OutputFormatter;
