//! Command-line interface definitions and helpers.
//!
//! This module contains all CLI argument parsing and subcommand handlers.

mod args;
mod commands;

pub use args::{parse_aspect_ratio, Cli, Command, ConfigAction};
pub use commands::{
    build_client, choose_prompt, format_elapsed, handle_config_action, run_generate, run_studio,
    run_suggest,
};
