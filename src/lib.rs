//! veo-director library crate.
//!
//! Prompt suggestion, long-running video generation and the lifecycle
//! controller that tracks a generation from submission to a downloaded
//! video. The binary in `main.rs` is a thin CLI over these pieces.

pub mod cli;
pub mod config;
pub mod genai;
pub mod handle;
pub mod lifecycle;
pub mod media;
