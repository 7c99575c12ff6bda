//! Exam planner CLI library.
//!
//! This crate provides the CLI interface for the exam planner.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands, PlanArgs};
pub use config::{Config, HorizonSettings, PlannerSettings};
