//! Command-line argument definitions.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

/// Exam timetabling and seat allocation.
///
/// Builds a clash-free exam timetable for a workspace's courses and seats
/// every enrolled student in the available halls.
#[derive(Debug, Parser)]
#[command(name = "ep", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a workspace and print its ID.
    Init {
        /// Workspace name.
        name: String,
    },

    /// List workspaces.
    Workspaces {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Replace a workspace's catalog with the contents of a JSON file.
    Import {
        /// Target workspace ID.
        #[arg(short, long)]
        workspace: String,

        /// Catalog document with departments, programs, courses, exams,
        /// buildings, halls and students.
        file: PathBuf,
    },

    /// Create a demo workspace with sample departments, halls and students.
    Seed {
        /// Workspace name.
        #[arg(long, default_value = "Demo Workspace")]
        name: String,
    },

    /// Build a timetable and seat allocation.
    Plan(PlanArgs),

    /// List saved plans of a workspace, newest first.
    Plans {
        /// Workspace ID.
        #[arg(short, long)]
        workspace: String,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print a saved plan.
    Show {
        /// Plan ID.
        id: String,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show database location and catalog sizes.
    Status,
}

/// Arguments of `ep plan`.
#[derive(Debug, Clone, Args)]
pub struct PlanArgs {
    /// Workspace ID.
    #[arg(short, long)]
    pub workspace: String,

    /// First exam day (YYYY-MM-DD). Defaults to the configured start date,
    /// or the next Monday.
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Number of calendar days in the horizon.
    #[arg(long)]
    pub days: Option<u32>,

    /// Only plan these exams (repeatable).
    #[arg(long = "exam", value_name = "CODE")]
    pub exams: Vec<String>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,

    /// Store the plan in the workspace's history.
    #[arg(long)]
    pub save: bool,
}
