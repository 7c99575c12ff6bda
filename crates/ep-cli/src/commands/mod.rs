//! CLI subcommand implementations.

pub mod import;
pub mod init;
pub mod plan;
pub mod plans;
pub mod report;
pub mod seed;
pub mod show;
pub mod status;
pub mod workspaces;
