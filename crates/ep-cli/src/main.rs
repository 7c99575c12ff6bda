use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use ep_core::WorkspaceId;
use tracing_subscriber::EnvFilter;

use ep_cli::commands::{import, init, plan, plans, seed, show, status, workspaces};
use ep_cli::{Cli, Commands, Config};

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(ep_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = ep_db::Database::open(&config.database_path).context("failed to open database")?;
    Ok((db, config))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Logs go to stderr so JSON on stdout stays parseable
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match &cli.command {
        Some(Commands::Init { name }) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            init::run(&mut out, &db, name)?;
        }
        Some(Commands::Workspaces { json }) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            workspaces::run(&mut out, &db, *json)?;
        }
        Some(Commands::Import { workspace, file }) => {
            let (mut db, _config) = open_database(cli.config.as_deref())?;
            let workspace_id =
                WorkspaceId::new(workspace.as_str()).context("invalid workspace id")?;
            import::run(&mut out, &mut db, &workspace_id, file)?;
        }
        Some(Commands::Seed { name }) => {
            let (mut db, _config) = open_database(cli.config.as_deref())?;
            seed::run(&mut out, &mut db, name)?;
        }
        Some(Commands::Plan(args)) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            plan::run(&mut out, &db, &config, args, Local::now().date_naive())?;
        }
        Some(Commands::Plans { workspace, json }) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            plans::run(&mut out, &db, workspace, *json)?;
        }
        Some(Commands::Show { id, json }) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            show::run(&mut out, &db, id, *json)?;
        }
        Some(Commands::Status) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            status::run(&mut out, &db, &config.database_path)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
