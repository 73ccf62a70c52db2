//! Fairway CLI - track golf course visits from the terminal
//!
//! Every write lands in the local database first and is uploaded by the
//! sync engine, so the CLI keeps working offline.

mod auth;
mod cli;
mod commands;
mod error;
#[cfg(test)]
mod tests;

use clap::Parser;

use crate::cli::{Cli, Commands, SyncCommands};
use crate::commands::auth_cmd::run_auth;
use crate::commands::common::{load_config, AppContext};
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::courses::run_courses;
use crate::commands::stats::run_stats;
use crate::commands::suggest::{run_suggest, SuggestArgs};
use crate::commands::sync::{run_sync, run_sync_conflicts, run_sync_status};
use crate::commands::visits::run_visits;
use crate::commands::wishlist::run_wishlist;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "fairway=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Completions { shell, output } => {
            return run_completions(shell, output.as_deref());
        }
        Commands::Config { command } => {
            let config = load_config(cli.db_path, cli.api_url)?;
            return run_config(command, &config);
        }
        command => command,
    };

    let config = load_config(cli.db_path, cli.api_url)?;
    let ctx = AppContext::open(config, cli.offline).await?;

    match command {
        Commands::Courses { command } => run_courses(command, &ctx).await,
        Commands::Visits { command } => run_visits(command, &ctx).await,
        Commands::Wishlist { command } => run_wishlist(command, &ctx).await,
        Commands::Stats { command } => run_stats(command, &ctx).await,
        Commands::Suggest {
            name,
            address,
            city,
            region,
            country,
            postal_code,
            phone,
            website,
        } => {
            let args = SuggestArgs {
                name,
                address,
                city,
                region,
                country,
                postal_code,
                phone,
                website,
            };
            run_suggest(args, &ctx).await
        }
        Commands::Sync { command } => match command {
            None => run_sync(&ctx).await,
            Some(SyncCommands::Status { json }) => run_sync_status(json, &ctx).await,
            Some(SyncCommands::Conflicts { limit, json }) => {
                run_sync_conflicts(limit, json, &ctx).await
            }
        },
        Commands::Auth { command } => run_auth(command, &ctx).await,
        Commands::Completions { .. } | Commands::Config { .. } => Ok(()),
    }
}
