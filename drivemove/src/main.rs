use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use drivemove::config::MoverConfig;
use drivemove::{DriveDirectory, MoveOptions, credentials, logging, move_folder};
use drivemove_core::DriveClient;

#[derive(Debug, Parser)]
#[command(name = "drivemove", version, about = "Move Google Drive folders, shared drives included")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
enum Command {
    /// Move SOURCE with all nested folders and files into DESTINATION.
    Move {
        source: String,
        destination: String,
        /// Recreate the tree even when a direct reparent is possible.
        #[arg(long)]
        force_tree_mirror: bool,
        /// Plan the move and print it without changing anything.
        #[arg(long)]
        dry_run: bool,
    },
    /// Store credentials from DRIVEMOVE_REFRESH_TOKEN in the keyring.
    Login,
    /// Remove stored credentials.
    Logout,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = MoverConfig::from_env();
    logging::init_tracing(&config.log_filter)?;

    match cli.command {
        Command::Login => {
            credentials::login(&config).await?;
            tracing::info!("credentials saved");
            Ok(ExitCode::SUCCESS)
        }
        Command::Logout => {
            credentials::logout()?;
            tracing::info!("saved credentials removed");
            Ok(ExitCode::SUCCESS)
        }
        Command::Move {
            source,
            destination,
            force_tree_mirror,
            dry_run,
        } => {
            let token = credentials::resolve_access_token(&config).await?;
            let client = DriveClient::with_base_url(&config.api_base_url, token)
                .context("failed to build drive client")?;
            let directory = DriveDirectory::new(client).with_page_size(config.page_size);
            let options = MoveOptions {
                force_tree_mirror,
                dry_run,
                list_concurrency: config.list_concurrency,
            };
            let outcome = move_folder(directory, &source, &destination, options).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(if outcome.has_errors() {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            })
        }
    }
}
