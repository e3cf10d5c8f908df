// Inote - local notes store
// Command-line entry point

use anyhow::Context;
use clap::{Parser, Subcommand};
use inote_core::AppContext;
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the database, attachments and backups.
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// List all notes, pinned first.
    Notes,
    /// List all folders.
    Folders,
    /// Full-text search over note titles and previews.
    Search {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Write a backup archive into the backups directory.
    Export,
    /// Upsert the contents of a backup archive.
    Import { file: PathBuf },
    /// List backup archives, newest first.
    Backups,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so command output stays parseable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inote_core=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting inote at {:?}", cli.data_dir);

    let ctx = AppContext::open(&cli.data_dir)
        .await
        .with_context(|| format!("Failed to open data directory {}", cli.data_dir.display()))?;

    let result = run(&ctx, cli.command).await;
    ctx.shutdown().await;
    result
}

async fn run(ctx: &AppContext, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Notes => print_json(&ctx.notes.get_all().await?),
        Commands::Folders => print_json(&ctx.folders.get_all().await?),
        Commands::Search { text } => print_json(&ctx.notes.search(&text.join(" ")).await?),
        Commands::Export => {
            let path = ctx.backup.export_backup().await?;
            print_json(&path)
        }
        Commands::Import { file } => {
            let summary = ctx
                .backup
                .import_backup(&file)
                .await
                .with_context(|| format!("Failed to import {}", file.display()))?;
            print_json(&summary)
        }
        Commands::Backups => print_json(&ctx.backup.list_backups().await?),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_search_joins_words() {
        let cli = Cli::try_parse_from(["inote", "/data", "search", "shopping", "list"]).unwrap();

        assert_eq!(cli.data_dir, PathBuf::from("/data"));
        assert_eq!(
            cli.command,
            Commands::Search {
                text: vec!["shopping".to_string(), "list".to_string()]
            }
        );
    }

    #[test]
    fn test_import_requires_file() {
        assert!(Cli::try_parse_from(["inote", "/data", "import"]).is_err());
        assert!(Cli::try_parse_from(["inote", "/data", "search"]).is_err());

        let cli = Cli::try_parse_from(["inote", "/data", "import", "b.zip"]).unwrap();
        assert_eq!(cli.command, Commands::Import { file: PathBuf::from("b.zip") });
    }

    #[test]
    fn test_help_is_not_a_data_dir() {
        let err = Cli::try_parse_from(["inote", "--help"]).err().unwrap();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
