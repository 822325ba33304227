use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::env;
use std::path::PathBuf;

use minerva::config::PipelineConfig;
use minerva::db::Database;
use minerva::logging::configure_logging;
use minerva::panel::PanelBuilder;
use minerva::workers::{run_classify, run_resolve};
use minerva::{ingest, stats};

#[derive(Parser)]
#[command(name = "minerva", about = "Patent AI classification and firm-year panel pipeline")]
struct Cli {
    /// Path to the SQLite database (falls back to DATABASE_PATH)
    #[arg(long, global = true)]
    db: Option<String>,

    /// Path to a JSON pipeline configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load JSON-lines input files into the database
    Ingest {
        #[arg(long)]
        patents: Option<PathBuf>,
        #[arg(long)]
        abstracts: Option<PathBuf>,
        #[arg(long)]
        assignees: Option<PathBuf>,
        #[arg(long)]
        firms: Option<PathBuf>,
        #[arg(long)]
        financials: Option<PathBuf>,
    },
    /// Classify every patent as AI-related or not
    Classify,
    /// Resolve assignees of AI patents against the firm registry
    Resolve,
    /// Build the sparse firm-year panel
    Panel,
    /// Run classify, resolve and panel in order
    Run,
    /// Print table counts and run counters
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    configure_logging();

    let cli = Cli::parse();
    let config = PipelineConfig::load(cli.config.as_deref())?;
    let database_path = cli
        .db
        .or_else(|| env::var("DATABASE_PATH").ok())
        .unwrap_or_else(|| "minerva.db".to_string());
    let db = Database::new(&database_path)
        .await
        .with_context(|| format!("database could not be opened at {}", database_path))?;

    match cli.command {
        Command::Ingest {
            patents,
            abstracts,
            assignees,
            firms,
            financials,
        } => {
            if let Some(path) = patents {
                ingest::ingest_patents(&db, &path).await?;
            }
            if let Some(path) = abstracts {
                ingest::ingest_abstracts(&db, &path).await?;
            }
            if let Some(path) = assignees {
                ingest::ingest_assignees(&db, &path).await?;
            }
            if let Some(path) = firms {
                ingest::ingest_firms(&db, &path).await?;
            }
            if let Some(path) = financials {
                ingest::ingest_financials(&db, &path).await?;
            }
        }
        Command::Classify => {
            run_classify(&db, &config).await?;
        }
        Command::Resolve => {
            run_resolve(&db, &config).await?;
        }
        Command::Panel => {
            PanelBuilder::new(&db, &config).build().await?;
        }
        Command::Run => {
            run_classify(&db, &config).await?;
            run_resolve(&db, &config).await?;
            PanelBuilder::new(&db, &config).build().await?;
        }
        Command::Stats => {
            stats::print_stats(&db).await?;
        }
    }

    Ok(())
}
