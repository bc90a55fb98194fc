//! Command line entry point

use clap::{Parser, Subcommand};
use ragforge::context::AppContext;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ragforge", version, about = "GraphRAG knowledge compiler and agent runtime")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scaffold a new agent project
    Init {
        /// Project name; also the directory created
        name: String,
    },
    /// Build the vector index and knowledge graph from data/
    Build {
        /// Project directory
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
    /// Serve the agent over REST chat, MCP, and A2A
    Serve {
        /// Project directory
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        /// Alternative manifest file
        #[arg(long)]
        agent: Option<PathBuf>,
    },
    /// Print the version
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Init { name } => {
            let path = ragforge::scaffold::scaffold_project(&name, std::path::Path::new("."))?;
            println!("Created {}", path.display());
            println!("Next: add documents to data/, fill in config.yaml, run `ragforge build`.");
        }
        Command::Build { dir } => {
            let ctx = AppContext::load(&dir, None)?;
            let report = ragforge::builder::build(&ctx).await?;
            println!(
                "Build complete: {} documents, {} chunks, {} vectors, {} facts ({} groups skipped)",
                report.documents,
                report.chunks,
                report.vectors,
                report.triples,
                report.skipped_triple_groups
            );
            println!("Tool description: {}", report.tool_description);
        }
        Command::Serve { dir, agent } => {
            let ctx = AppContext::load(&dir, agent.as_deref())?;
            ragforge::server::serve(ctx).await?;
        }
        Command::Version => {
            println!("ragforge {}", ragforge::VERSION);
        }
    }
    Ok(())
}
