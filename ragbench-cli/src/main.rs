//! ragbench - retrieval-augmented question answering benchmarks
//!
//! Main entry point for the `ragbench` CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod context;
mod logging;
mod records;
mod settings;

use commands::{ask, chat, compare, evaluate, index, posts, research};
use context::AppContext;
use settings::{ServiceOverrides, Settings};

/// ragbench - index a corpus, answer question sets and compare chunkers
#[derive(Parser)]
#[command(name = "ragbench")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (default: ./ragbench.toml when present)
    #[arg(short, long, global = true, env = "RAGBENCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(flatten)]
    pub services: ServiceOverrides,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Index a directory of text files
    Index(index::IndexArgs),

    /// Answer a CSV of questions
    Ask(ask::AskArgs),

    /// Compare chunking strategies on a CSV of questions
    CompareChunking(compare::CompareArgs),

    /// Interactive chat over an indexed corpus
    Chat(chat::ChatArgs),

    /// Answer a question with web searches
    Research(research::ResearchArgs),

    /// Generate social media posts concurrently
    Posts(posts::PostsArgs),

    /// Answer a CSV of questions and judge the answers
    Evaluate(evaluate::EvaluateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    // `.env` must be loaded before clap reads the environment.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    logging::init(cli.verbose, cli.log_json);

    let mut settings = Settings::load(cli.config.as_deref())?;
    settings.apply(&cli.services);
    let ctx = AppContext::new(settings)?;

    match cli.command {
        Commands::Index(args) => index::run(args, ctx).await,
        Commands::Ask(args) => ask::run(args, ctx).await,
        Commands::CompareChunking(args) => compare::run(args, ctx).await,
        Commands::Chat(args) => chat::run(args, ctx).await,
        Commands::Research(args) => research::run(args, ctx).await,
        Commands::Posts(args) => posts::run(args, ctx).await,
        Commands::Evaluate(args) => evaluate::run(args, ctx).await,
    }
}
