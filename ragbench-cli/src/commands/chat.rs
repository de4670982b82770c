//! Chat command - interactive multi-turn questions over an indexed corpus.

use anyhow::Result;
use clap::Args;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};

use super::CorpusArgs;
use crate::context::AppContext;

/// Arguments for the chat command.
#[derive(Args, Debug)]
pub struct ChatArgs {
    #[command(flatten)]
    pub corpus: CorpusArgs,
}

fn is_exit(line: &str) -> bool {
    matches!(line.to_lowercase().as_str(), "exit" | "q" | "quit")
}

/// Run the chat command.
pub async fn run(args: ChatArgs, mut ctx: AppContext) -> Result<()> {
    args.corpus.apply(&mut ctx);
    let (pipeline, report) = ctx.indexed_pipeline(&args.corpus.data_dir).await?;
    let collection = ctx.settings.collection.as_str();
    let conversation = pipeline.sessions().open().await;

    let config = Config::builder().history_ignore_space(true).auto_add_history(true).build();
    let mut editor: Editor<(), DefaultHistory> = Editor::with_config(config)?;

    println!(
        "Indexed {} documents. Ask a question, or 'exit' to quit.",
        report.documents_indexed
    );
    loop {
        match editor.readline("> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if is_exit(line) {
                    break;
                }
                let outcome = pipeline.ask(collection, &conversation, line).await?;
                if outcome.search_query != line {
                    println!("(searched: {})", outcome.search_query);
                }
                println!("{}", outcome.answer);
                if let Some(source) = &outcome.retrieved_source {
                    println!("[source: {source}]");
                }
                for warning in &outcome.warnings {
                    eprintln!("warning: {warning}");
                }
                println!();
            }
            Err(ReadlineError::Interrupted) => {
                println!("(Interrupted - type exit to quit)");
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }
    println!("Goodbye!");
    Ok(())
}
