//! Ask command - answer a CSV of questions.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use super::CorpusArgs;
use crate::context::AppContext;
use crate::records::{self, AnswerRecord};

/// Arguments for the ask command.
#[derive(Args, Debug)]
pub struct AskArgs {
    #[command(flatten)]
    pub corpus: CorpusArgs,

    /// Questions CSV with `q_id`, `questions` and optional `conversation_id`
    #[arg(long)]
    pub questions: PathBuf,

    /// Output CSV
    #[arg(long, short, default_value = "answers.csv")]
    pub output: PathBuf,
}

/// Run the ask command.
///
/// Rows sharing a conversation id are asked in file order as turns of one
/// session; rows without one are asked standalone.
pub async fn run(args: AskArgs, mut ctx: AppContext) -> Result<()> {
    args.corpus.apply(&mut ctx);
    let questions = records::read_questions(&args.questions)?;
    let rows = questions.rows;
    let (pipeline, _) = ctx.indexed_pipeline(&args.corpus.data_dir).await?;
    let collection = ctx.settings.collection.as_str();

    let mut answers = Vec::with_capacity(rows.len());
    let mut degraded = 0;
    for row in &rows {
        let outcome = match &row.conversation_id {
            Some(conversation) => pipeline.ask(collection, conversation, &row.questions).await?,
            None => pipeline.ask_standalone(collection, &row.questions).await,
        };
        if outcome.is_degraded() {
            degraded += 1;
        }
        info!(q_id = %row.q_id, status = ?outcome.status, "answered question");
        println!("[{}] {}\n{}\n", row.q_id, row.questions, outcome.answer);
        answers.push(AnswerRecord::new(row, outcome));
    }

    records::write_records(&args.output, &answers)?;
    println!(
        "Wrote {} answers to {} ({} degraded)",
        answers.len(),
        args.output.display(),
        degraded
    );
    if !questions.skipped.is_empty() {
        println!("Skipped {} unusable question rows", questions.skipped.len());
    }
    Ok(())
}
