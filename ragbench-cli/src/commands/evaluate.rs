//! Evaluate command - answer a CSV of questions and judge each answer.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use ragbench_rag::{Judgement, LlmJudge, MetricScores};
use tracing::info;

use super::CorpusArgs;
use crate::context::AppContext;
use crate::records::{self, EvaluationRecord, QuestionRow};

/// Arguments for the evaluate command.
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    #[command(flatten)]
    pub corpus: CorpusArgs,

    /// Questions CSV with `q_id`, `questions` and optional `conversation_id`
    #[arg(long)]
    pub questions: PathBuf,

    /// Output CSV
    #[arg(long, short, default_value = "evaluation.csv")]
    pub output: PathBuf,
}

fn record(row: &QuestionRow, answer: String, judgement: Judgement) -> EvaluationRecord {
    let scores = judgement.scores;
    EvaluationRecord {
        q_id: row.q_id.clone(),
        questions: row.questions.clone(),
        answer,
        faithfulness: scores.faithfulness,
        answer_relevancy: scores.answer_relevancy,
        contextual_precision: scores.contextual_precision,
        contextual_recall: scores.contextual_recall,
        contextual_relevancy: scores.contextual_relevancy,
        degraded: judgement.degraded,
    }
}

/// Mean of each metric over the judgements that were not degraded.
fn means(records: &[EvaluationRecord]) -> Option<[f32; 5]> {
    let judged: Vec<&EvaluationRecord> = records.iter().filter(|r| !r.degraded).collect();
    if judged.is_empty() {
        return None;
    }
    let mut sums = [0.0f32; 5];
    for r in &judged {
        let values = [
            r.faithfulness,
            r.answer_relevancy,
            r.contextual_precision,
            r.contextual_recall,
            r.contextual_relevancy,
        ];
        for (sum, value) in sums.iter_mut().zip(values) {
            *sum += value;
        }
    }
    Some(sums.map(|sum| sum / judged.len() as f32))
}

/// Run the evaluate command.
pub async fn run(args: EvaluateArgs, mut ctx: AppContext) -> Result<()> {
    args.corpus.apply(&mut ctx);
    let questions = records::read_questions(&args.questions)?;
    let rows = questions.rows;
    let (pipeline, _) = ctx.indexed_pipeline(&args.corpus.data_dir).await?;
    let collection = ctx.settings.collection.as_str();
    let judge = LlmJudge::new(ctx.model());

    let mut results = Vec::with_capacity(rows.len());
    for row in &rows {
        let outcome = match &row.conversation_id {
            Some(conversation) => pipeline.ask(collection, conversation, &row.questions).await?,
            None => pipeline.ask_standalone(collection, &row.questions).await,
        };
        let contexts: Vec<String> = outcome.contexts.iter().map(|c| c.chunk.text.clone()).collect();
        let judgement = judge.judge(&row.questions, &outcome.answer, &contexts).await;
        info!(q_id = %row.q_id, degraded = judgement.degraded, "judged answer");
        results.push(record(row, outcome.answer, judgement));
    }

    records::write_records(&args.output, &results)?;
    match means(&results) {
        Some(means) => {
            for (name, mean) in MetricScores::NAMES.iter().zip(means) {
                println!("{name}: {mean:.3}");
            }
        }
        None => println!("No answer could be judged"),
    }
    println!("Wrote {} rows to {}", results.len(), args.output.display());
    if !questions.skipped.is_empty() {
        println!("Skipped {} unusable question rows", questions.skipped.len());
    }
    Ok(())
}
