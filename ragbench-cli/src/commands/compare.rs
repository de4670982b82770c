//! Compare-chunking command - score chunking strategies with a lexical
//! baseline, no services required.
//!
//! The `score` column is a local character-overlap score, not a remote
//! grading metric.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use ragbench_rag::{
    Chunk, Chunker, FixedSizeChunker, OverlapFormula, ParagraphChunker, SlidingWindowChunker,
    best_match,
};
use tracing::{debug, info};

use crate::context::{AppContext, read_corpus};
use crate::records::{self, ChunkingRecord, QuestionRow};

/// Arguments for the compare-chunking command.
#[derive(Args, Debug)]
pub struct CompareArgs {
    /// Directory of `*.txt` documents
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Questions CSV with `q_id` and `questions`
    #[arg(long)]
    pub questions: PathBuf,

    /// Output CSV
    #[arg(long, short, default_value = "chunking_comparison.csv")]
    pub output: PathBuf,

    /// Characters per fixed-size chunk
    #[arg(long, default_value_t = 500)]
    pub fixed_size: usize,

    /// Characters per sliding window
    #[arg(long, default_value_t = 500)]
    pub window_size: usize,

    /// Characters shared by consecutive windows
    #[arg(long, default_value_t = 250)]
    pub window_overlap: usize,

    /// Local character-overlap formula for the `score` column (no remote grading)
    #[arg(long, value_enum, default_value_t = Formula::QueryCoverage)]
    pub formula: Formula,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
pub enum Formula {
    QueryCoverage,
    Jaccard,
}

impl From<Formula> for OverlapFormula {
    fn from(formula: Formula) -> Self {
        match formula {
            Formula::QueryCoverage => Self::QueryCoverage,
            Formula::Jaccard => Self::Jaccard,
        }
    }
}

/// Best chunk per question and method, with the score summed per method.
pub fn compare(
    rows: &[QuestionRow],
    methods: &[(String, Vec<Chunk>)],
    formula: OverlapFormula,
) -> (Vec<ChunkingRecord>, BTreeMap<String, f32>) {
    let mut results = Vec::new();
    let mut totals: BTreeMap<String, f32> = BTreeMap::new();
    for row in rows {
        for (method, chunks) in methods {
            let Some((index, score)) = best_match(&row.questions, chunks, formula) else {
                debug!(q_id = %row.q_id, method = %method, "no non-empty chunk");
                continue;
            };
            let chunk = &chunks[index];
            *totals.entry(method.clone()).or_default() += score;
            results.push(ChunkingRecord {
                id: format!("{}_{}", row.q_id, method),
                q_id: row.q_id.clone(),
                method: method.clone(),
                retrieve_text: records::excerpt(&chunk.text),
                score,
                source: chunk.source.to_string(),
            });
        }
    }
    (results, totals)
}

/// The method with the highest total; the first listed wins ties.
pub fn best_method(
    methods: &[(String, Vec<Chunk>)],
    totals: &BTreeMap<String, f32>,
) -> Option<String> {
    let mut best: Option<(&str, f32)> = None;
    for (method, _) in methods {
        let total = totals.get(method).copied().unwrap_or_default();
        if best.is_none_or(|(_, top)| total > top) {
            best = Some((method.as_str(), total));
        }
    }
    best.map(|(method, _)| method.to_string())
}

/// Run the compare-chunking command.
pub async fn run(args: CompareArgs, _ctx: AppContext) -> Result<()> {
    let questions = records::read_questions(&args.questions)?;
    let rows = questions.rows;
    let documents = read_corpus(&args.data_dir).await?;

    let chunkers: Vec<Arc<dyn Chunker>> = vec![
        Arc::new(FixedSizeChunker::new(args.fixed_size)?),
        Arc::new(SlidingWindowChunker::new(args.window_size, args.window_overlap)?),
        Arc::new(ParagraphChunker),
    ];
    let methods: Vec<(String, Vec<Chunk>)> = chunkers
        .iter()
        .map(|chunker| {
            let chunks: Vec<Chunk> = documents.iter().flat_map(|d| chunker.chunk(d)).collect();
            info!(method = chunker.name(), chunks = chunks.len(), "chunked corpus");
            (chunker.name().to_string(), chunks)
        })
        .collect();

    let (results, totals) = compare(&rows, &methods, args.formula.into());
    records::write_records(&args.output, &results)?;

    for (method, total) in &totals {
        println!("{method}: total overlap score {total:.3}");
    }
    if let Some(best) = best_method(&methods, &totals) {
        println!("Best chunking method: {best}");
    }
    println!("Wrote {} rows to {}", results.len(), args.output.display());
    if !questions.skipped.is_empty() {
        println!("Skipped {} unusable question rows", questions.skipped.len());
    }
    Ok(())
}
