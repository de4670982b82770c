//! CSV input and output rows.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use ragbench_rag::{AnswerStatus, QueryOutcome};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Characters of retrieved text kept in the chunking comparison report.
pub const RETRIEVE_TEXT_CHARS: usize = 200;

/// One question from an input CSV.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuestionRow {
    pub q_id: String,
    /// Rows sharing a conversation id are asked as one session, in file order.
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub questions: String,
}

/// One answered question.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerRecord {
    pub q_id: String,
    pub conversation_id: String,
    pub questions: String,
    pub search_query: String,
    pub answer: String,
    pub source: String,
    pub status: AnswerStatus,
}

impl AnswerRecord {
    pub fn new(row: &QuestionRow, outcome: QueryOutcome) -> Self {
        Self {
            q_id: row.q_id.clone(),
            conversation_id: row.conversation_id.clone().unwrap_or_default(),
            questions: row.questions.clone(),
            search_query: outcome.search_query,
            answer: outcome.answer,
            source: outcome.retrieved_source.map(|id| id.to_string()).unwrap_or_default(),
            status: outcome.status,
        }
    }
}

/// One chunking method's best match for one question.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkingRecord {
    pub id: String,
    pub q_id: String,
    pub method: String,
    pub retrieve_text: String,
    /// Local character-overlap score in `[0, 1]` under the chosen formula.
    /// It is computed offline, not by a remote grading service.
    pub score: f32,
    pub source: String,
}

/// One answered and judged question.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRecord {
    pub q_id: String,
    pub questions: String,
    pub answer: String,
    pub faithfulness: f32,
    pub answer_relevancy: f32,
    pub contextual_precision: f32,
    pub contextual_recall: f32,
    pub contextual_relevancy: f32,
    pub degraded: bool,
}

/// Question rows read from a CSV, plus the rows that were skipped.
#[derive(Debug, Default)]
pub struct QuestionFile {
    pub rows: Vec<QuestionRow>,
    /// Line number and reason for each unusable row.
    pub skipped: Vec<(u64, String)>,
}

/// Read question rows; a leading UTF-8 BOM is ignored.
///
/// Rows that fail to parse or have an empty question are skipped with a
/// warning. Only an unreadable file is an error.
pub fn read_questions(path: &Path) -> Result<QuestionFile> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut file = QuestionFile::default();
    for result in reader.deserialize::<QuestionRow>() {
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or_default();
                warn!(path = %path.display(), line, error = %e, "skipping question row");
                file.skipped.push((line, e.to_string()));
                continue;
            }
        };
        if row.questions.trim().is_empty() {
            warn!(path = %path.display(), q_id = %row.q_id, "skipping row without a question");
            file.skipped.push((0, format!("q_id {} has no question", row.q_id)));
            continue;
        }
        file.rows.push(QuestionRow {
            conversation_id: row.conversation_id.filter(|id| !id.trim().is_empty()),
            ..row
        });
    }
    Ok(file)
}

/// Write `records` as CSV with a UTF-8 BOM, so spreadsheet tools detect the
/// encoding.
pub fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    file.write_all(b"\xEF\xBB\xBF")?;
    let mut writer = csv::Writer::from_writer(file);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Flatten newlines and keep the first [`RETRIEVE_TEXT_CHARS`] characters.
pub fn excerpt(text: &str) -> String {
    text.replace(['\r', '\n'], " ").chars().take(RETRIEVE_TEXT_CHARS).collect()
}
