//! LLM-as-judge scoring of answered questions.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::completion::{CompletionModel, CompletionRequest};

/// Characters of joined context shown to the judge.
pub const JUDGE_CONTEXT_CHARS: usize = 500;

static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[-+]?\d+(?:\.\d+)?").expect("unreachable error: invalid number pattern")
});

/// The five judged metrics, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricScores {
    pub faithfulness: f32,
    pub answer_relevancy: f32,
    pub contextual_precision: f32,
    pub contextual_recall: f32,
    pub contextual_relevancy: f32,
}

impl MetricScores {
    /// Metric names in prompt order.
    pub const NAMES: [&'static str; 5] = [
        "faithfulness",
        "answer_relevancy",
        "contextual_precision",
        "contextual_recall",
        "contextual_relevancy",
    ];

    fn from_values(values: [f32; 5]) -> Self {
        let [
            faithfulness,
            answer_relevancy,
            contextual_precision,
            contextual_recall,
            contextual_relevancy,
        ] = values.map(|v| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) });
        Self {
            faithfulness,
            answer_relevancy,
            contextual_precision,
            contextual_recall,
            contextual_relevancy,
        }
    }

    /// Scores in [`NAMES`](Self::NAMES) order.
    pub fn values(&self) -> [f32; 5] {
        [
            self.faithfulness,
            self.answer_relevancy,
            self.contextual_precision,
            self.contextual_recall,
            self.contextual_relevancy,
        ]
    }
}

/// A judgement, flagged when the judge could not be consulted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Judgement {
    pub scores: MetricScores,
    /// Set when the scores are zeros standing in for a failed judge.
    pub degraded: bool,
}

/// Scores question/answer/context triples with one completion call each.
pub struct LlmJudge {
    model: Arc<dyn CompletionModel>,
}

impl LlmJudge {
    pub fn new(model: Arc<dyn CompletionModel>) -> Self {
        Self { model }
    }

    /// Judge `answer` to `question` given the retrieved `contexts`.
    ///
    /// Fewer than five numbers in the reply, or a failed call, gives zero
    /// scores with `degraded` set.
    pub async fn judge(&self, question: &str, answer: &str, contexts: &[String]) -> Judgement {
        let joined: String = contexts.join("\n").chars().take(JUDGE_CONTEXT_CHARS).collect();
        let prompt = format!(
            "Evaluate the RAG result below. Output only 5 numbers between 0 and 1, separated by \
             commas, in this order:\n{}\nQuestion: {question}\nAnswer: {answer}\nContext: {joined}",
            MetricScores::NAMES.join(",")
        );

        let reply = match self.model.complete(CompletionRequest::user_only(prompt, 0.0)).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "judge call failed");
                return Judgement { scores: MetricScores::default(), degraded: true };
            }
        };
        match parse_scores(&reply) {
            Some(scores) => {
                debug!(?scores, "judged answer");
                Judgement { scores, degraded: false }
            }
            None => {
                warn!(reply = %reply, "judge reply did not contain five scores");
                Judgement { scores: MetricScores::default(), degraded: true }
            }
        }
    }
}

/// Take the first five numbers in `reply`, clamped to `[0, 1]`.
pub fn parse_scores(reply: &str) -> Option<MetricScores> {
    let numbers: Vec<f32> =
        NUMBER.find_iter(reply).filter_map(|m| m.as_str().parse().ok()).take(5).collect();
    let values: [f32; 5] = numbers.try_into().ok()?;
    Some(MetricScores::from_values(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedCompletionModel;

    #[test]
    fn parses_and_clamps() {
        let scores = parse_scores("0.9, 0.85，1.4, -0.2, 0.5").unwrap();
        assert_eq!(scores.values(), [0.9, 0.85, 1.0, 0.0, 0.5]);
        assert!(parse_scores("0.9, 0.8").is_none());
    }

    #[tokio::test]
    async fn judge_truncates_context() {
        let model = Arc::new(ScriptedCompletionModel::new(["Scores: 1, 1, 0.5, 0.5, 0"]));
        let judge = LlmJudge::new(model.clone());
        let context = vec!["字".repeat(JUDGE_CONTEXT_CHARS * 2)];
        let judgement = judge.judge("q", "a", &context).await;
        assert!(!judgement.degraded);
        assert_eq!(judgement.scores.contextual_precision, 0.5);

        let prompt = &model.calls().await[0].messages[0].content;
        assert_eq!(prompt.chars().filter(|&c| c == '字').count(), JUDGE_CONTEXT_CHARS);
    }

    #[tokio::test]
    async fn failures_degrade_to_zero() {
        let judge = LlmJudge::new(Arc::new(ScriptedCompletionModel::failing()));
        let judgement = judge.judge("q", "a", &[]).await;
        assert!(judgement.degraded);
        assert_eq!(judgement.scores, MetricScores::default());

        let judge = LlmJudge::new(Arc::new(ScriptedCompletionModel::new(["looks good"])));
        assert!(judge.judge("q", "a", &[]).await.degraded);
    }
}
