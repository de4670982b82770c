//! Concurrent generation of several labelled completions.
//!
//! Each request streams independently; [`FanOut::stream`] interleaves the
//! deltas as they arrive and [`FanOut::join`] waits for every text.
//! [`FanOut::join_with`] does both from a single run of each request.

use std::sync::Arc;

use futures::future::join_all;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use tracing::{debug, warn};

use crate::completion::{CompletionModel, CompletionRequest};
use crate::error::RagError;

/// One delta from one of the fanned-out generations.
#[derive(Debug)]
pub struct FanOutEvent {
    /// Position of the generation in the order it was added.
    pub index: usize,
    /// Label of the generation.
    pub label: String,
    /// The text delta, or the error that ended the generation.
    pub delta: Result<String, RagError>,
}

/// The collected text of one generation.
#[derive(Debug, Clone, Serialize)]
pub struct FanOutResult {
    /// Label of the generation.
    pub label: String,
    /// Text received before the generation ended.
    pub text: String,
    /// Set if the generation failed.
    pub error: Option<String>,
}

/// Labelled completion requests run concurrently against one model.
pub struct FanOut {
    model: Arc<dyn CompletionModel>,
    tasks: Vec<(String, CompletionRequest)>,
}

impl FanOut {
    /// Create an empty fan-out over `model`.
    pub fn new(model: Arc<dyn CompletionModel>) -> Self {
        Self { model, tasks: Vec::new() }
    }

    /// Add a labelled request.
    pub fn with_task(mut self, label: impl Into<String>, request: CompletionRequest) -> Self {
        self.tasks.push((label.into(), request));
        self
    }

    /// Number of requests.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no request was added.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Start every generation and interleave their deltas.
    ///
    /// A generation that fails to start contributes a single error event.
    pub async fn stream(&self) -> BoxStream<'static, FanOutEvent> {
        let started = join_all(
            self.tasks.iter().map(|(_, request)| self.model.stream(request.clone())),
        )
        .await;

        let streams = started.into_iter().zip(&self.tasks).enumerate().map(
            |(index, (result, (label, _)))| {
                let label = label.clone();
                match result {
                    Ok(deltas) => deltas
                        .map(move |delta| FanOutEvent { index, label: label.clone(), delta })
                        .boxed(),
                    Err(e) => {
                        warn!(label = %label, error = %e, "generation failed to start");
                        stream::once(async move { FanOutEvent { index, label, delta: Err(e) } })
                            .boxed()
                    }
                }
            },
        );
        stream::select_all(streams).boxed()
    }

    /// Run every generation to completion, results in the order added.
    pub async fn join(&self) -> Vec<FanOutResult> {
        self.join_with(|_| {}).await
    }

    /// Like [`join`](Self::join), handing each event to `on_event` as it
    /// arrives. Every request is sent once.
    pub async fn join_with<F>(&self, mut on_event: F) -> Vec<FanOutResult>
    where
        F: FnMut(&FanOutEvent),
    {
        let mut results: Vec<FanOutResult> = self
            .tasks
            .iter()
            .map(|(label, _)| FanOutResult {
                label: label.clone(),
                text: String::new(),
                error: None,
            })
            .collect();

        let mut events = self.stream().await;
        while let Some(event) = events.next().await {
            on_event(&event);
            let result = &mut results[event.index];
            match event.delta {
                Ok(delta) => result.text.push_str(&delta),
                Err(e) => result.error = Some(e.to_string()),
            }
        }
        debug!(generations = results.len(), "fan-out finished");
        results
    }
}
