//! Collaborators built from [`Settings`], shared by the commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use ragbench_rag::http::{
    ChatCompletionClient, EmbeddingServiceClient, HttpTransport, SearxngClient,
    SimilarityServiceClient,
};
use ragbench_rag::qdrant::QdrantVectorStore;
use ragbench_rag::{
    AnswerCache, CompletionModel, ContentGuard, Document, InMemoryAnswerCache, InMemoryVectorStore,
    IndexReport, InjectionPatternGuard, LlmContentGuard, MaxEntries, RagPipeline, ScorerReranker,
    VectorStore, WebSearch, discover_text_files, load_documents,
};
use tracing::{info, warn};

use crate::settings::{GuardMode, Settings};

/// Settings plus the HTTP transport and chat model every command uses.
pub struct AppContext {
    pub settings: Settings,
    transport: Arc<HttpTransport>,
    model: Arc<dyn CompletionModel>,
}

impl AppContext {
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let transport = Arc::new(HttpTransport::new(settings.services.retry.clone())?);
        let model: Arc<dyn CompletionModel> =
            Arc::new(ChatCompletionClient::from_config(transport.clone(), &settings.services));
        Ok(Self { settings, transport, model })
    }

    /// The configured chat model.
    pub fn model(&self) -> Arc<dyn CompletionModel> {
        self.model.clone()
    }

    /// An answer cache honouring `cache_max_entries`.
    pub fn answer_cache(&self) -> Arc<dyn AnswerCache> {
        let cache: Arc<dyn AnswerCache> = match self.settings.cache_max_entries {
            Some(n) => Arc::new(InMemoryAnswerCache::with_policy(MaxEntries(n))),
            None => Arc::new(InMemoryAnswerCache::new()),
        };
        cache
    }

    /// The web search client; fails when no search URL is configured.
    pub fn web_search(&self) -> Result<Arc<dyn WebSearch>> {
        let url = self
            .settings
            .services
            .search_url
            .clone()
            .context("no search URL configured (set search_url or RAGBENCH_SEARCH_URL)")?;
        Ok(Arc::new(
            SearxngClient::new(self.transport.clone(), url)
                .with_language(self.settings.search_language.clone()),
        ))
    }

    fn vector_store(&self) -> Result<Arc<dyn VectorStore>> {
        let store: Arc<dyn VectorStore> = match &self.settings.services.qdrant_url {
            Some(url) => {
                info!(url = %url, "using qdrant vector store");
                Arc::new(QdrantVectorStore::new(url)?)
            }
            None => Arc::new(InMemoryVectorStore::new()),
        };
        Ok(store)
    }

    fn content_guard(&self) -> Option<Arc<dyn ContentGuard>> {
        let guard: Arc<dyn ContentGuard> = match self.settings.guard {
            GuardMode::None => return None,
            GuardMode::Patterns => Arc::new(InjectionPatternGuard::default()),
            GuardMode::Llm => Arc::new(LlmContentGuard::new(self.model())),
        };
        Some(guard)
    }

    /// Assemble the retrieval pipeline.
    pub fn pipeline(&self) -> Result<RagPipeline> {
        let services = &self.settings.services;
        let mut builder = RagPipeline::builder()
            .config(self.settings.rag.clone())
            .embedding_provider(Arc::new(EmbeddingServiceClient::from_config(
                self.transport.clone(),
                services,
            )))
            .vector_store(self.vector_store()?)
            .completion_model(self.model());

        if let Some(url) = &services.similarity_url {
            let scorer = SimilarityServiceClient::new(self.transport.clone(), url.clone());
            builder = builder.reranker(Arc::new(ScorerReranker::new(Arc::new(scorer))));
        }
        if let Some(guard) = self.content_guard() {
            builder = builder.content_guard(guard);
        }
        if self.settings.cache_answers {
            builder = builder.answer_cache(self.answer_cache());
        }
        Ok(builder.build()?)
    }

    /// A pipeline with `data_dir` indexed into the configured collection.
    pub async fn indexed_pipeline(&self, data_dir: &Path) -> Result<(RagPipeline, IndexReport)> {
        let pipeline = self.pipeline()?;
        let documents = read_corpus(data_dir).await?;
        let report = pipeline.index(&self.settings.collection, &documents).await?;
        Ok((pipeline, report))
    }
}

/// Load every `*.txt` file under `data_dir`, warning about unreadable ones.
pub async fn read_corpus(data_dir: &Path) -> Result<Vec<Document>> {
    let paths = discover_text_files(data_dir)
        .await
        .with_context(|| format!("failed to list {}", data_dir.display()))?;
    anyhow::ensure!(!paths.is_empty(), "no .txt files found in {}", data_dir.display());
    let report = load_documents(&paths).await;
    for (path, reason) in &report.skipped {
        warn!(path = %path.display(), reason = %reason, "skipped unreadable file");
    }
    info!(documents = report.documents.len(), skipped = report.skipped.len(), "loaded corpus");
    Ok(report.documents)
}
