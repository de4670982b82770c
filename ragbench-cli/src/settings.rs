//! Layered configuration: TOML file, then environment, then flags.
//!
//! `.env` is loaded before the command line is parsed, so variables it
//! defines count as environment. Flags and `RAGBENCH_*` variables share one
//! [`ServiceOverrides`] definition; clap prefers a flag over its variable.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use ragbench_rag::{RagConfig, ServiceConfig};
use serde::Deserialize;
use tracing::debug;

/// File read when `--config` is not given, if it exists.
pub const DEFAULT_CONFIG_FILE: &str = "ragbench.toml";

/// Which content guard screens documents before indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardMode {
    /// Index everything.
    None,
    /// Reject documents containing known injection phrases.
    #[default]
    Patterns,
    /// Ask the chat model to classify each document.
    Llm,
}

/// Everything the commands need to build their collaborators.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Vector store collection name.
    pub collection: String,
    pub rag: RagConfig,
    pub services: ServiceConfig,
    pub guard: GuardMode,
    /// Cache answers by question text.
    pub cache_answers: bool,
    /// Bound on cached answers; unbounded when unset.
    pub cache_max_entries: Option<usize>,
    /// Language sent to the web search service.
    pub search_language: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            collection: "ragbench".to_string(),
            rag: RagConfig::default(),
            services: ServiceConfig::default(),
            guard: GuardMode::default(),
            cache_answers: false,
            cache_max_entries: None,
            search_language: "en".to_string(),
        }
    }
}

/// Service endpoints settable from the environment or the command line.
#[derive(Args, Debug, Clone, Default)]
pub struct ServiceOverrides {
    /// Bearer token for the chat endpoint
    #[arg(long, global = true, env = "RAGBENCH_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Embedding service URL
    #[arg(long, global = true, env = "RAGBENCH_EMBED_URL")]
    pub embed_url: Option<String>,

    /// Chat completions URL
    #[arg(long, global = true, env = "RAGBENCH_CHAT_URL")]
    pub chat_url: Option<String>,

    /// Chat model name
    #[arg(long, global = true, env = "RAGBENCH_CHAT_MODEL")]
    pub chat_model: Option<String>,

    /// Similarity (rerank) service URL
    #[arg(long, global = true, env = "RAGBENCH_SIMILARITY_URL")]
    pub similarity_url: Option<String>,

    /// Qdrant gRPC URL; the in-memory store is used when unset
    #[arg(long, global = true, env = "RAGBENCH_QDRANT_URL")]
    pub qdrant_url: Option<String>,

    /// SearXNG search URL
    #[arg(long, global = true, env = "RAGBENCH_SEARCH_URL")]
    pub search_url: Option<String>,
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid configuration file")
    }

    /// Read `path`, or [`DEFAULT_CONFIG_FILE`] when present, or use defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.is_file()),
        };
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                debug!(path = %path.display(), "loaded configuration file");
                Self::from_toml(&text).with_context(|| format!("in {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Overlay values from the environment or flags.
    pub fn apply(&mut self, overrides: &ServiceOverrides) {
        let services = &mut self.services;
        if let Some(url) = &overrides.embed_url {
            services.embed_url = url.clone();
        }
        if let Some(url) = &overrides.chat_url {
            services.chat_url = url.clone();
        }
        if let Some(model) = &overrides.chat_model {
            services.chat_model = model.clone();
        }
        if overrides.api_key.is_some() {
            services.api_key = overrides.api_key.clone();
        }
        if overrides.similarity_url.is_some() {
            services.similarity_url = overrides.similarity_url.clone();
        }
        if overrides.qdrant_url.is_some() {
            services.qdrant_url = overrides.qdrant_url.clone();
        }
        if overrides.search_url.is_some() {
            services.search_url = overrides.search_url.clone();
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.collection.trim().is_empty(), "collection must not be empty");
        self.rag.validate()?;
        self.services.validate()?;
        if let Some(0) = self.cache_max_entries {
            anyhow::bail!("cache_max_entries must be greater than zero");
        }
        Ok(())
    }
}
