//! CLI command handlers.

use std::path::PathBuf;

use clap::Args;

pub mod ask;
pub mod chat;
pub mod compare;
pub mod evaluate;
pub mod index;
pub mod posts;
pub mod research;

/// Corpus and collection shared by the indexing commands.
#[derive(Args, Debug, Clone)]
pub struct CorpusArgs {
    /// Directory of `*.txt` documents
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Collection name, overriding the configuration
    #[arg(long)]
    pub collection: Option<String>,
}

impl CorpusArgs {
    /// Apply the collection override to `ctx`.
    pub fn apply(&self, ctx: &mut crate::context::AppContext) {
        if let Some(collection) = &self.collection {
            ctx.settings.collection = collection.clone();
        }
    }
}
