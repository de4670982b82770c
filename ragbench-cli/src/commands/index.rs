//! Index command - chunk, embed and store a corpus.

use anyhow::Result;
use clap::Args;

use super::CorpusArgs;
use crate::context::AppContext;

/// Arguments for the index command.
#[derive(Args, Debug)]
pub struct IndexArgs {
    #[command(flatten)]
    pub corpus: CorpusArgs,
}

/// Run the index command.
pub async fn run(args: IndexArgs, mut ctx: AppContext) -> Result<()> {
    args.corpus.apply(&mut ctx);
    let (_, report) = ctx.indexed_pipeline(&args.corpus.data_dir).await?;

    println!(
        "Indexed {} documents ({} chunks) into '{}'",
        report.documents_indexed, report.chunks_indexed, ctx.settings.collection
    );
    for (id, reason) in &report.skipped {
        println!("  skipped {id}: {reason}");
    }
    for (id, reason) in &report.withheld {
        println!("  withheld {id}: {reason}");
    }
    Ok(())
}
