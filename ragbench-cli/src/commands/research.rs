//! Research command - answer a question from web searches.

use anyhow::Result;
use clap::Args;
use ragbench_rag::ResearchAgent;
use ragbench_rag::research::DEFAULT_MAX_LOOPS;

use crate::context::AppContext;

/// Arguments for the research command.
#[derive(Args, Debug)]
pub struct ResearchArgs {
    /// The question to research
    #[arg(required = true)]
    pub question: String,

    /// Maximum search rounds before answering
    #[arg(long, default_value_t = DEFAULT_MAX_LOOPS)]
    pub max_loops: usize,

    /// Results kept from each search
    #[arg(long, default_value_t = 1)]
    pub results: usize,
}

/// Run the research command.
pub async fn run(args: ResearchArgs, ctx: AppContext) -> Result<()> {
    let agent = ResearchAgent::new(ctx.model(), ctx.web_search()?, ctx.answer_cache())
        .with_max_loops(args.max_loops)
        .with_results_per_search(args.results);

    let outcome = agent.run(&args.question).await;
    for (i, query) in outcome.queries.iter().enumerate() {
        println!("search {}: {query}", i + 1);
    }
    if outcome.answer.is_empty() {
        anyhow::bail!("no answer could be generated");
    }
    println!("\n{}", outcome.answer);
    Ok(())
}
