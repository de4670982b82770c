//! Posts command - generate platform posts concurrently.

use std::time::Instant;

use anyhow::Result;
use clap::Args;
use ragbench_rag::{CompletionRequest, FanOut, FanOutResult};

use crate::context::AppContext;

/// Arguments for the posts command.
#[derive(Args, Debug)]
pub struct PostsArgs {
    /// Topic of the posts
    #[arg(required = true)]
    pub topic: String,

    /// Do not echo deltas while generating; only print the joined results
    #[arg(long)]
    pub no_stream: bool,

    /// Sampling temperature
    #[arg(long, default_value_t = 0.7)]
    pub temperature: f32,
}

fn fan_out(ctx: &AppContext, args: &PostsArgs) -> FanOut {
    let platform = |name: &str, style: &str| {
        CompletionRequest::with_system(
            format!("You write {name} posts. {style}"),
            format!("Write a post about: {}", args.topic),
            args.temperature,
        )
    };
    FanOut::new(ctx.model())
        .with_task(
            "linkedin",
            platform("LinkedIn", "Keep a professional tone and end with a question."),
        )
        .with_task(
            "instagram",
            platform("Instagram", "Keep it short and casual with a few hashtags."),
        )
}

/// Run every generation once, echoing deltas as they arrive when `echo`.
async fn generate(fan_out: &FanOut, echo: bool) -> Vec<FanOutResult> {
    if !echo {
        return fan_out.join().await;
    }
    fan_out
        .join_with(|event| match &event.delta {
            Ok(delta) => println!("{{'{}': {:?}}}", event.label, delta),
            Err(e) => eprintln!("{} failed: {e}", event.label),
        })
        .await
}

/// Run the posts command.
pub async fn run(args: PostsArgs, ctx: AppContext) -> Result<()> {
    let fan_out = fan_out(&ctx, &args);

    let started = Instant::now();
    let results = generate(&fan_out, !args.no_stream).await;
    println!("Generated {} posts in {:.2?}", results.len(), started.elapsed());
    for result in results {
        println!("\n== {} ==", result.label);
        match result.error {
            Some(error) if result.text.is_empty() => println!("(failed: {error})"),
            _ => println!("{}", result.text),
        }
    }
    Ok(())
}
