//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `info` (or `debug` with `verbose`)
/// for the ragbench crates and `warn` for everything else. Logs go to
/// stderr so command output on stdout stays clean.
pub fn init(verbose: bool, json: bool) {
    let default = if verbose {
        "ragbench=debug,ragbench_rag=debug,warn"
    } else {
        "ragbench=info,ragbench_rag=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        let layer =
            tracing_subscriber::fmt::layer().with_target(verbose).with_writer(std::io::stderr);
        registry.with(layer).init();
    }
}
