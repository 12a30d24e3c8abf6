use base::{Error, ResultExt};
use bpaf::Bpaf;
use std::path::PathBuf;
use tracing::error;

mod orchestrator;

/// Bridges sports-tracking telemetry from a NATS broker into a Memgraph
/// graph, with time-based TTL retention for ephemeral state.
#[derive(Bpaf, Debug)]
#[bpaf(options, version(env!("CARGO_PKG_VERSION")))]
struct Args {
    /// Path to the TOML configuration file.
    ///
    /// Individual settings can be overridden with `SKG_*` environment
    /// variables; see `graph::config::Config`.
    #[bpaf(long, short, argument("PATH"))]
    config: Option<PathBuf>,
}

fn main() {
    // If using the clock will fail, find out now *before* trying to log
    // anything (with timestamps...) so we can print a helpful error.
    if let Err(e) = nix::time::clock_gettime(nix::time::ClockId::CLOCK_MONOTONIC) {
        eprintln!("clock_gettime failed: {e}\n\nThis indicates a broken environment.");
        std::process::exit(1);
    }

    base::tracing_setup::install();

    let args = args().fallback_to_usage().run();
    tracing::trace!("parsed command-line arguments: {args:#?}");

    match run(args) {
        Err(e) => {
            error!(err = %e.chain(), "exiting due to error");
            std::process::exit(1);
        }
        Ok(rv) => std::process::exit(rv),
    }
}

fn run(args: Args) -> Result<i32, Error> {
    let cfg = graph::Config::load(args.config.as_deref())?;

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    let rt = builder.build().err_kind(base::ErrorKind::Internal)?;

    let r = rt.block_on(orchestrator::async_run(cfg));
    rt.shutdown_background();
    r
}

#[cfg(test)]
mod tests {
    #[test]
    fn bpaf_invariants() {
        super::args().check_invariants(false);
    }
}
