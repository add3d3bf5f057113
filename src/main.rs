use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;

/// Diagnostics go to stderr so stdout stays machine-readable: `--json`
/// emits run statistics there, and `outputs list` is meant to be piped.
/// `-v` turns on the engine's debug spans (blocking mode, per-phase
/// progress); `-q` silences everything but errors. Otherwise RUST_LOG
/// applies, defaulting to the engine's fallback warnings (prefix
/// blocking, synthetic dates, dropped columns), which are the ones a
/// data owner should not miss.
fn init_logging(cli: &cli::Cli) {
    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => EnvFilter::new("debug"),
        (false, true) => EnvFilter::new("error"),
        (false, false) => {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    init_logging(&cli);
    cli::run_with(cli)
}
