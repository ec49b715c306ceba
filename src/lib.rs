pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod process;
pub mod state;
pub mod store;
pub mod tasks;

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// How long to wait for blocked stdin reads once the console is done.
const RUNTIME_SHUTDOWN: Duration = Duration::from_millis(500);

pub fn run() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    setup_tracing(&args.log_level);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(cli::run(args));
    // The stdin reader sits on a blocking thread and would otherwise keep
    // the runtime alive until the next keypress.
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN);
    result
}

fn setup_tracing(default_level: &str) {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
