//! lofi-scheduler: bounded job queue for music generation backends.
//!
//! Reads JSON-RPC requests from stdin and writes responses to stdout. Logs go
//! to stderr.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use lofi_scheduler::cli::Cli;
use lofi_scheduler::models::ModelRegistry;
use lofi_scheduler::rpc::{run_server, ServerState};
use lofi_scheduler::scheduler::Scheduler;

fn main() {
    let cli = Cli::parse_args();
    init_logging(cli.log.as_deref());

    if let Err(e) = run(&cli) {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Log filter precedence: `--log`, then `LOFI_LOG`, then `RUST_LOG`, then
/// `info`.
fn init_logging(flag: Option<&str>) {
    let filter = flag
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_env("LOFI_LOG").ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.scheduler_config();
    let slots = cli
        .model_slots()
        .map_err(|e| anyhow!(e))
        .context("invalid model slot")?;
    let output_dir = cli.output_directory();

    let registry = ModelRegistry::from_model_slots(&slots, &output_dir)
        .context("cannot build model registry")?;
    info!(output_dir = %output_dir.display(), "Preview output directory");

    let scheduler = Arc::new(Scheduler::new(config, registry).context("cannot start scheduler")?);
    let state = ServerState::new(Arc::clone(&scheduler));

    let served = run_server(&state).context("JSON-RPC server failed");
    scheduler.shutdown();
    served
}
