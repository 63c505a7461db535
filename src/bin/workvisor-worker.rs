//! Worker executable for [`ProcessSpawner`](workvisor::ProcessSpawner).
//!
//! Speaks the length-delimited bincode protocol on stdin/stdout and logs to
//! stderr (filter with `RUST_LOG`). Transaction jobs need a backend, which
//! only an embedding binary can provide; this one serves the crypto jobs.

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use workvisor::JobRegistry;
use workvisor::worker::{NETWORK_ENV, WORKER_ID_ENV, serve_stdio};

#[tokio::main(flavor = "current_thread")]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let network = std::env::var(NETWORK_ENV).unwrap_or_else(|_| "main".into());
    let worker = std::env::var(WORKER_ID_ENV).unwrap_or_else(|_| "-".into());
    info!(%network, %worker, "worker started");

    match serve_stdio(JobRegistry::new()).await {
        Ok(()) => {
            info!(%worker, "input closed; exiting");
            std::process::ExitCode::SUCCESS
        }
        Err(e) => {
            error!(%worker, error = %e, label = e.as_label(), "worker failed");
            std::process::ExitCode::FAILURE
        }
    }
}
