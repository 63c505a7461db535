//! # Worker side of the protocol.
//!
//! [`serve`] reads [`JobRequest`] frames, runs each job through the
//! [`JobRegistry`] on the blocking pool and writes back one [`JobResponse`]
//! per request, in arrival order. It returns when the input closes.
//!
//! A panicking job stops the loop with [`WorkerError::JobPanicked`]; the
//! process is expected to exit so the coordinator can replace it.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error};

use crate::error::WorkerError;
use crate::jobs::JobRegistry;

use super::protocol::{self, JobRequest, JobResponse, Outcome};

/// Serves requests from `input` until it closes.
pub async fn serve<R, W>(registry: Arc<JobRegistry>, input: R, output: W) -> Result<(), WorkerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut requests = FramedRead::new(input, protocol::codec());
    let mut responses = FramedWrite::new(output, protocol::codec());

    while let Some(frame) = requests.next().await {
        let JobRequest { id, job } = protocol::decode(&frame?)?;
        let name = job.name();
        debug!(request = id, job = name, "job received");

        let registry = Arc::clone(&registry);
        let outcome = match tokio::task::spawn_blocking(move || registry.execute(job)).await {
            Ok(res) => Outcome::from(res),
            Err(e) => {
                error!(request = id, job = name, error = %e, "job panicked");
                return Err(WorkerError::JobPanicked { job: name });
            }
        };

        responses
            .send(protocol::encode(&JobResponse { id, outcome })?)
            .await?;
    }
    Ok(())
}

/// Serves requests on the process's stdin/stdout.
pub async fn serve_stdio(registry: JobRegistry) -> Result<(), WorkerError> {
    serve(Arc::new(registry), tokio::io::stdin(), tokio::io::stdout()).await
}
