//! # ProcessSpawner: worker units backed by child processes.
//!
//! Each worker is an instance of the worker executable (see
//! [`serve_stdio`](super::serve_stdio)) talking length-delimited bincode over
//! its stdin/stdout. Stderr is inherited so worker logs land next to ours.
//!
//! ```text
//! WorkerChannel ──► writer task ──► child stdin
//! child stdout  ──► reader task ──► WorkerEvent::Response
//!                        │
//!            kill token / EOF / bad frame
//!                        └──► start_kill() → wait() → WorkerEvent::Exited
//! ```

use std::path::PathBuf;
use std::process::Stdio;

use futures::{SinkExt, StreamExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Network;

use super::channel::{Spawn, WorkerChannel, WorkerEvent};
use super::protocol::{self, JobRequest, JobResponse, WorkerId};

/// Environment variable carrying the network name to process workers.
pub const NETWORK_ENV: &str = "WORKVISOR_NETWORK";

/// Environment variable carrying the worker identity to process workers.
pub const WORKER_ID_ENV: &str = "WORKVISOR_WORKER_ID";

/// Starts child-process workers.
#[derive(Clone, Debug)]
pub struct ProcessSpawner {
    program: PathBuf,
    args: Vec<String>,
    network: Network,
}

impl ProcessSpawner {
    /// Creates a spawner running `program` for every worker.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            network: Network::default(),
        }
    }

    /// Extra command-line arguments for the worker executable.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Network name forwarded through [`NETWORK_ENV`].
    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }
}

impl Spawn for ProcessSpawner {
    fn spawn(
        &self,
        id: WorkerId,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> std::io::Result<WorkerChannel> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env(NETWORK_ENV, self.network.as_str())
            .env(WORKER_ID_ENV, id.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("worker stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("worker stdout not captured"))?;
        debug!(worker = id, pid = ?child.id(), program = %self.program.display(), "worker process started");

        let (tx, mut rx) = mpsc::unbounded_channel::<JobRequest>();
        let kill = CancellationToken::new();

        let mut sink = FramedWrite::new(stdin, protocol::codec());
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let frame = match protocol::encode(&request) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(worker = id, error = %e, "request encoding failed");
                        break;
                    }
                };
                if let Err(e) = sink.send(frame).await {
                    debug!(worker = id, error = %e, "worker stdin closed");
                    break;
                }
            }
        });

        let mut stream = FramedRead::new(stdout, protocol::codec());
        let token = kill.clone();
        tokio::spawn(async move {
            let reason = loop {
                tokio::select! {
                    _ = token.cancelled() => break "killed".to_string(),
                    frame = stream.next() => match frame {
                        Some(Ok(bytes)) => match protocol::decode::<JobResponse>(&bytes) {
                            Ok(response) => {
                                let _ = events.send(WorkerEvent::Response { worker: id, response });
                            }
                            Err(e) => break format!("undecodable response: {e}"),
                        },
                        Some(Err(e)) => break format!("read failed: {e}"),
                        None => break "stdout closed".to_string(),
                    },
                }
            };

            let _ = child.start_kill();
            let reason = match child.wait().await {
                Ok(status) => format!("{reason} ({status})"),
                Err(e) => format!("{reason} (wait failed: {e})"),
            };
            let _ = events.send(WorkerEvent::Exited { worker: id, reason });
        });

        Ok(WorkerChannel::new(id, tx, kill))
    }
}
