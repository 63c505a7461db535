//! # Wire protocol between the coordinator and a worker.
//!
//! Frames are length-delimited (`u32` big-endian length prefix) and carry one
//! bincode-encoded message each.
//!
//! ```text
//! coordinator ── JobRequest { id, job } ──────────────► worker
//! coordinator ◄────────────── JobResponse { id, outcome } ── worker
//! ```
//!
//! ## Rules
//! - The request `id` is the sole correlation key; responses may arrive in any order.
//! - A response whose `id` matches nothing outstanding is discarded by the coordinator.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::codec::LengthDelimitedCodec;

use crate::jobs::{Job, JobOutput};

/// Identity of a worker unit within one pool.
pub type WorkerId = u64;

/// Identity of one dispatch within one pool.
pub type RequestId = u64;

/// Largest accepted frame (raw transactions and header templates fit easily).
pub const MAX_FRAME_LEN: usize = 32 * 1024 * 1024;

/// Coordinator → worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub id: RequestId,
    pub job: Job,
}

/// Job result as reported by the worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Success(JobOutput),
    Failure(String),
}

impl From<Result<JobOutput, String>> for Outcome {
    fn from(res: Result<JobOutput, String>) -> Self {
        match res {
            Ok(out) => Outcome::Success(out),
            Err(msg) => Outcome::Failure(msg),
        }
    }
}

/// Worker → coordinator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResponse {
    pub id: RequestId,
    pub outcome: Outcome,
}

/// Builds the frame codec used on both ends.
pub fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LEN)
        .new_codec()
}

/// Encodes one message into a frame payload.
pub fn encode<T: Serialize>(msg: &T) -> Result<Bytes, bincode::Error> {
    bincode::serialize(msg).map(Bytes::from)
}

/// Decodes one frame payload.
pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> Result<T, bincode::Error> {
    bincode::deserialize(frame)
}
