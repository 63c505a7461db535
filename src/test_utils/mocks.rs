//! In-memory [`TransactionBackend`] for tests.

use crate::jobs::{InputSignature, TransactionBackend};

/// Backend that treats every transaction as having a fixed number of inputs,
/// all owned by [`StubBackend::OWNER`].
///
/// - `verify` → `true` for any non-empty transaction
/// - `verify_input` → `true` iff the index is in range
/// - `sign_input` with `OWNER` → script `[index, sighash]`, otherwise `None`
#[derive(Debug, Clone)]
pub struct StubBackend {
    inputs: u32,
}

impl StubBackend {
    /// The only key that can sign.
    pub const OWNER: [u8; 32] = [0x42; 32];

    /// Creates a backend whose transactions have `inputs` inputs.
    #[must_use]
    pub fn new(inputs: u32) -> Self {
        Self { inputs }
    }
}

impl TransactionBackend for StubBackend {
    fn input_count(&self, _tx: &[u8]) -> anyhow::Result<u32> {
        Ok(self.inputs)
    }

    fn verify(&self, tx: &[u8], _flags: u32) -> anyhow::Result<bool> {
        anyhow::ensure!(!tx.is_empty(), "empty transaction");
        Ok(true)
    }

    fn verify_input(&self, tx: &[u8], index: u32, _flags: u32) -> anyhow::Result<bool> {
        anyhow::ensure!(!tx.is_empty(), "empty transaction");
        Ok(index < self.inputs)
    }

    fn sign_input(
        &self,
        _tx: &[u8],
        index: u32,
        key: &[u8],
        sighash: u32,
    ) -> anyhow::Result<Option<InputSignature>> {
        if index >= self.inputs || key != Self::OWNER {
            return Ok(None);
        }
        Ok(Some(InputSignature {
            script: vec![index as u8, sighash as u8],
            witness: Vec::new(),
        }))
    }
}
