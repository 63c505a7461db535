//! # Transaction backend: the script engine behind the transaction jobs.
//!
//! Validation rules and signature-hash construction belong to the node's
//! transaction layer, not to the worker runtime. The registry only marshals
//! arguments and results; a [`TransactionBackend`] does the actual work.

use crate::jobs::job::{InputSignature, KeyRing, SignedInputs};

/// Script verification and signing for raw transactions.
///
/// Implementations must be pure: same inputs, same outputs, no shared state.
pub trait TransactionBackend: Send + Sync + 'static {
    /// Number of inputs in `tx`.
    fn input_count(&self, tx: &[u8]) -> anyhow::Result<u32>;

    /// Verifies every input of `tx` under `flags`.
    fn verify(&self, tx: &[u8], flags: u32) -> anyhow::Result<bool>;

    /// Verifies input `index` of `tx` under `flags`.
    fn verify_input(&self, tx: &[u8], index: u32, flags: u32) -> anyhow::Result<bool>;

    /// Signs input `index` with `key`; `None` when the key does not own the input.
    fn sign_input(
        &self,
        tx: &[u8],
        index: u32,
        key: &[u8],
        sighash: u32,
    ) -> anyhow::Result<Option<InputSignature>>;

    /// Signs every input any of `rings` can sign.
    ///
    /// The provided implementation tries each ring against each input through
    /// [`sign_input`](Self::sign_input), first match wins.
    fn sign(&self, tx: &[u8], rings: &[KeyRing], sighash: u32) -> anyhow::Result<SignedInputs> {
        let count = self.input_count(tx)?;
        let mut signed = SignedInputs::default();
        for index in 0..count {
            let mut input = None;
            for ring in rings {
                if let Some(sig) = self.sign_input(tx, index, &ring.private_key, sighash)? {
                    input = Some(sig);
                    break;
                }
            }
            if input.is_some() {
                signed.total += 1;
            }
            signed.inputs.push(input);
        }
        Ok(signed)
    }
}
