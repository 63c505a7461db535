//! # Job model: the fixed set of worker-executable functions.
//!
//! A [`Job`] names one function of the registry and carries its ordered
//! arguments; a [`JobOutput`] carries its result. Both are plain serde data so
//! they can cross a process boundary unchanged.
//!
//! | job           | args                                      | output                         |
//! |---------------|-------------------------------------------|--------------------------------|
//! | `verify`      | tx, flags                                 | `Bool`                         |
//! | `verifyInput` | tx, index, flags                          | `Bool`                         |
//! | `sign`        | tx, rings, sighash                        | `Signed`                       |
//! | `signInput`   | tx, index, key, sighash                   | `InputSigned`                  |
//! | `ecVerify`    | msg, sig, key                             | `Bool`                         |
//! | `ecSign`      | msg, key                                  | `Signature`                    |
//! | `mine`        | header, target, start, end                | `Nonce`                        |
//! | `scrypt`      | passwd, salt, n, r, p, len                | `Key`                          |

use serde::{Deserialize, Serialize};

/// Names of every registered job, in table order.
pub const JOB_NAMES: [&str; 8] = [
    "verify",
    "verifyInput",
    "sign",
    "signInput",
    "ecVerify",
    "ecSign",
    "mine",
    "scrypt",
];

/// One unit of offloadable work.
///
/// Transactions travel as their raw serialization; the transaction backend
/// owns the format.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Job {
    Verify {
        tx: Vec<u8>,
        flags: u32,
    },
    VerifyInput {
        tx: Vec<u8>,
        index: u32,
        flags: u32,
    },
    Sign {
        tx: Vec<u8>,
        rings: Vec<KeyRing>,
        sighash: u32,
    },
    SignInput {
        tx: Vec<u8>,
        index: u32,
        key: Vec<u8>,
        sighash: u32,
    },
    EcVerify {
        msg: Vec<u8>,
        sig: Vec<u8>,
        key: Vec<u8>,
    },
    EcSign {
        msg: Vec<u8>,
        key: Vec<u8>,
    },
    Mine {
        header: Vec<u8>,
        target: [u8; 32],
        start: u32,
        end: u32,
    },
    Scrypt {
        passwd: Vec<u8>,
        salt: Vec<u8>,
        n: u64,
        r: u32,
        p: u32,
        len: usize,
    },
}

impl Job {
    /// Returns the registry name of this job.
    pub fn name(&self) -> &'static str {
        match self {
            Job::Verify { .. } => "verify",
            Job::VerifyInput { .. } => "verifyInput",
            Job::Sign { .. } => "sign",
            Job::SignInput { .. } => "signInput",
            Job::EcVerify { .. } => "ecVerify",
            Job::EcSign { .. } => "ecSign",
            Job::Mine { .. } => "mine",
            Job::Scrypt { .. } => "scrypt",
        }
    }
}

/// Signing material for one key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRing {
    /// 32-byte secret key.
    pub private_key: Vec<u8>,
}

/// Unlocking data produced for one input.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSignature {
    /// Unlocking script.
    pub script: Vec<u8>,
    /// Witness stack.
    pub witness: Vec<Vec<u8>>,
}

/// Result of signing a whole transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedInputs {
    /// Per-input unlocking data; `None` where no ring could sign.
    pub inputs: Vec<Option<InputSignature>>,
    /// Number of inputs signed.
    pub total: u32,
}

/// Result of one job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutput {
    /// `verify`, `verifyInput`, `ecVerify`.
    Bool(bool),
    /// `sign`.
    Signed(SignedInputs),
    /// `signInput`.
    InputSigned(Option<InputSignature>),
    /// `ecSign` (DER).
    Signature(Vec<u8>),
    /// `mine`; `None` when the range holds no solution.
    Nonce(Option<u32>),
    /// `scrypt`.
    Key(Vec<u8>),
}

impl JobOutput {
    /// `Bool` payload.
    pub fn into_bool(self) -> Option<bool> {
        match self {
            JobOutput::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// `Signed` payload.
    pub fn into_signed(self) -> Option<SignedInputs> {
        match self {
            JobOutput::Signed(v) => Some(v),
            _ => None,
        }
    }

    /// `InputSigned` payload.
    pub fn into_input_signed(self) -> Option<Option<InputSignature>> {
        match self {
            JobOutput::InputSigned(v) => Some(v),
            _ => None,
        }
    }

    /// `Signature` payload.
    pub fn into_signature(self) -> Option<Vec<u8>> {
        match self {
            JobOutput::Signature(v) => Some(v),
            _ => None,
        }
    }

    /// `Nonce` payload.
    pub fn into_nonce(self) -> Option<Option<u32>> {
        match self {
            JobOutput::Nonce(v) => Some(v),
            _ => None,
        }
    }

    /// `Key` payload.
    pub fn into_key(self) -> Option<Vec<u8>> {
        match self {
            JobOutput::Key(v) => Some(v),
            _ => None,
        }
    }
}
