//! Pure CPU-bound functions behind `ecVerify`, `ecSign`, `mine` and `scrypt`.
//!
//! None of them touch state outside their arguments, which is what makes
//! running them in another process safe.

use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};

/// Byte offset of the little-endian nonce inside a block header.
pub const NONCE_OFFSET: usize = 76;

/// Minimum length of a header template.
pub const HEADER_SIZE: usize = 80;

/// Verifies a DER-encoded ECDSA signature over a 32-byte digest.
///
/// Malformed inputs verify as `false`. High-S signatures are normalized first.
pub fn ec_verify(msg: &[u8], sig: &[u8], key: &[u8]) -> bool {
    let Ok(msg) = Message::from_digest_slice(msg) else {
        return false;
    };
    let Ok(mut sig) = Signature::from_der(sig) else {
        return false;
    };
    let Ok(key) = PublicKey::from_slice(key) else {
        return false;
    };
    sig.normalize_s();
    Secp256k1::verification_only()
        .verify_ecdsa(&msg, &sig, &key)
        .is_ok()
}

/// Signs a 32-byte digest, returning a DER-encoded low-S signature.
pub fn ec_sign(msg: &[u8], key: &[u8]) -> Result<Vec<u8>, secp256k1::Error> {
    let msg = Message::from_digest_slice(msg)?;
    let key = SecretKey::from_slice(key)?;
    let sig = Secp256k1::signing_only().sign_ecdsa(&msg, &key);
    Ok(sig.serialize_der().to_vec())
}

/// Double SHA-256.
pub fn hash256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}

/// Nonces hashed between two checks of the stop flag in [`mine_until`].
const STOP_CHECK_INTERVAL: u32 = 4096;

/// Searches `[start, end]` for a nonce whose header hash meets `target`.
///
/// The nonce is written little endian at [`NONCE_OFFSET`]; the hash and the
/// target are compared as little-endian 256-bit integers. Returns `None` when
/// the range holds no solution.
pub fn mine(header: &[u8], target: &[u8; 32], start: u32, end: u32) -> Result<Option<u32>, String> {
    mine_until(header, target, start, end, &|| false)
}

/// [`mine`] that gives up with an error once `stop` returns `true`.
///
/// `stop` is polled every few thousand nonces.
pub fn mine_until(
    header: &[u8],
    target: &[u8; 32],
    start: u32,
    end: u32,
    stop: &dyn Fn() -> bool,
) -> Result<Option<u32>, String> {
    if header.len() < HEADER_SIZE {
        return Err(format!(
            "header template too short: {} < {HEADER_SIZE}",
            header.len()
        ));
    }
    let mut data = header.to_vec();
    let mut nonce = start;
    while nonce <= end {
        if nonce.wrapping_sub(start) % STOP_CHECK_INTERVAL == 0 && stop() {
            return Err(format!("mine: stopped at nonce {nonce}"));
        }
        data[NONCE_OFFSET..NONCE_OFFSET + 4].copy_from_slice(&nonce.to_le_bytes());
        if le_cmp(&hash256(&data), target).is_le() {
            return Ok(Some(nonce));
        }
        match nonce.checked_add(1) {
            Some(next) => nonce = next,
            None => break,
        }
    }
    Ok(None)
}

/// Compares two little-endian 256-bit integers.
fn le_cmp(a: &[u8; 32], b: &[u8; 32]) -> std::cmp::Ordering {
    a.iter().rev().cmp(b.iter().rev())
}

/// Derives `len` bytes with scrypt. `n` must be a power of two greater than one.
pub fn scrypt(passwd: &[u8], salt: &[u8], n: u64, r: u32, p: u32, len: usize) -> Result<Vec<u8>, String> {
    if n < 2 || !n.is_power_of_two() {
        return Err(format!("scrypt: N={n} is not a power of two > 1"));
    }
    let log_n = n.trailing_zeros() as u8;
    // The last argument only sizes PHC hash strings; the raw KDF fills `out` at any length.
    let params = scrypt::Params::new(log_n, r, p, scrypt::Params::RECOMMENDED_LEN)
        .map_err(|e| format!("scrypt: invalid params: {e}"))?;
    let mut out = vec![0u8; len];
    scrypt::scrypt(passwd, salt, &params, &mut out)
        .map_err(|e| format!("scrypt: invalid output length: {e}"))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x11; 32];

    fn pubkey(secret: &[u8]) -> Vec<u8> {
        let sk = SecretKey::from_slice(secret).unwrap();
        PublicKey::from_secret_key(&Secp256k1::new(), &sk)
            .serialize()
            .to_vec()
    }

    #[test]
    fn test_sign_then_verify() {
        let msg = hash256(b"spend");
        let sig = ec_sign(&msg, &KEY).unwrap();

        assert!(ec_verify(&msg, &sig, &pubkey(&KEY)));
        assert!(!ec_verify(&hash256(b"other"), &sig, &pubkey(&KEY)));
        assert!(!ec_verify(&msg, &sig, &pubkey(&[0x22; 32])));
    }

    #[test]
    fn test_malformed_inputs() {
        let msg = hash256(b"spend");
        assert!(!ec_verify(&msg[..31], &[0x30], &pubkey(&KEY)));
        assert!(!ec_verify(&msg, &[0x30, 0x00], &pubkey(&KEY)));
        assert!(ec_sign(&msg, &[0u8; 32]).is_err());
        assert!(ec_sign(&msg[..10], &KEY).is_err());
    }

    #[test]
    fn test_mine_easy_target_takes_first_nonce() {
        let header = [0u8; 80];
        assert_eq!(mine(&header, &[0xff; 32], 7, 100), Ok(Some(7)));
    }

    #[test]
    fn test_mine_unreachable_target_is_not_found() {
        let header = [0u8; 80];
        assert_eq!(mine(&header, &[0u8; 32], 0, 2_000), Ok(None));
    }

    #[test]
    fn test_mine_stops_at_range_end_without_overflow() {
        let header = [0u8; 80];
        assert_eq!(mine(&header, &[0u8; 32], u32::MAX - 3, u32::MAX), Ok(None));
        assert_eq!(mine(&header, &[0u8; 32], 10, 5), Ok(None));
    }

    #[test]
    fn test_mine_until_honors_stop() {
        use std::cell::Cell;

        let header = [0u8; 80];
        let polls = Cell::new(0u32);
        let stop = || {
            polls.set(polls.get() + 1);
            polls.get() > 2
        };
        let err = mine_until(&header, &[0u8; 32], 0, u32::MAX, &stop).unwrap_err();
        assert!(err.contains("stopped"), "{err}");
        assert_eq!(polls.get(), 3);
    }

    #[test]
    fn test_mine_rejects_short_header() {
        assert!(mine(&[0u8; 79], &[0xff; 32], 0, 1).is_err());
    }

    #[test]
    fn test_mine_found_nonce_meets_target() {
        let header = [7u8; 80];
        let mut target = [0xff; 32];
        target[31] = 0x0f;
        let nonce = mine(&header, &target, 0, 10_000).unwrap().unwrap();

        let mut solved = header.to_vec();
        solved[NONCE_OFFSET..NONCE_OFFSET + 4].copy_from_slice(&nonce.to_le_bytes());
        assert!(hash256(&solved)[31] <= 0x0f);
    }

    #[test]
    fn test_scrypt_rfc7914_vector() {
        let key = scrypt(b"", b"", 16, 1, 1, 64).unwrap();
        assert_eq!(
            hex::encode(key),
            "77d6576238657b203b19ca42c18a0497f16b4844e3074ae8dfdffa3fede21442\
             fcd0069ded0948f8326a753a0fc81f17e8d3e0fb2e0d3628cf35e20c38d18906"
        );
    }

    #[test]
    fn test_scrypt_any_output_length() {
        let short = scrypt(b"pass", b"NaCl", 2, 8, 1, 1).unwrap();
        let long = scrypt(b"pass", b"NaCl", 2, 8, 1, 100).unwrap();
        assert_eq!(short.len(), 1);
        assert_eq!(long.len(), 100);
        // PBKDF2 output is a prefix-stable stream.
        assert_eq!(short[0], long[0]);
        assert!(scrypt(b"pass", b"NaCl", 2, 8, 1, 0).is_err());
    }

    #[test]
    fn test_scrypt_rejects_bad_n() {
        assert!(scrypt(b"pass", b"NaCl", 3, 8, 1, 32).is_err());
        assert!(scrypt(b"pass", b"NaCl", 1, 8, 1, 32).is_err());
        assert_eq!(scrypt(b"pass", b"NaCl", 2, 8, 1, 32).unwrap().len(), 32);
    }
}
