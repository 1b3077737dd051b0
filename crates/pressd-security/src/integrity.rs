// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SHA-256 hashing for spool-file integrity checks and CSRF token
// derivation.

use pressd_core::CoreError;
use sha2::{Digest, Sha256};

/// The SHA-256 hash of `data`, lowercase hex.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Verify `data` matches the expected SHA-256 hex digest.
pub fn verify_hash(data: &[u8], expected_hex: &str) -> Result<(), CoreError> {
    let actual = hash_bytes(data);
    if actual == expected_hex {
        Ok(())
    } else {
        Err(CoreError::IntegrityMismatch {
            expected: expected_hex.to_owned(),
            actual,
        })
    }
}

/// Derive a per-form CSRF token from the system's session key and the
/// requesting client's hostname. The session key is rotated daily
/// (`SystemConfig::session_key_rotation`), so a token is only ever valid
/// for the day it was issued.
pub fn derive_csrf_token(session_key: &[u8], client_hostname: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(session_key);
    hasher.update(client_hostname.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn hash_empty_input() {
        assert_eq!(hash_bytes(b""), EMPTY_SHA256);
    }

    #[test]
    fn hash_known_value() {
        let expected = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
        assert_eq!(hash_bytes(b"hello"), expected);
    }

    #[test]
    fn verify_matching_hash() {
        let data = b"pressd";
        let hex = hash_bytes(data);
        assert!(verify_hash(data, &hex).is_ok());
    }

    #[test]
    fn verify_mismatched_hash() {
        let result = verify_hash(b"a", "0000");
        match result.unwrap_err() {
            CoreError::IntegrityMismatch { expected, actual } => {
                assert_eq!(expected, "0000");
                assert_eq!(actual, hash_bytes(b"a"));
            }
            other => panic!("unexpected error variant: {other}"),
        }
    }

    #[test]
    fn csrf_token_is_stable_for_same_inputs() {
        let key = b"session-key-bytes";
        let a = derive_csrf_token(key, "client.local");
        let b = derive_csrf_token(key, "client.local");
        assert_eq!(a, b);
    }

    #[test]
    fn csrf_token_differs_per_hostname() {
        let key = b"session-key-bytes";
        let a = derive_csrf_token(key, "client-a.local");
        let b = derive_csrf_token(key, "client-b.local");
        assert_ne!(a, b);
    }
}
