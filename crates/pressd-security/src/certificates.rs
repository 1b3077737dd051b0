// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// TLS certificate key material for the printer application's embedded
// HTTP/IPP listener.
//
// `ring` provides key generation and signing but no X.509 certificate
// builder. This module generates the ECDSA P-256 key pair (PKCS#8 DER)
// and exposes the raw material; a full self-signed certificate needs an
// additional crate such as `rcgen`, wired up where TLS is actually
// configured in pressd-ipp. The key pair here feeds directly into
// `rcgen::Certificate::from_params()` or `rustls::pki_types::PrivateKeyDer::Pkcs8`.

use pressd_core::CoreError;
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};
use tracing::{debug, instrument};

/// An ECDSA P-256 key pair suitable for TLS server authentication.
///
/// The private key is a PKCS#8 v1 DER document; the public key is the
/// uncompressed SEC1 encoding (0x04 || x || y, 65 bytes).
pub struct SelfSignedCert {
    pkcs8_der: Vec<u8>,
    public_key_der: Vec<u8>,
}

impl SelfSignedCert {
    /// Generate a fresh ECDSA P-256 key pair using the OS CSPRNG. This
    /// produces raw key material, not an X.509 certificate.
    #[instrument]
    pub fn generate() -> Result<Self, CoreError> {
        let rng = SystemRandom::new();

        let pkcs8_document = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
            .map_err(|e| CoreError::Certificate(format!("key generation failed: {e}")))?;

        let pkcs8_der = pkcs8_document.as_ref().to_vec();

        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &pkcs8_der, &rng)
            .map_err(|e| CoreError::Certificate(format!("key parsing failed: {e}")))?;

        let public_key_der = key_pair.public_key().as_ref().to_vec();

        debug!(
            pkcs8_len = pkcs8_der.len(),
            pubkey_len = public_key_der.len(),
            "ECDSA P-256 key pair generated"
        );

        Ok(Self {
            pkcs8_der,
            public_key_der,
        })
    }

    /// The PKCS#8 v1 DER-encoded private key, written to
    /// `<spooldir>/<hostname>.key`.
    pub fn private_key_pkcs8_der(&self) -> &[u8] {
        &self.pkcs8_der
    }

    /// The uncompressed SEC1 public key (65 bytes for P-256).
    pub fn public_key_der(&self) -> &[u8] {
        &self.public_key_der
    }

    /// Sign `message` with the private key (ECDSA P-256 + SHA-256, ASN.1
    /// DER-encoded signature). Used to sign CSRs and exercise the key
    /// pair end-to-end.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CoreError> {
        let rng = SystemRandom::new();

        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &self.pkcs8_der, &rng)
            .map_err(|e| CoreError::Certificate(format!("key load failed: {e}")))?;

        let sig = key_pair
            .sign(&rng, message)
            .map_err(|e| CoreError::Certificate(format!("signing failed: {e}")))?;

        Ok(sig.as_ref().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ring::signature::{UnparsedPublicKey, ECDSA_P256_SHA256_ASN1};

    #[test]
    fn generate_key_pair() {
        let cert = SelfSignedCert::generate().expect("key generation failed");
        assert!(cert.private_key_pkcs8_der().len() > 100);
        assert_eq!(cert.public_key_der().len(), 65);
        assert_eq!(cert.public_key_der()[0], 0x04, "must be uncompressed point");
    }

    #[test]
    fn sign_and_verify() {
        let cert = SelfSignedCert::generate().expect("key generation failed");
        let message = b"pressd TLS handshake test";
        let signature = cert.sign(message).expect("signing failed");
        let public_key = UnparsedPublicKey::new(&ECDSA_P256_SHA256_ASN1, cert.public_key_der());
        public_key.verify(message, &signature).expect("signature verification failed");
    }

    #[test]
    fn different_keys_each_time() {
        let a = SelfSignedCert::generate().expect("gen a");
        let b = SelfSignedCert::generate().expect("gen b");
        assert_ne!(a.private_key_pkcs8_der(), b.private_key_pkcs8_der());
    }
}
