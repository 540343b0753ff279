//! Integrity validation of downloaded assets
//!
//! A validator checks the bytes of a downloaded asset against a proof that
//! ships as a companion asset in the same release, named after the main
//! asset plus [`Validator::suffix`] (`tool_linux_amd64.tar.gz.sha256`).

use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::pkcs8::DecodePublicKey;
use sha2::{Digest, Sha256};

use crate::error::IntegrityError;

pub trait Validator: Send + Sync {
    /// Check `data` against `proof`
    fn validate(&self, data: &[u8], proof: &[u8]) -> Result<(), IntegrityError>;

    /// Suffix appended to the asset name to find the proof asset
    fn suffix(&self) -> &str;
}

// ============================================================================
// Checksum
// ============================================================================

/// SHA-256 digest comparison
///
/// The proof is either the hex digest as text (optionally followed by a file
/// name, as `sha256sum` prints it) or the 32 raw digest bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Validator;

impl Validator for Sha256Validator {
    fn validate(&self, data: &[u8], proof: &[u8]) -> Result<(), IntegrityError> {
        let expected = decode_digest(proof)?;
        let computed = Sha256::digest(data);
        if constant_time_eq(&expected, &computed) {
            Ok(())
        } else {
            Err(IntegrityError::ChecksumMismatch {
                expected: hex::encode(expected),
                computed: hex::encode(computed),
            })
        }
    }

    fn suffix(&self) -> &str {
        ".sha256"
    }
}

fn decode_digest(proof: &[u8]) -> Result<Vec<u8>, IntegrityError> {
    let token = std::str::from_utf8(proof)
        .ok()
        .and_then(|text| text.split_whitespace().next())
        .filter(|token| token.len() == 64);
    if let Some(token) = token {
        return hex::decode(token).map_err(|e| IntegrityError::MalformedChecksum(e.to_string()));
    }
    if proof.len() == 32 {
        return Ok(proof.to_vec());
    }
    Err(IntegrityError::MalformedChecksum(format!(
        "expected a 64 character hex digest or 32 raw bytes, got {} bytes",
        proof.len()
    )))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ============================================================================
// Signature
// ============================================================================

/// ECDSA P-256 / SHA-256 signature verification
///
/// Signatures are ASN.1 DER encoded; 64-byte fixed `r || s` signatures are
/// accepted as well.
#[derive(Debug, Clone)]
pub struct EcdsaValidator {
    key: VerifyingKey,
}

impl EcdsaValidator {
    pub fn new(key: VerifyingKey) -> Self {
        Self { key }
    }

    /// From a PEM `PUBLIC KEY` block. Keys on any curve other than P-256 are
    /// rejected.
    pub fn from_public_key_pem(pem: &str) -> Result<Self, IntegrityError> {
        VerifyingKey::from_public_key_pem(pem)
            .map(Self::new)
            .map_err(|e| IntegrityError::InvalidKey(e.to_string()))
    }

    /// From a SEC1 encoded (compressed or uncompressed) point
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self, IntegrityError> {
        VerifyingKey::from_sec1_bytes(bytes)
            .map(Self::new)
            .map_err(|e| IntegrityError::InvalidKey(e.to_string()))
    }
}

impl Validator for EcdsaValidator {
    fn validate(&self, data: &[u8], proof: &[u8]) -> Result<(), IntegrityError> {
        let signature = Signature::from_der(proof)
            .or_else(|der_err| Signature::from_slice(proof).map_err(|_| der_err))
            .map_err(IntegrityError::MalformedSignature)?;
        self.key
            .verify(data, &signature)
            .map_err(IntegrityError::SignatureMismatch)
    }

    fn suffix(&self) -> &str {
        ".sig"
    }
}
