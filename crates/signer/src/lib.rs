//! Deterministic Ed25519 signing of job-completion receipts.
//!
//! [`Signer`] owns the active signing key plus a set of retired keys usable
//! only for verification, so receipts sealed before a rotation keep
//! verifying against the key they were actually signed with.

#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

mod canon;
mod error;

use std::collections::HashMap;
use std::path::Path;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use coordinator_primitives::Receipt;
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

pub use canon::wire_bytes;
pub use error::SignerError;

struct ActiveKey {
    key_id: String,
    signing_key: SigningKey,
}

/// Signs and verifies receipts against a rotatable set of Ed25519 keys.
#[derive(Debug)]
pub struct Signer {
    active: RwLock<Option<ActiveKey>>,
    retired: RwLock<HashMap<String, VerifyingKey>>,
}

impl std::fmt::Debug for ActiveKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveKey").field("key_id", &self.key_id).finish_non_exhaustive()
    }
}

impl Default for Signer {
    fn default() -> Self {
        Self::empty()
    }
}

impl Signer {
    /// Creates a signer with no active key (readiness checks must fail
    /// until [`Self::rotate`] or [`Self::load_from_file`] is called).
    #[must_use]
    pub fn empty() -> Self {
        Self { active: RwLock::new(None), retired: RwLock::new(HashMap::new()) }
    }

    /// Loads a raw 32-byte Ed25519 seed from `path` and installs it as the
    /// active key under `key_id`. Fails if the file is missing or
    /// malformed; callers are expected to propagate the error up to
    /// process exit.
    pub fn load_from_file(path: &Path, key_id: &str) -> Result<Self, SignerError> {
        let bytes = std::fs::read(path)?;
        let seed: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| SignerError::InvalidKeyMaterial(format!("{} must be 32 bytes", path.display())))?;
        let signer = Self::empty();
        signer.rotate(SigningKey::from_bytes(&seed), key_id);
        Ok(signer)
    }

    /// Atomically replaces the active key. The previous active key (if any)
    /// is retained as verification-only.
    pub fn rotate(&self, signing_key: SigningKey, key_id: &str) {
        let verifying_key = signing_key.verifying_key();
        let mut active = self.active.write();
        if let Some(previous) = active.take() {
            self.retired.write().insert(previous.key_id, previous.signing_key.verifying_key());
        }
        *active = Some(ActiveKey { key_id: key_id.to_owned(), signing_key });
        tracing::info!(key_id, "signer: rotated active key");
        let _ = verifying_key;
    }

    /// Whether an active key is configured (used by the readiness probe).
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.active.read().is_some()
    }

    /// Computes the lowercase-hex SHA-256 digest of `payload`.
    #[must_use]
    pub fn result_hash(payload: &[u8]) -> String {
        let digest = Sha256::digest(payload);
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            hex.push_str(&format!("{byte:02x}"));
        }
        hex
    }

    /// Seals `receipt` in place: validates required fields, computes the
    /// canonical signing bytes, signs them with the active key, and fills
    /// in `key_id`/`signature`.
    pub fn seal(&self, receipt: &mut Receipt) -> Result<(), SignerError> {
        if receipt.receipt_id.as_str().is_empty()
            || receipt.job_id.as_str().is_empty()
            || receipt.miner_id.as_str().is_empty()
            || receipt.result_hash.is_empty()
        {
            return Err(SignerError::CanonicalizationError(
                "receipt is missing one or more required fields".into(),
            ));
        }

        let active = self.active.read();
        let active = active.as_ref().ok_or(SignerError::SignerUnavailable)?;

        let signing_input = canon::signing_bytes(receipt);
        let signature: Signature = active.signing_key.sign(&signing_input);
        receipt.signature = URL_SAFE_NO_PAD.encode(signature.to_bytes());
        receipt.key_id = active.key_id.clone();
        Ok(())
    }

    /// Re-derives the canonical signing bytes for `receipt` and verifies its
    /// `signature` against the key named by `receipt.key_id`, whether that
    /// key is currently active or retired.
    pub fn verify(&self, receipt: &Receipt) -> Result<(), SignerError> {
        let verifying_key = self.verifying_key_for(&receipt.key_id)?;
        let signature_bytes = URL_SAFE_NO_PAD
            .decode(&receipt.signature)
            .map_err(|e| SignerError::InvalidKeyMaterial(e.to_string()))?;
        let signature_bytes: [u8; 64] = signature_bytes
            .as_slice()
            .try_into()
            .map_err(|_| SignerError::InvalidKeyMaterial("signature must be 64 bytes".into()))?;
        let signature = Signature::from_bytes(&signature_bytes);

        let signing_input = canon::signing_bytes(receipt);
        verifying_key
            .verify(&signing_input, &signature)
            .map_err(|_| SignerError::VerificationFailed)
    }

    fn verifying_key_for(&self, key_id: &str) -> Result<VerifyingKey, SignerError> {
        if let Some(active) = self.active.read().as_ref() {
            if active.key_id == key_id {
                return Ok(active.signing_key.verifying_key());
            }
        }
        self.retired.read().get(key_id).copied().ok_or_else(|| SignerError::UnknownKey(key_id.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use coordinator_primitives::{Amount, JobId, MinerId, ReceiptId, SubmitterId, TimestampMs};
    use rand::rngs::OsRng;

    use super::*;

    fn unsealed() -> Receipt {
        Receipt {
            receipt_id: ReceiptId::from("r1"),
            job_id: JobId::from("j1"),
            miner_id: MinerId::from("m1"),
            submitter_id: SubmitterId::from("s1"),
            units_consumed: 500,
            unit_rate: Amount(10),
            amount_charged: Amount(5),
            started_ms: TimestampMs(1_000),
            completed_ms: TimestampMs(2_000),
            result_hash: Signer::result_hash(b"r"),
            model: "m1".into(),
            key_id: String::new(),
            signature: String::new(),
        }
    }

    fn signer_with_key(key_id: &str) -> Signer {
        let signer = Signer::empty();
        let mut csprng = OsRng;
        signer.rotate(SigningKey::generate(&mut csprng), key_id);
        signer
    }

    #[test]
    fn seal_then_verify_round_trips() {
        let signer = signer_with_key("key-1");
        let mut receipt = unsealed();
        signer.seal(&mut receipt).unwrap();
        assert_eq!(receipt.key_id, "key-1");
        assert!(!receipt.signature.is_empty());
        signer.verify(&receipt).unwrap();
    }

    #[test]
    fn seal_fails_without_an_active_key() {
        let signer = Signer::empty();
        let mut receipt = unsealed();
        assert!(matches!(signer.seal(&mut receipt), Err(SignerError::SignerUnavailable)));
    }

    #[test]
    fn seal_fails_on_missing_required_fields() {
        let signer = signer_with_key("key-1");
        let mut receipt = unsealed();
        receipt.result_hash.clear();
        assert!(matches!(signer.seal(&mut receipt), Err(SignerError::CanonicalizationError(_))));
    }

    #[test]
    fn rotation_keeps_old_receipts_verifiable_under_their_original_key() {
        let signer = signer_with_key("key-1");
        let mut receipt = unsealed();
        signer.seal(&mut receipt).unwrap();

        let mut csprng = OsRng;
        signer.rotate(SigningKey::generate(&mut csprng), "key-2");

        // Old receipt still verifies against the retired key.
        signer.verify(&receipt).unwrap();

        // New receipts are sealed under the new key.
        let mut receipt2 = unsealed();
        receipt2.receipt_id = ReceiptId::from("r2");
        signer.seal(&mut receipt2).unwrap();
        assert_eq!(receipt2.key_id, "key-2");
    }

    #[test]
    fn tampering_with_a_signed_field_breaks_verification() {
        let signer = signer_with_key("key-1");
        let mut receipt = unsealed();
        signer.seal(&mut receipt).unwrap();
        receipt.amount_charged = Amount(999);
        assert!(matches!(signer.verify(&receipt), Err(SignerError::VerificationFailed)));
    }

    #[test]
    fn verify_fails_for_unknown_key_id() {
        let signer = signer_with_key("key-1");
        let mut receipt = unsealed();
        signer.seal(&mut receipt).unwrap();
        receipt.key_id = "no-such-key".into();
        assert!(matches!(signer.verify(&receipt), Err(SignerError::UnknownKey(_))));
    }
}
