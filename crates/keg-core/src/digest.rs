//! Algorithm-tagged content digests.

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::errors::{ErrorInfo, KegError};

/// Hash algorithm a [`Digest`] was computed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// SHA-256, the only algorithm the formula corpus declares.
    Sha256,
}

impl DigestAlgorithm {
    /// Expected length of the lowercase hex encoding.
    pub fn hex_len(&self) -> usize {
        match self {
            DigestAlgorithm::Sha256 => 64,
        }
    }
}

/// An algorithm-tagged content hash, stored as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digest {
    /// Algorithm the value was computed with.
    pub algorithm: DigestAlgorithm,
    /// Lowercase hex encoding of the hash value.
    pub value: String,
}

impl Digest {
    /// Computes the digest of `bytes` under the given algorithm.
    pub fn compute(algorithm: DigestAlgorithm, bytes: &[u8]) -> Self {
        let value = match algorithm {
            DigestAlgorithm::Sha256 => hex::encode(Sha256::digest(bytes)),
        };
        Self { algorithm, value }
    }

    /// Validates that the declared value is well formed for its algorithm.
    pub fn validate(&self, owner: &str) -> Result<(), KegError> {
        let expected_len = self.algorithm.hex_len();
        let well_formed = self.value.len() == expected_len
            && self
                .value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(KegError::MalformedFormula(
                ErrorInfo::new(
                    "keg_core.digest_value",
                    format!("digest value is not {expected_len} chars of lowercase hex"),
                )
                .with_context("formula", owner)
                .with_context("value", self.value.clone()),
            ));
        }
        Ok(())
    }

    /// Checks `bytes` against this digest, reporting both digests on mismatch.
    pub fn verify(&self, bytes: &[u8]) -> Result<(), KegError> {
        let actual = Digest::compute(self.algorithm, bytes);
        if actual.value != self.value {
            return Err(KegError::IntegrityMismatch(
                ErrorInfo::new("keg_core.digest_mismatch", "artifact digest mismatch")
                    .with_context("expected", self.value.clone())
                    .with_context("actual", actual.value),
            ));
        }
        Ok(())
    }
}
