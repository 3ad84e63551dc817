//! Content-addressed identity: SHA-256 digests and the canonical JSON form.
//!
//! Every observable state of a persisted process is identified by the digest
//! of the canonical byte form of its latest history record. The encoding is
//! pinned here: compact JSON, struct fields in declaration order, absent
//! optional fields omitted entirely. Any drift in this encoding silently
//! changes digests and breaks rehydration, so both halves live in one crate
//! and are frozen by test vectors.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};
use thiserror::Error;

/// Width of a digest in bytes.
pub const DIGEST_LEN: usize = 32;

const HEX_PREFIX: &str = "sha256:";

static EMPTY_DIGEST: Lazy<Digest> = Lazy::new(|| Digest::of_bytes(&[]));

/// SHA-256 digest of a byte sequence.
///
/// The textual form is `sha256:<64 lowercase hex>`, which is also how a
/// digest serializes so that record encodings stay textual end to end.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Digest(hasher.finalize().into())
    }

    /// Digest of the empty byte sequence. Sentinel parent of a genesis
    /// record, and the chain head of an empty store.
    pub fn empty() -> Self {
        *EMPTY_DIGEST
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DigestParseError> {
        let arr: [u8; DIGEST_LEN] = bytes
            .try_into()
            .map_err(|_| DigestParseError::Length(bytes.len()))?;
        Ok(Digest(arr))
    }

    pub fn to_hex(&self) -> String {
        format!("{HEX_PREFIX}{}", hex::encode(self.0))
    }
}

#[derive(Debug, Error)]
pub enum DigestParseError {
    #[error("digest string missing '{HEX_PREFIX}' prefix")]
    MissingPrefix,
    #[error("invalid hex in digest string: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("digest has {0} bytes, expected {DIGEST_LEN}")]
    Length(usize),
}

impl FromStr for Digest {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_part = s
            .strip_prefix(HEX_PREFIX)
            .ok_or(DigestParseError::MissingPrefix)?;
        let bytes = hex::decode(hex_part)?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Canonical byte form of a serializable value: compact JSON with struct
/// fields in declaration order and absent optionals omitted.
///
/// Two values with equal fields encode to the same bytes, hence the same
/// digest. Callers must keep `skip_serializing_if = "Option::is_none"` on
/// every optional field so that omission (not `null`) is what lands on disk.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(value)
}
