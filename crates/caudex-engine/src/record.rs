use caudex_hash::{to_canonical_json, Digest};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// One immutable step of a process history: a parent link plus either a
/// batch of applied events or a serialized-state override.
///
/// The declaration order of the fields and the omission of absent optionals
/// are part of the wire form; see [`caudex_hash::to_canonical_json`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionRecord {
    /// Digest of the previous record's canonical bytes, or
    /// [`Digest::empty`] for the genesis step.
    pub parent_hash: Digest,
    /// Events applied by this step, in order. Non-empty when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appended_events: Option<Vec<String>>,
    /// Serialized state installed by this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_state: Option<String>,
}

impl CompositionRecord {
    pub fn events(parent_hash: Digest, events: Vec<String>) -> Self {
        Self {
            parent_hash,
            appended_events: Some(events),
            set_state: None,
        }
    }

    pub fn state_override(parent_hash: Digest, state: String) -> Self {
        Self {
            parent_hash,
            appended_events: None,
            set_state: Some(state),
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EngineError> {
        serde_json::from_slice(bytes).map_err(|err| EngineError::RecordDecode(err.to_string()))
    }

    /// Canonical bytes plus their digest.
    pub fn seal(&self) -> Result<SealedRecord, EngineError> {
        let bytes =
            to_canonical_json(self).map_err(|err| EngineError::RecordEncode(err.to_string()))?;
        let hash = Digest::of_bytes(&bytes);
        Ok(SealedRecord { bytes, hash })
    }
}

/// A record's canonical bytes and their digest, ready for the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedRecord {
    pub bytes: Vec<u8>,
    pub hash: Digest,
}
