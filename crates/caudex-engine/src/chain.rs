//! Offline integrity checks over a stored chain.

use std::collections::HashSet;

use caudex_hash::Digest;
use caudex_store::StoreReader;

use crate::error::EngineError;
use crate::record::CompositionRecord;

/// Outcome of a [`verify`] walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReport {
    /// Digest of the newest record, or the empty-init digest for an empty
    /// store.
    pub head: Digest,
    /// Number of stored records.
    pub records: usize,
}

/// Decodes every stored record, recomputes its digest, and checks that each
/// parent link resolves to an earlier-appended record or the genesis
/// sentinel. Fails with `ChainIncomplete` naming the first record whose
/// ancestry does not resolve.
pub fn verify<R: StoreReader>(reader: &R) -> Result<ChainReport, EngineError> {
    let mut newest_first = Vec::new();
    for bytes in reader.records_rev()? {
        let bytes = bytes?;
        let record = CompositionRecord::decode(&bytes)?;
        newest_first.push((Digest::of_bytes(&bytes), record));
    }

    let mut seen: HashSet<Digest> = HashSet::new();
    let mut head = Digest::empty();
    for (hash, record) in newest_first.iter().rev() {
        let parent = record.parent_hash;
        if parent != Digest::empty() && !seen.contains(&parent) {
            return Err(EngineError::ChainIncomplete(*hash));
        }
        seen.insert(*hash);
        head = *hash;
    }
    Ok(ChainReport {
        head,
        records: newest_first.len(),
    })
}
