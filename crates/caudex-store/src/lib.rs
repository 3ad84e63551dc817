//! Split persistence for hash-chained process histories.
//!
//! Two kinds of data live side by side: an append-only log of composition
//! record bytes (the history itself, read newest-first during rehydration)
//! and a keyed side-table of reductions (state snapshots, the only shortcut
//! that avoids full replay). Records are durable on append; reductions are
//! best-effort and their loss only costs replay time.

mod fs;
mod mem;

pub use fs::FsStore;
pub use mem::MemStore;

use std::io;
use std::path::PathBuf;

use caudex_hash::Digest;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Snapshot of serialized process state, keyed by the composition record
/// after which it was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reduction {
    pub reduced_composition_hash: Digest,
    pub reduced_value: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("corrupt store entry: {0}")]
    Corrupt(String),
    #[error("reduction decode error: {0}")]
    ReductionDecode(#[from] serde_json::Error),
}

/// Append side of the store.
pub trait StoreWriter: Send {
    /// Appends one record's canonical bytes. On `Ok` the record is durable
    /// and the first thing a fresh reverse enumeration yields. A crash
    /// before return leaves either nothing or the full record.
    fn append_record(&mut self, bytes: &[u8]) -> StoreResult<()>;

    /// Writes or overwrites the reduction keyed by its
    /// `reduced_composition_hash`.
    fn put_reduction(&mut self, reduction: &Reduction) -> StoreResult<()>;
}

/// Read side of the store.
pub trait StoreReader {
    /// Record payloads newest-first. Finite; each call starts a fresh pass
    /// from the newest record.
    fn records_rev(&self) -> StoreResult<RevRecords<'_>>;

    fn reduction(&self, hash: Digest) -> StoreResult<Option<Reduction>>;
}

/// Finite newest-first iterator over record payloads.
pub struct RevRecords<'a> {
    inner: Box<dyn Iterator<Item = StoreResult<Vec<u8>>> + 'a>,
}

impl<'a> RevRecords<'a> {
    pub fn new(inner: impl Iterator<Item = StoreResult<Vec<u8>>> + 'a) -> Self {
        Self {
            inner: Box::new(inner),
        }
    }
}

impl Iterator for RevRecords<'_> {
    type Item = StoreResult<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

pub(crate) fn io_error(path: impl Into<PathBuf>, err: io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source: err,
    }
}
