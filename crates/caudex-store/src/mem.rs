use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use caudex_hash::Digest;

use crate::{Reduction, RevRecords, StoreReader, StoreResult, StoreWriter};

/// In-memory store for unit tests and scripted scenarios. Clones share one
/// backing, so a test can hold reader and writer handles over the same data.
#[derive(Debug, Default, Clone)]
pub struct MemStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    records: Vec<Vec<u8>>,
    reductions: HashMap<Digest, Reduction>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records in append order.
    pub fn records(&self) -> Vec<Vec<u8>> {
        self.lock().records.clone()
    }

    pub fn record_count(&self) -> usize {
        self.lock().records.len()
    }

    /// Drops every stored reduction, forcing the next rehydration to replay.
    pub fn clear_reductions(&self) {
        self.lock().reductions.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StoreWriter for MemStore {
    fn append_record(&mut self, bytes: &[u8]) -> StoreResult<()> {
        self.lock().records.push(bytes.to_vec());
        Ok(())
    }

    fn put_reduction(&mut self, reduction: &Reduction) -> StoreResult<()> {
        self.lock()
            .reductions
            .insert(reduction.reduced_composition_hash, reduction.clone());
        Ok(())
    }
}

impl StoreReader for MemStore {
    fn records_rev(&self) -> StoreResult<RevRecords<'_>> {
        let records = self.lock().records.clone();
        Ok(RevRecords::new(records.into_iter().rev().map(Ok)))
    }

    fn reduction(&self, hash: Digest) -> StoreResult<Option<Reduction>> {
        Ok(self.lock().reductions.get(&hash).cloned())
    }
}
