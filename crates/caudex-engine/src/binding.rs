use std::sync::{Mutex, MutexGuard};

use caudex_store::{StoreReader, StoreWriter};

use crate::engine::PersistentProcess;
use crate::error::EngineError;
use crate::process::Process;
use crate::record::SealedRecord;

/// Glue between the engine and the store: presents the same surface as the
/// opaque process, but every mutation also lands in the store.
///
/// Per mutation, in this order: the engine applies and seals the record,
/// the record bytes are appended, then a fresh reduction for the new head
/// is written. The record is durable before its reduction; a reader that
/// sees the record without the reduction only pays a replay cost.
///
/// The writer lock is taken before the engine moves, so concurrent callers
/// are serialized across the whole mutate-then-persist span and the store's
/// append order always matches the chain order.
pub struct StoreBoundProcess<P: Process, W: StoreWriter> {
    engine: PersistentProcess<P>,
    writer: Mutex<W>,
}

impl<P: Process, W: StoreWriter> StoreBoundProcess<P, W> {
    /// Rehydrates an engine from `store` and binds it to the same store for
    /// writes.
    pub fn open(process: P, store: W) -> Result<Self, EngineError>
    where
        W: StoreReader,
    {
        let engine = PersistentProcess::rehydrate(process, &store)?;
        Ok(Self::new(engine, store))
    }

    pub fn new(engine: PersistentProcess<P>, writer: W) -> Self {
        Self {
            engine,
            writer: Mutex::new(writer),
        }
    }

    pub fn engine(&self) -> &PersistentProcess<P> {
        &self.engine
    }

    pub fn apply_event(&self, event: &str) -> Result<String, EngineError> {
        let mut responses = self.apply_events(&[event.to_owned()])?;
        Ok(responses.remove(0))
    }

    pub fn apply_events(&self, events: &[String]) -> Result<Vec<String>, EngineError> {
        let mut writer = self.lock_writer()?;
        let (responses, sealed) = self.engine.process_events(events)?;
        self.commit(&mut writer, sealed)?;
        Ok(responses)
    }

    pub fn set_serialized_state(&self, state: &str) -> Result<(), EngineError> {
        let mut writer = self.lock_writer()?;
        let sealed = self.engine.set_state(state)?;
        self.commit(&mut writer, sealed)
    }

    pub fn serialized_state(&self) -> Result<String, EngineError> {
        self.engine.serialized_state()
    }

    /// Persists a sealed record and a reduction for the new head.
    ///
    /// If the append fails, the engine's in-memory head has already moved
    /// past what the store will ever hold, so the engine is taken out of
    /// service before the error propagates. Reduction failures are only
    /// logged: reductions are best-effort and replay covers their absence.
    fn commit(&self, writer: &mut W, sealed: SealedRecord) -> Result<(), EngineError> {
        if let Err(err) = writer.append_record(&sealed.bytes) {
            self.engine.dispose();
            return Err(err.into());
        }
        match self.engine.current_reduction() {
            Ok(reduction) => {
                if let Err(err) = writer.put_reduction(&reduction) {
                    log::warn!("reduction write for {} failed: {err}", sealed.hash);
                }
            }
            Err(err) => log::warn!("reduction capture for {} failed: {err}", sealed.hash),
        }
        Ok(())
    }

    fn lock_writer(&self) -> Result<MutexGuard<'_, W>, EngineError> {
        self.writer.lock().map_err(|_| EngineError::Disposed)
    }
}
