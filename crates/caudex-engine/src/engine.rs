use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use caudex_hash::Digest;
use caudex_store::{Reduction, StoreReader};

use crate::error::EngineError;
use crate::process::Process;
use crate::record::{CompositionRecord, SealedRecord};

/// The persistent process engine.
///
/// Owns the opaque process and the chain head (`last_state_hash`), both
/// behind one coarse lock: every public operation holds it for its full
/// duration, so mutations on one engine are totally ordered and each sealed
/// record's parent is the immediately preceding record.
///
/// The engine itself never touches the store after construction; persisting
/// sealed records is the store-binding wrapper's job.
#[derive(Debug)]
pub struct PersistentProcess<P: Process> {
    state: Mutex<EngineState<P>>,
}

#[derive(Debug)]
struct EngineState<P> {
    process: P,
    last_state_hash: Digest,
    disposed: bool,
}

impl<P> EngineState<P> {
    fn ensure_live(&self) -> Result<(), EngineError> {
        if self.disposed {
            return Err(EngineError::Disposed);
        }
        Ok(())
    }
}

impl<P: Process> PersistentProcess<P> {
    /// Reconstructs the process from stored history.
    ///
    /// Walks records newest-first. The path leading back from the tentative
    /// head grows on a replay stack; records not yet linked to that path
    /// wait in a pool keyed by digest. The walk stops at the first
    /// reduction reachable from the head, or at the genesis record (whose
    /// parent is the empty-init digest), and the stacked records are then
    /// replayed oldest-first. Memory is bounded by the distance from the
    /// head to the nearest reduction.
    ///
    /// An exhausted iterator with records still on the stack means the
    /// chain cannot be completed: `ChainIncomplete` names the tentative
    /// head. An empty store yields a ready engine at the empty-init digest
    /// with the process untouched.
    pub fn rehydrate<R: StoreReader>(process: P, reader: &R) -> Result<Self, EngineError> {
        let mut process = process;
        let mut records = reader.records_rev()?;
        let mut stack: Vec<(Digest, CompositionRecord)> = Vec::new();
        let mut pool: HashMap<Digest, CompositionRecord> = HashMap::new();

        loop {
            let Some(bytes) = records.next() else {
                return match stack.first() {
                    Some((head, _)) => Err(EngineError::ChainIncomplete(*head)),
                    None => {
                        log::debug!("rehydrated from empty store");
                        Ok(Self::ready(process, Digest::empty()))
                    }
                };
            };
            let bytes = bytes?;
            let record = CompositionRecord::decode(&bytes)?;
            let hash = Digest::of_bytes(&bytes);
            if stack.is_empty() {
                stack.push((hash, record));
            } else {
                pool.insert(hash, record);
            }

            loop {
                let Some((top_hash, top_record)) = stack.last() else {
                    break;
                };
                let top_hash = *top_hash;
                let parent = top_record.parent_hash;

                if let Some(reduction) = reader.reduction(top_hash)? {
                    stack.pop();
                    process.restore_state(&reduction.reduced_value)?;
                    let head = replay(&mut process, top_hash, stack)?;
                    log::debug!("rehydrated head {head} from reduction at {top_hash}");
                    return Ok(Self::ready(process, head));
                }
                if parent == Digest::empty() {
                    // Genesis: the process starts from its default state and
                    // the genesis record itself is part of the replay.
                    let head = replay(&mut process, Digest::empty(), stack)?;
                    log::debug!("rehydrated head {head} by replay from genesis");
                    return Ok(Self::ready(process, head));
                }
                match pool.remove(&parent) {
                    Some(record) => stack.push((parent, record)),
                    None => break, // need older records from the iterator
                }
            }
        }
    }

    fn ready(process: P, head: Digest) -> Self {
        Self {
            state: Mutex::new(EngineState {
                process,
                last_state_hash: head,
                disposed: false,
            }),
        }
    }

    /// Applies a batch of events in order and seals the resulting record.
    ///
    /// Responses align 1:1 with the input events. The returned record's
    /// digest is the new chain head. If the process refuses the k-th event,
    /// the error surfaces before any head update and nothing is sealed, but
    /// the process may already have advanced through the first k-1 events;
    /// callers that need event-level atomicity submit single-event batches.
    pub fn process_events(
        &self,
        events: &[String],
    ) -> Result<(Vec<String>, SealedRecord), EngineError> {
        if events.is_empty() {
            return Err(EngineError::EmptyEvents);
        }
        let mut guard = self.lock()?;
        guard.ensure_live()?;
        let mut responses = Vec::with_capacity(events.len());
        for event in events {
            responses.push(guard.process.apply_event(event)?);
        }
        let record = CompositionRecord::events(guard.last_state_hash, events.to_vec());
        let sealed = record.seal()?;
        guard.last_state_hash = sealed.hash;
        Ok((responses, sealed))
    }

    /// Installs a serialized state and seals the override record.
    pub fn set_state(&self, state: &str) -> Result<SealedRecord, EngineError> {
        let mut guard = self.lock()?;
        guard.ensure_live()?;
        guard.process.restore_state(state)?;
        let record = CompositionRecord::state_override(guard.last_state_hash, state.to_owned());
        let sealed = record.seal()?;
        guard.last_state_hash = sealed.hash;
        Ok(sealed)
    }

    /// The current state snapshot, keyed by the current chain head.
    pub fn current_reduction(&self) -> Result<Reduction, EngineError> {
        let guard = self.lock()?;
        guard.ensure_live()?;
        Ok(Reduction {
            reduced_composition_hash: guard.last_state_hash,
            reduced_value: guard.process.serialized_state()?,
        })
    }

    pub fn serialized_state(&self) -> Result<String, EngineError> {
        let guard = self.lock()?;
        guard.ensure_live()?;
        Ok(guard.process.serialized_state()?)
    }

    /// Digest of the most recently sealed record, or the empty-init digest
    /// when no history exists.
    pub fn last_state_hash(&self) -> Result<Digest, EngineError> {
        let guard = self.lock()?;
        guard.ensure_live()?;
        Ok(guard.last_state_hash)
    }

    /// Takes the engine out of service. Idempotent; every later operation
    /// fails with `Disposed`.
    pub fn dispose(&self) {
        if let Ok(mut guard) = self.state.lock() {
            if !guard.disposed {
                guard.process.dispose();
                guard.disposed = true;
            }
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, EngineState<P>>, EngineError> {
        // A poisoned lock means a mutation died midway; the in-memory state
        // can no longer be vouched for, which is the disposed condition.
        self.state.lock().map_err(|_| EngineError::Disposed)
    }
}

/// Replays stacked records oldest-first, returning the digest of the newest
/// one (the restored chain head). Responses from replayed events only ever
/// mattered to the callers that were live when they first ran.
fn replay<P: Process>(
    process: &mut P,
    start: Digest,
    stack: Vec<(Digest, CompositionRecord)>,
) -> Result<Digest, EngineError> {
    let mut head = start;
    for (hash, record) in stack.into_iter().rev() {
        if let Some(state) = &record.set_state {
            process.restore_state(state)?;
        }
        if let Some(events) = &record.appended_events {
            for event in events {
                process.apply_event(event)?;
            }
        }
        head = hash;
    }
    Ok(head)
}
