//! Event-sourced persistence for a deterministic opaque process.
//!
//! Every state-affecting step is sealed into a composition record whose
//! digest covers its entire causal history through the `parent_hash` link.
//! Appended records plus reductions (state snapshots keyed by record
//! digest) are enough to reconstruct the live process after a restart:
//! rehydration walks the log newest-first until it reaches a reduction or
//! the genesis record, then replays forward.
//!
//! [`PersistentProcess`] is the engine; [`StoreBoundProcess`] binds it to a
//! [`caudex_store`] backend so that each mutation is durable before its
//! response reaches the caller.

mod binding;
pub mod chain;
mod engine;
mod error;
pub mod process;
mod record;

pub use binding::StoreBoundProcess;
pub use engine::PersistentProcess;
pub use error::EngineError;
pub use record::{CompositionRecord, SealedRecord};
