use caudex_hash::Digest;
use caudex_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Reverse iteration ran out of records without reaching a reduction or
    /// the genesis record for the named tentative head.
    #[error("chain incomplete: no reduction or genesis reachable from {0}")]
    ChainIncomplete(Digest),
    #[error("stored record does not decode: {0}")]
    RecordDecode(String),
    #[error("record encode error: {0}")]
    RecordEncode(String),
    #[error("event batch must not be empty")]
    EmptyEvents,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("process error: {0}")]
    Process(#[from] anyhow::Error),
    #[error("engine is disposed")]
    Disposed,
}
