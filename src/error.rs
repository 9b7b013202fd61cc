use crate::pet::EvolutionForm;
use crate::session::SessionPhase;
use crate::store::StoreError;
use thiserror::Error;

/// Failures surfaced by the engine.
///
/// Most variants are recoverable: the engine logs them and keeps operating on its in-memory
/// state. Only `StateCorruption` ever discards data.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("`{operation}` is not allowed while the session is {phase}")]
    InvalidState {
        operation: &'static str,
        phase: SessionPhase,
    },

    #[error("{from} cannot evolve yet ({words_remaining} words to go)")]
    InvalidEvolution {
        from: EvolutionForm,
        words_remaining: u64,
    },

    #[error("pet state corrupted: {0}")]
    StateCorruption(String),

    #[error("keypress timestamp {got}ms precedes the previous keypress at {previous}ms")]
    TimestampInvalid { got: i64, previous: i64 },

    #[error("accessory `{0}` has not been unlocked yet")]
    AccessoryLocked(String),

    #[error("unknown accessory `{0}`")]
    UnknownAccessory(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
