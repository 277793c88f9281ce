use thiserror::Error;
use uuid::Uuid;

/// Contract violations surfaced by the engine.
///
/// "No data" conditions (empty corpus, zero-magnitude patterns, missing
/// snapshot fields) never reach this type; they resolve to empty or zero
/// results at the call site.
#[derive(Debug, Error, PartialEq)]
pub enum SigilError {
    #[error("braiding needs at least 2 participants, got {count}")]
    InsufficientParticipants { count: usize },

    #[error("sigil {0} is already indexed")]
    DuplicateSigil(Uuid),

    #[error("braid {0} appears more than once")]
    DuplicateBraid(Uuid),

    #[error("unknown sigil {0}")]
    UnknownSigil(Uuid),

    #[error("pattern must have {expected} dimensions, got {got}")]
    PatternLength { expected: usize, got: usize },

    #[error("invalid export: {0}")]
    Wire(String),
}

pub type Result<T> = std::result::Result<T, SigilError>;
