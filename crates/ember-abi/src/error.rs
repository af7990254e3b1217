use thiserror::Error;

/// Failure taxonomy for one generation session.
///
/// `Load` is fatal to the session (no context is created); `Eval` is
/// recoverable at the caller's discretion and never corrupts the logits
/// or token history already recorded. Out-of-range detokenization is not
/// an error at all: the façade returns the empty-string sentinel instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to load model: {0}")]
    Load(String),

    #[error("model evaluation failed: {0}")]
    Eval(String),

    #[error("invalid decoding parameters: {0}")]
    InvalidParams(String),

    #[error("sample requested before the first evaluation produced logits")]
    NoLogits,

    #[error("candidate set emptied during filtering")]
    EmptyCandidates,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
