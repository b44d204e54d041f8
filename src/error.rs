use crate::codec::DecodeError;

/// Crate error. `Clone` so a failed iterator can re-surface the same error
/// from every subsequent call (sticky status).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("transaction status lookup failed: {0}")]
    Status(String),

    #[error("iterator is not positioned on an entry")]
    NotPositioned,
}

pub type Result<T> = std::result::Result<T, Error>;
