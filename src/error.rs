//! Error types shared across the engine and its peripheral controllers.

use thiserror::Error;

/// Failure modes surfaced to callers of the engine, the CLI driver, and
/// the state/ROM/disk-image loaders.
#[derive(Error, Debug)]
pub enum Error {
    #[error("microcode error: {0}")]
    Microcode(String),

    #[error("interrupt scheduler invariant violated: {0}")]
    Scheduler(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid ROM size: expected {expected} bytes, got {actual} bytes")]
    InvalidRomSize { expected: usize, actual: usize },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, Error>;
