use thiserror::Error;

use relay_core::PowError;
use relay_store::StoreError;

/// Failure surfaced by the ingest pipeline, already shaped for the
/// dispatcher's status-code mapping.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Reading the body or writing the temp file failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// The proof of work did not check out.
    #[error(transparent)]
    Pow(#[from] PowError),
    /// The store rejected the write for a reason other than duplication.
    #[error(transparent)]
    Store(#[from] StoreError),
}
