use thiserror::Error;

/// Failure surfaced by the skiplist store or its expiry index.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying filesystem operation failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// Could not acquire the index compaction lock within the backoff budget.
    #[error("timed out waiting for index.lock")]
    LockTimedOut,
}
