use thiserror::Error;

/// Failure surfaced by the PoW verifier.
///
/// The reference protocol collapses every admission failure (bad base64,
/// unparsable header, insufficient difficulty) into the single wire string
/// `bad-pow`; callers that need to distinguish causes for logging can match
/// on the source error via `std::error::Error::source`, but the HTTP surface
/// must not.
#[derive(Debug, Error)]
pub enum PowError {
    /// Nonce was not valid standard-alphabet base64.
    #[error("bad-pow")]
    BadNonceEncoding,
    /// `timestamp` or `ttl` header did not parse as a `u64`.
    #[error("bad-pow")]
    BadHeaderValue,
    /// `nonce_trials` is zero, which would divide by zero computing the target.
    #[error("bad-pow")]
    ZeroDifficulty,
    /// The computed trial hash did not beat the target.
    #[error("bad-pow")]
    InsufficientDifficulty,
}
