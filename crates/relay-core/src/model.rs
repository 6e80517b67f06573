use std::time::{SystemTime, UNIX_EPOCH};

/// Length in bytes of the SHA-512 message hash used as the content address.
pub const MESSAGE_HASH_LEN: usize = 64;

/// A stored message as handed between the store and the dispatcher.
///
/// `data` is carried as raw bytes throughout the core and store; only the
/// HTTP boundary decides how to render it as JSON (see `relay-server`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Content address: SHA-512 of `timestamp || ttl || recipient || body`.
    pub hash: [u8; MESSAGE_HASH_LEN],
    /// Absolute Unix-epoch second at which the message may be expired.
    pub expiration: u64,
    /// Opaque body bytes exactly as admitted.
    pub data: Vec<u8>,
}

/// Current wall-clock time as a Unix-epoch second count.
///
/// Centralized here so the PoW verifier and the store agree on what "now"
/// means without either depending on the other.
pub fn now_unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_secs()
}
