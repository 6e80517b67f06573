//! Tees an incoming message body into the PoW verifier and a temp file in
//! a single pass, then hands the result to the store.
//!
//! This replaces the reference protocol's `io.Pipe` plus writer goroutine:
//! a synchronous read-block/write/absorb loop has no second task whose
//! error can be silently dropped on the floor if the handler returns first.

#![deny(unsafe_code)]

mod error;

use std::fs::{self, File};
use std::io::{self, Read, Write};

pub use error::IngestError;

use relay_core::{PowCheck, PowParameters};
use relay_store::SkiplistStore;

/// Block size used for the read/write/absorb loop.
const BLOCK_SIZE: usize = 64 * 1024;

/// Headers needed to admit a message, already decoded to `&str`.
pub struct IngestRequest<'a> {
    pub nonce: &'a str,
    pub timestamp: &'a str,
    pub ttl: &'a str,
    pub recipient: &'a str,
}

/// Result of a successful admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The message was written to the store.
    Stored,
    /// A message with the same content hash was already present.
    Duplicate,
}

/// Reads `body` to completion, verifying proof of work over the exact bytes
/// persisted, and stores the result for `request.recipient` on success.
///
/// The temp file created along the way is always cleaned up before this
/// function returns, on every path (I/O error, bad PoW, duplicate, or
/// success) — callers never see a [`SkiplistStore::mktemp`] path to manage.
pub fn ingest<R: Read>(
    store: &SkiplistStore,
    params: PowParameters,
    request: IngestRequest<'_>,
    mut body: R,
) -> Result<IngestOutcome, IngestError> {
    let mut check = PowCheck::new(
        request.nonce,
        request.timestamp,
        request.ttl,
        request.recipient,
        params,
    )?;

    let temp_path = store.mktemp();
    let mut file = File::create(&temp_path)?;

    let mut buf = [0u8; BLOCK_SIZE];
    let write_result = loop {
        let n = match body.read(&mut buf) {
            Ok(0) => break Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => break Err(e),
        };
        if let Err(e) = file.write_all(&buf[..n]) {
            break Err(e);
        }
        check.absorb(&buf[..n]);
    };

    if let Err(e) = write_result {
        drop(file);
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }
    file.sync_all()?;
    drop(file);

    let outcome = match check.finalize() {
        Ok(o) => o,
        Err(e) => {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
    };

    match store.put_message_for(
        request.recipient,
        &outcome.body_hash,
        outcome.expiration,
        &temp_path,
    ) {
        Ok(true) => Ok(IngestOutcome::Stored),
        Ok(false) => {
            let _ = fs::remove_file(&temp_path);
            Ok(IngestOutcome::Duplicate)
        }
        Err(e) => {
            let _ = fs::remove_file(&temp_path);
            Err(e.into())
        }
    }
}
