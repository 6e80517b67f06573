//! PoW admission check and message model for the relay.
//!
//! This crate has no filesystem knowledge: it only verifies proof-of-work
//! against a streamed body and produces the content hash/expiration that the
//! store and ingest pipeline then act on.

#![deny(unsafe_code)]

mod error;
mod model;
mod pow;

pub use error::PowError;
pub use model::{now_unix_seconds, Message, MESSAGE_HASH_LEN};
pub use pow::{PowCheck, PowOutcome, PowParameters};
