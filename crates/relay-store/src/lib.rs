//! Content-addressed, per-recipient skiplist store on the filesystem.
//!
//! "Skiplist" is the reference protocol's historical name for the two-level
//! hash-bucketed directory layout below; it has no relation to the data
//! structure of the same name.

#![deny(unsafe_code)]

mod error;
mod index;
mod paths;
mod store;

pub use error::StoreError;
pub use index::ExpiryIndex;
pub use store::{MessageIter, SkiplistStore};
