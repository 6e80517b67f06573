use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use base32::Alphabet;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// RFC 4648 base32 alphabet (`A-Z`, `2-7`), no padding. Wire-compatible with
/// the reference store's on-disk layout.
const ALPHABET: Alphabet = Alphabet::RFC4648 { padding: false };

/// The 32 top-level bucket names, pre-created at `Init()`.
pub fn bucket_names() -> [String; 32] {
    let mut names: [String; 32] = Default::default();
    for (i, c) in "ABCDEFGHIJKLMNOPQRSTUVWXYZ234567".chars().enumerate() {
        names[i] = c.to_string();
    }
    names
}

/// Splits `SHA-256(owner)`'s base32 encoding into the one-character bucket
/// and the remaining-character sub-bucket directory.
pub fn skiplist_for(owner: &str) -> (String, String) {
    let mut hasher = Sha256::new();
    hasher.update(owner.as_bytes());
    let digest = hasher.finalize();
    let encoded = base32::encode(ALPHABET, &digest);
    let (bucket, dir) = encoded.split_at(1);
    (bucket.to_string(), dir.to_string())
}

/// Base32-encodes a message hash to the filename used under `<bucket>/<dir>`.
pub fn encode_hash(hash: &[u8]) -> String {
    base32::encode(ALPHABET, hash)
}

/// Decodes a filename back into hash bytes; `None` if it is not valid
/// base32 for this alphabet (e.g. a stray non-message file).
pub fn decode_hash(name: &str) -> Option<Vec<u8>> {
    base32::decode(ALPHABET, name)
}

/// A fresh, collision-free temp-file path under `root`, of the form
/// `tmp-<unix_nanos>-<base32(5 random bytes)>`. Never collides with a
/// content-addressed file, which always lives two directories deep.
pub fn mktemp(root: &Path) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_nanos() as u64;
    let mut rand_bytes = [0u8; 5];
    rand::thread_rng().fill_bytes(&mut rand_bytes);
    let suffix = base32::encode(ALPHABET, &rand_bytes);
    root.join(format!("tmp-{nanos}-{suffix}"))
}
