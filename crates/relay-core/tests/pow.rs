use base64::{engine::general_purpose::STANDARD, Engine as _};
use proptest::prelude::*;

use relay_core::{PowCheck, PowError, PowParameters};

/// Brute-forces a nonce that satisfies the given parameters for a
/// given (timestamp, ttl, recipient, body) tuple. Only usable in tests:
/// real difficulty settings would make this impractically slow, which
/// is the point of PoW.
fn mine_nonce(timestamp: &str, ttl: &str, recipient: &str, body: &[u8], params: PowParameters) -> Vec<u8> {
    for n in 0u64.. {
        let nonce_bytes = n.to_le_bytes();
        let nonce = STANDARD.encode(nonce_bytes);
        let mut check = PowCheck::new(&nonce, timestamp, ttl, recipient, params).unwrap();
        check.absorb(body);
        if check.finalize_at(1_700_000_000).is_ok() {
            return nonce_bytes.to_vec();
        }
        if n > 2_000_000 {
            panic!("failed to mine a nonce within bound");
        }
    }
    unreachable!()
}

fn easy_params() -> PowParameters {
    // Low difficulty so tests mine a winning nonce quickly.
    PowParameters {
        nonce_trials: 1,
        byte_len: 1,
    }
}

#[test]
fn mined_nonce_is_admitted() {
    let params = easy_params();
    let nonce_bytes = mine_nonce("1700000000", "3600", "alice", b"hello", params);
    let nonce = STANDARD.encode(&nonce_bytes);
    let mut check = PowCheck::new(&nonce, "1700000000", "3600", "alice", params).unwrap();
    check.absorb(b"hello");
    let outcome = check.finalize_at(1_700_000_000).unwrap();
    assert_eq!(outcome.expiration, 1_700_000_000 + 3600);
}

#[test]
fn flipped_nonce_byte_is_rejected() {
    let params = easy_params();
    let mut nonce_bytes = mine_nonce("1700000000", "3600", "alice", b"hello", params);
    *nonce_bytes.last_mut().unwrap() ^= 0xFF;
    let nonce = STANDARD.encode(&nonce_bytes);
    let mut check = PowCheck::new(&nonce, "1700000000", "3600", "alice", params).unwrap();
    check.absorb(b"hello");
    let res = check.finalize_at(1_700_000_000);
    assert!(matches!(res, Err(PowError::InsufficientDifficulty)));
}

#[test]
fn bad_base64_nonce_is_rejected() {
    let params = easy_params();
    let res = PowCheck::new("not base64!!", "1700000000", "3600", "alice", params);
    assert!(matches!(res, Err(PowError::BadNonceEncoding)));
}

#[test]
fn non_numeric_ttl_is_rejected() {
    let params = easy_params();
    let res = PowCheck::new("AAAA", "1700000000", "not-a-number", "alice", params);
    assert!(matches!(res, Err(PowError::BadHeaderValue)));
}

#[test]
fn zero_nonce_trials_is_rejected() {
    let params = PowParameters {
        nonce_trials: 0,
        byte_len: 1,
    };
    let mut check = PowCheck::new("AAAA", "1700000000", "3600", "alice", params).unwrap();
    check.absorb(b"hello");
    let res = check.finalize_at(1_700_000_000);
    assert!(matches!(res, Err(PowError::ZeroDifficulty)));
}

#[test]
fn absorbing_in_multiple_chunks_matches_single_chunk() {
    let params = easy_params();
    let nonce_bytes = mine_nonce("1700000000", "3600", "alice", b"hello world", params);
    let nonce = STANDARD.encode(&nonce_bytes);

    let mut whole = PowCheck::new(&nonce, "1700000000", "3600", "alice", params).unwrap();
    whole.absorb(b"hello world");
    let whole_outcome = whole.finalize_at(1_700_000_000).unwrap();

    let mut chunked = PowCheck::new(&nonce, "1700000000", "3600", "alice", params).unwrap();
    chunked.absorb(b"hello");
    chunked.absorb(b" world");
    let chunked_outcome = chunked.finalize_at(1_700_000_000).unwrap();

    assert_eq!(whole_outcome.body_hash, chunked_outcome.body_hash);
}

proptest! {
    /// The difficulty formula's 128-bit saturating arithmetic must never
    /// panic, regardless of how an attacker picks `ttl`/`byte_len`/body
    /// length/`nonce_trials` — a panic here would be a remotely triggerable
    /// denial of service against the admission check itself.
    #[test]
    fn difficulty_arithmetic_never_panics(
        nonce_trials in any::<u64>(),
        byte_len in any::<u64>(),
        ttl in 0u64..100_000_000_000,
        body_len in 0usize..4096,
    ) {
        let params = PowParameters { nonce_trials, byte_len };
        let body = vec![0u8; body_len];
        let mut check = PowCheck::new("AAAA", "1700000000", &ttl.to_string(), "alice", params).unwrap();
        check.absorb(&body);
        // Either a clean error or a clean outcome; a panic is the failure mode under test.
        let _ = check.finalize_at(1_700_000_000);
    }

    /// Splitting the same body across arbitrary chunk boundaries must never
    /// change the resulting content hash — callers (the ingest pipeline)
    /// rely on this to tee the body to disk in blocks of their own choosing.
    #[test]
    fn chunking_never_changes_body_hash(
        body in prop::collection::vec(any::<u8>(), 0..512),
        split_points in prop::collection::vec(0usize..512, 0..8),
    ) {
        let params = easy_params();
        let mut whole = PowCheck::new("AAAA", "1700000000", "3600", "alice", params).unwrap();
        whole.absorb(&body);
        let whole_hash = match whole.finalize_at(1_700_000_000) {
            Ok(outcome) => outcome.body_hash,
            Err(_) => return Ok(()),
        };

        let mut bounds: Vec<usize> = split_points.into_iter().map(|p| p.min(body.len())).collect();
        bounds.push(0);
        bounds.push(body.len());
        bounds.sort_unstable();
        bounds.dedup();

        let mut chunked = PowCheck::new("AAAA", "1700000000", "3600", "alice", params).unwrap();
        for window in bounds.windows(2) {
            chunked.absorb(&body[window[0]..window[1]]);
        }
        let chunked_hash = chunked.finalize_at(1_700_000_000).unwrap().body_hash;

        prop_assert_eq!(whole_hash, chunked_hash);
    }
}
