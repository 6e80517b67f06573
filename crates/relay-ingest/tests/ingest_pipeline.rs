use std::fs;
use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use relay_core::{PowCheck, PowParameters};
use relay_ingest::{ingest, IngestError, IngestOutcome, IngestRequest};
use relay_store::SkiplistStore;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

fn mine_nonce(timestamp: &str, ttl: &str, recipient: &str, body: &[u8], params: PowParameters) -> String {
    for n in 0u64.. {
        let nonce = STANDARD.encode(n.to_be_bytes());
        let mut check = PowCheck::new(&nonce, timestamp, ttl, recipient, params).unwrap();
        check.absorb(body);
        if check.finalize_at(timestamp.parse().unwrap()).is_ok() {
            return nonce;
        }
    }
    unreachable!()
}

fn easy_params() -> PowParameters {
    PowParameters {
        nonce_trials: 1,
        byte_len: 1,
    }
}

#[test]
fn full_round_trip_through_the_store() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = SkiplistStore::open(dir.path())?;
    let params = PowParameters {
        nonce_trials: 1,
        byte_len: 1,
    };
    let body = b"integration body".to_vec();
    let nonce = mine_nonce("5000", "60", "carol", &body, params);

    let request = IngestRequest {
        nonce: &nonce,
        timestamp: "5000",
        ttl: "60",
        recipient: "carol",
    };
    let outcome = ingest(&store, params, request, Cursor::new(body.clone()))?;
    assert_eq!(outcome, IngestOutcome::Stored);

    let messages: Vec<_> = store.iter_all_for("carol")?.collect::<std::result::Result<_, _>>()?;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].data, body);
    Ok(())
}

#[test]
fn well_formed_request_is_stored() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = SkiplistStore::open(dir.path())?;
    let params = easy_params();
    let body = b"hello world".to_vec();
    let nonce = mine_nonce("1000", "3600", "alice", &body, params);

    let request = IngestRequest {
        nonce: &nonce,
        timestamp: "1000",
        ttl: "3600",
        recipient: "alice",
    };
    let outcome = ingest(&store, params, request, Cursor::new(body))?;
    assert_eq!(outcome, IngestOutcome::Stored);

    let messages: Vec<_> = store.iter_all_for("alice")?.collect::<std::result::Result<_, _>>()?;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].data, b"hello world");
    Ok(())
}

#[test]
fn bad_pow_leaves_no_temp_file_and_no_stored_message() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = SkiplistStore::open(dir.path())?;
    let params = PowParameters::default();
    let body = b"hello world".to_vec();

    let request = IngestRequest {
        nonce: "AAAAAAAAAAA=",
        timestamp: "1000",
        ttl: "3600",
        recipient: "alice",
    };
    let err = ingest(&store, params, request, Cursor::new(body)).unwrap_err();
    assert!(matches!(err, IngestError::Pow(_)));

    let leftover: Vec<_> = fs::read_dir(dir.path())?
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with("tmp-"))
        .collect();
    assert!(leftover.is_empty(), "temp file was not cleaned up");
    Ok(())
}

#[test]
fn duplicate_message_is_reported_and_cleaned_up() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = SkiplistStore::open(dir.path())?;
    let params = easy_params();
    let body = b"same body".to_vec();
    let nonce = mine_nonce("2000", "3600", "bob", &body, params);

    let request = |nonce: &str| IngestRequest {
        nonce,
        timestamp: "2000",
        ttl: "3600",
        recipient: "bob",
    };

    let first = ingest(&store, params, request(&nonce), Cursor::new(body.clone()))?;
    assert_eq!(first, IngestOutcome::Stored);

    let second = ingest(&store, params, request(&nonce), Cursor::new(body))?;
    assert_eq!(second, IngestOutcome::Duplicate);

    let messages: Vec<_> = store.iter_all_for("bob")?.collect::<std::result::Result<_, _>>()?;
    assert_eq!(messages.len(), 1);
    Ok(())
}
