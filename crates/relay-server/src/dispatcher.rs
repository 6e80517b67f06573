//! Thin HTTP boundary: decodes headers, drives the ingest pipeline or the
//! store's iteration API, and maps library errors to the status table. No
//! business logic lives here.

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use http::{HeaderMap, Request, Response, StatusCode};
use http_body::Body;
use http_body_util::{BodyStream, Full};
use relay_core::PowParameters;
use relay_ingest::{ingest, IngestError, IngestOutcome, IngestRequest};
use relay_store::SkiplistStore;
use serde::Serialize;
use tokio::io::SyncIoBridge;
use tokio_util::io::StreamReader;
use tracing::{info, warn};

pub type ResponseBody = Full<Bytes>;

pub struct AppState {
    pub store: SkiplistStore,
    pub pow_params: PowParameters,
}

pub async fn handle<B>(
    state: Arc<AppState>,
    req: Request<B>,
) -> Result<Response<ResponseBody>, std::convert::Infallible>
where
    B: Body<Data = Bytes> + Send + Unpin + 'static,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let path = req.uri().path().to_owned();
    let response = match path.as_str() {
        "/store" => handle_store(state, req).await,
        "/retrieve" => handle_retrieve(state, &req),
        _ => empty_response(StatusCode::BAD_REQUEST),
    };
    Ok(response)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok()
}

/// Bridges a `Body`'s data frames into a synchronous [`io::Read`], so the
/// request body can be handed to `ingest()`'s block-wise read/write/absorb
/// loop without ever buffering more than one block at a time. Must be
/// constructed inside a `spawn_blocking` task: [`SyncIoBridge`] calls
/// `Handle::current()` to drive the underlying async stream from a blocking
/// thread.
fn sync_body_reader<B>(body: B) -> SyncIoBridge<StreamReader<impl futures_util::Stream<Item = io::Result<Bytes>>, Bytes>>
where
    B: Body<Data = Bytes> + Send + Unpin + 'static,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let frames = BodyStream::new(body)
        .map(|frame_result| -> Option<io::Result<Bytes>> {
            match frame_result {
                Ok(frame) => frame.into_data().ok().map(Ok),
                Err(e) => Some(Err(io::Error::new(io::ErrorKind::Other, e))),
            }
        })
        .filter_map(futures_util::future::ready);
    SyncIoBridge::new(StreamReader::new(frames))
}

async fn handle_store<B>(state: Arc<AppState>, req: Request<B>) -> Response<ResponseBody>
where
    B: Body<Data = Bytes> + Send + Unpin + 'static,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    // Missing headers are not rejected up front; an absent/empty nonce or a
    // non-numeric timestamp/ttl simply fails the PoW check below and comes
    // back as 403 bad-pow, matching the reference handler (which reads
    // headers permissively and lets `CheckPOW` reject malformed input).
    let headers = req.headers().clone();
    let nonce = header_str(&headers, "X-Loki-pow-nonce").unwrap_or("").to_owned();
    let timestamp = header_str(&headers, "X-Loki-timestamp").unwrap_or("").to_owned();
    let ttl = header_str(&headers, "X-Loki-ttl").unwrap_or("").to_owned();
    let recipient = header_str(&headers, "X-Loki-recipient").unwrap_or("").to_owned();

    let body = req.into_body();
    let pow_params = state.pow_params;

    // The read, the PoW absorb, and the temp-file write all happen inside
    // this single blocking task, one block at a time: the request body is
    // never resident in memory beyond whatever `ingest()`'s block size is.
    let result = tokio::task::spawn_blocking(move || {
        let reader = sync_body_reader(body);
        let request = IngestRequest {
            nonce: &nonce,
            timestamp: &timestamp,
            ttl: &ttl,
            recipient: &recipient,
        };
        ingest(&state.store, pow_params, request, reader)
    })
    .await
    .expect("ingest task panicked");

    match result {
        Ok(IngestOutcome::Stored) => {
            info!("message stored");
            json_response(StatusCode::OK, &StatusOk { status: "ok" })
        }
        Ok(IngestOutcome::Duplicate) => {
            text_response(StatusCode::CONFLICT, "duplicate hash")
        }
        Err(IngestError::Pow(e)) => {
            warn!(error = %e, "pow check failed");
            text_response(StatusCode::FORBIDDEN, "bad-pow")
        }
        Err(e) => {
            warn!(error = %e, "ingest failed");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

fn handle_retrieve<B>(state: Arc<AppState>, req: &Request<B>) -> Response<ResponseBody> {
    let headers = req.headers();
    let recipient = header_str(headers, "X-Loki-recipient").unwrap_or("");
    let last_hash_hex = header_str(headers, "X-Loki-last-hash").unwrap_or("");
    // A malformed hex string decodes to nothing and is treated the same as
    // an absent header, matching the reference handler's ignored-error hex
    // decode.
    let last_hash = hex::decode(last_hash_hex).ok().filter(|b| !b.is_empty());

    // A stale or unknown `lastHash` is not treated as "everything": matching
    // the reference handler, the lookup failure on the anchor message
    // propagates as a plain internal error rather than an empty result.
    let iter = match state
        .store
        .iter_since_hash_for(recipient, last_hash.as_deref())
    {
        Ok(iter) => iter,
        Err(e) => {
            warn!(error = %e, "retrieve iteration failed to start");
            return text_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
        }
    };

    let mut messages = Vec::new();
    for item in iter {
        match item {
            Ok(message) => messages.push(message),
            Err(e) => {
                warn!(error = %e, "retrieve iteration failed");
                return text_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error");
            }
        }
    }

    let last_hash = messages
        .iter()
        .max_by_key(|m| m.expiration)
        .map(|m| hex::encode(m.hash))
        .unwrap_or_else(|| last_hash_hex.to_owned());

    let wire_messages = messages
        .into_iter()
        .map(|m| WireMessage {
            hash: hex::encode(m.hash),
            expiration: m.expiration,
            // Matches the reference store's lossy byte-to-string cast: invalid
            // UTF-8 becomes U+FFFD rather than failing or escaping to base64.
            data: String::from_utf8_lossy(&m.data).into_owned(),
        })
        .collect();

    json_response(
        StatusCode::OK,
        &RetrieveResponse {
            messages: wire_messages,
            last_hash,
        },
    )
}

#[derive(Serialize)]
struct StatusOk {
    status: &'static str,
}

#[derive(Serialize)]
struct WireMessage {
    hash: String,
    expiration: u64,
    data: String,
}

#[derive(Serialize)]
struct RetrieveResponse {
    messages: Vec<WireMessage>,
    #[serde(rename = "lastHash")]
    last_hash: String,
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<ResponseBody> {
    let bytes = serde_json::to_vec(body).expect("response types are always serializable");
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(bytes)))
        .expect("response builder never fails for a well-formed status/body")
}

fn text_response(status: StatusCode, body: &str) -> Response<ResponseBody> {
    Response::builder()
        .status(status)
        .header("content-type", "text/plain")
        .body(Full::new(Bytes::from(body.to_owned())))
        .expect("response builder never fails for a well-formed status/body")
}

fn empty_response(status: StatusCode) -> Response<ResponseBody> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::new()))
        .expect("response builder never fails for a well-formed status/body")
}
