//! Process bootstrap: argument parsing, logging, the accept loop, and the
//! expiry ticker.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use relay_store::SkiplistStore;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use relay_server::config::ServerArgs;
use relay_server::dispatcher::{self, AppState};
use relay_server::ticker;

#[tokio::main]
async fn main() {
    telemetry::init_json_logging();

    let args = ServerArgs::parse();
    let store = SkiplistStore::open(&args.store_root).unwrap_or_else(|e| {
        error!(error = %e, store_root = %args.store_root.display(), "failed to open store");
        std::process::exit(1);
    });

    let state = Arc::new(AppState {
        store,
        pow_params: args.pow_parameters(),
    });

    let addr = SocketAddr::new(args.listen_address, args.listen_port);
    let tick_interval = Duration::from_secs(args.tick_interval_secs);

    tokio::spawn(ticker::run(Arc::clone(&state), tick_interval));

    serve_forever(addr, state).await;
}

/// Retries bind-and-accept in a loop with a 1 s backoff on error, rather
/// than exiting the process (§7 "Fatal conditions: None at runtime").
async fn serve_forever(addr: SocketAddr, state: Arc<AppState>) {
    loop {
        if let Err(e) = accept_loop(addr, Arc::clone(&state)).await {
            warn!(error = %e, "listener failed, retrying in 1s");
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}

async fn accept_loop(addr: SocketAddr, state: Arc<AppState>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    loop {
        let (stream, _peer) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let state = Arc::clone(&state);

        tokio::spawn(async move {
            let service = service_fn(move |req| dispatcher::handle(Arc::clone(&state), req));
            if let Err(e) = hyper::server::conn::http1::Builder::new()
                .serve_connection(io, service)
                .await
            {
                warn!(error = %e, "connection error");
            }
        });
    }
}
