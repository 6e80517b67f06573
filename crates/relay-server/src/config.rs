use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use relay_core::PowParameters;

/// Process configuration for the relay, replacing the reference
/// implementation's bare positional `os.Args` and package-level PoW
/// constants with a real argument surface.
#[derive(Debug, Parser)]
#[command(name = "relay-server", about = "PoW-gated store-and-forward message relay")]
pub struct ServerArgs {
    /// Address to bind the HTTP listener to.
    #[arg(long, default_value = "0.0.0.0")]
    pub listen_address: IpAddr,

    /// Port to bind the HTTP listener to.
    #[arg(long, default_value_t = 8080)]
    pub listen_port: u16,

    /// Root directory of the skiplist store.
    #[arg(long, default_value = "./relay-data")]
    pub store_root: PathBuf,

    /// Interval, in seconds, between expiry ticks.
    #[arg(long, default_value_t = 10)]
    pub tick_interval_secs: u64,

    /// Required number of PoW trials (difficulty denominator).
    #[arg(long, default_value_t = 1000)]
    pub nonce_trials: u64,

    /// PoW byte-length scaling constant.
    #[arg(long, default_value_t = 2500)]
    pub pow_byte_len: u64,
}

impl ServerArgs {
    pub fn pow_parameters(&self) -> PowParameters {
        PowParameters {
            nonce_trials: self.nonce_trials,
            byte_len: self.pow_byte_len,
        }
    }
}
