//! Configuration for the CashFlow402 gateway server (`spec.md` §6).
//!
//! CLI arguments via `clap::Parser`, each falling back to its environment
//! variable, matching the teacher's `config_defaults` fallback pattern.

use cashflow_core::keys::Network;
use cashflow_types::Sats;
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "cashflow-gateway")]
#[command(about = "CashFlow402 payment gateway HTTP server")]
pub struct Config {
    #[arg(long, env = "PORT", default_value_t = config_defaults::default_port())]
    pub port: u16,

    #[arg(long, env = "HOST", default_value_t = config_defaults::default_host())]
    pub host: IpAddr,

    #[arg(long, env = "BCH_NETWORK", default_value = "chipnet")]
    pub bch_network: String,

    #[arg(long, env = "ELECTRUM_HOST", default_value = "chipnet.bch.ninja")]
    pub electrum_host: String,

    #[arg(long, env = "ELECTRUM_PORT", default_value_t = 50004)]
    pub electrum_port: u16,

    #[arg(long, env = "ELECTRUM_PROTOCOL", default_value = "ssl")]
    pub electrum_protocol: String,

    #[arg(long, env = "MERCHANT_WIF")]
    pub merchant_wif: String,

    #[arg(long, env = "MERCHANT_ADDRESS")]
    pub merchant_address: String,

    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: String,

    #[arg(long, env = "JWT_EXPIRY_PERCALL", default_value_t = 60)]
    pub jwt_expiry_percall: u64,

    #[arg(long, env = "JWT_EXPIRY_SUBSCRIPTION", default_value_t = 3600)]
    pub jwt_expiry_subscription: u64,

    #[arg(long, env = "DEFAULT_PERCALL_RATE_SATS", default_value_t = 100)]
    pub default_percall_rate_sats: u64,

    #[arg(long, env = "DEFAULT_INTERVAL_BLOCKS", default_value_t = 144)]
    pub default_interval_blocks: u32,

    #[arg(long, env = "DEFAULT_AUTHORIZED_SATS", default_value_t = 100_000)]
    pub default_authorized_sats: u64,

    #[arg(long, env = "DEFAULT_DEPOSIT_SATS", default_value_t = 20_000)]
    pub default_deposit_sats: u64,

    #[arg(long, env = "JIT_THRESHOLD_SATS", default_value_t = 10_000)]
    pub jit_threshold_sats: u64,

    #[arg(long, env = "WEBHOOK_SECRET")]
    pub webhook_secret: Option<String>,

    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    #[arg(long, env = "VERIFY_URL_BASE", default_value = "http://localhost:8080/verify-payment")]
    pub verify_url_base: String,
}

impl Config {
    pub fn network(&self) -> Network {
        match self.bch_network.as_str() {
            "mainnet" => Network::Mainnet,
            _ => Network::Chipnet,
        }
    }

    pub fn default_percall_rate(&self) -> Sats {
        Sats::new(self.default_percall_rate_sats)
    }

    pub fn default_authorized_sats(&self) -> Sats {
        Sats::new(self.default_authorized_sats)
    }

    pub fn default_deposit_sats(&self) -> Sats {
        Sats::new(self.default_deposit_sats)
    }

    pub fn jit_threshold(&self) -> Sats {
        Sats::new(self.jit_threshold_sats)
    }

    pub fn subscriptions_path(&self) -> PathBuf {
        self.data_dir.join("subscriptions.json")
    }

    pub fn usage_path(&self) -> PathBuf {
        self.data_dir.join("usage.json")
    }
}

pub mod config_defaults {
    use std::env;
    use std::net::IpAddr;

    pub const DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_HOST: &str = "0.0.0.0";

    /// Returns the default port value with fallback: $PORT env var -> 8080
    pub fn default_port() -> u16 {
        env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    /// Returns the default host value with fallback: $HOST env var -> "0.0.0.0"
    pub fn default_host() -> IpAddr {
        env::var("HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(IpAddr::V4(DEFAULT_HOST.parse().unwrap()))
    }
}
