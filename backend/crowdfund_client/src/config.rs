//! Application configuration loaded from environment variables.

use std::time::Duration;

use crate::errors::{ClientError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Wallet gateway JSON-RPC endpoint
    pub rpc_url: String,
    /// Address of the deployed crowdfunding contract
    pub contract_address: String,
    /// Pinning endpoint used to upload campaign images
    pub asset_store_url: String,
    pub asset_store_api_key: Option<String>,
    pub asset_store_api_secret: Option<String>,
    /// Public gateway serving pinned content
    pub asset_gateway_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Timeout applied to every outbound HTTP request
    pub request_timeout_secs: u64,
    /// Upper bound on waiting for a transaction to confirm
    pub confirmation_timeout_secs: u64,
    /// Delay between two transaction status polls
    pub confirmation_poll_millis: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            rpc_url: env_var("RPC_URL").unwrap_or_else(|_| "http://127.0.0.1:8545".to_string()),
            contract_address: env_var("CONTRACT_ADDRESS").map_err(|_| {
                ClientError::Config(
                    "CONTRACT_ADDRESS environment variable is required".to_string(),
                )
            })?,
            asset_store_url: env_var("ASSET_STORE_URL").unwrap_or_else(|_| {
                "https://api.pinata.cloud/pinning/pinFileToIPFS".to_string()
            }),
            asset_store_api_key: env_var("ASSET_STORE_API_KEY").ok(),
            asset_store_api_secret: env_var("ASSET_STORE_API_SECRET").ok(),
            asset_gateway_url: env_var("ASSET_GATEWAY_URL")
                .unwrap_or_else(|_| "https://gateway.pinata.cloud".to_string()),
            api_port: parse_var("API_PORT", "3001")?,
            request_timeout_secs: parse_var("REQUEST_TIMEOUT_SECS", "30")?,
            confirmation_timeout_secs: parse_var("CONFIRMATION_TIMEOUT_SECS", "120")?,
            confirmation_poll_millis: parse_var("CONFIRMATION_POLL_MILLIS", "1500")?,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn confirmation_poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirmation_poll_millis)
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ClientError::Config(format!("Missing env var: {key}")))
}

fn parse_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T> {
    env_var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| ClientError::Config(format!("Invalid {key}")))
}
