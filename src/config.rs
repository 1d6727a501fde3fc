//! Process-wide configuration
//!
//! Read once at startup from environment variables (optionally backed
//! by a `.env` file). A missing or malformed `MASTER_KEY` is a
//! `ConfigError` and the process must refuse to start (spec §6.3,
//! §7).

use crate::error::{Error, Result};
use base64::Engine as _;
use std::env;

/// The 32-byte master key used to derive per-record envelope subkeys.
#[derive(Clone)]
pub struct MasterKey(pub [u8; 32]);

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// Process-wide configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub master_key: MasterKey,
    pub store_url: String,
    pub store_token: String,
    pub bind_addr: String,
    pub bind_port: u16,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads from `.env` file if present. Required variables:
    /// - `MASTER_KEY` (base64 of exactly 32 bytes)
    /// - `STORE_URL`, `STORE_TOKEN`
    ///
    /// Optional (with defaults):
    /// - `BIND_ADDR` (default: `0.0.0.0`)
    /// - `BIND_PORT` (default: `8080`)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let master_key_b64 =
            env::var("MASTER_KEY").map_err(|_| Error::Config("MASTER_KEY not set".into()))?;
        let master_key = parse_master_key(&master_key_b64)?;

        Ok(Self {
            master_key,
            store_url: env::var("STORE_URL")
                .map_err(|_| Error::Config("STORE_URL not set".into()))?,
            store_token: env::var("STORE_TOKEN")
                .map_err(|_| Error::Config("STORE_TOKEN not set".into()))?,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string()),
            bind_port: env::var("BIND_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|e| Error::Config(format!("Invalid BIND_PORT: {e}")))?,
        })
    }
}

fn parse_master_key(b64: &str) -> Result<MasterKey> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(b64.trim())
        .map_err(|e| Error::Config(format!("MASTER_KEY is not valid base64: {e}")))?;

    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|v: Vec<u8>| Error::Config(format!("MASTER_KEY must decode to exactly 32 bytes, got {}", v.len())))?;

    Ok(MasterKey(array))
}
