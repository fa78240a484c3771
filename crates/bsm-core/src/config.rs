//! Configuration parsing for the stream monitor.
//!
//! Settings may come from an optional JSON file. Every field is optional;
//! anything missing falls back to the public Binance trade stream.
//!
//! # Example config
//!
//! ```json
//! {
//!   "monitor": { "module_name": "bsm", "log_path": "/tmp/log" },
//!   "upstream": {
//!     "url": "wss://stream.binance.com:9443/ws",
//!     "origin": "https://stream.binance.com",
//!     "extra_headers": {}
//!   },
//!   "alerts": ["BTCUSDT>51000", "ETHUSDT>3000"]
//! }
//! ```

use std::collections::HashMap;

use anyhow::Context;
use serde::Deserialize;

use crate::ws::WsConnConfig;

/// Default upstream trade stream endpoint.
pub const DEFAULT_WS_URL: &str = "wss://stream.binance.com:9443/ws";

/// Origin presented during the WebSocket handshake.
pub const DEFAULT_ORIGIN: &str = "https://stream.binance.com";

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Module metadata (name, log path).
    #[serde(default)]
    pub monitor: Option<ModuleMeta>,

    /// Upstream endpoint settings.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Alert specifications (`SYMBOL>LIMIT`), appended to those given on the CLI.
    #[serde(default)]
    pub alerts: Vec<String>,
}

impl AppConfig {
    /// Returns the module name, defaulting to `"bsm"`.
    pub fn module_name(&self) -> String {
        self.monitor
            .as_ref()
            .and_then(|m| m.module_name.clone())
            .unwrap_or_else(|| "bsm".into())
    }

    /// Returns the log path.
    pub fn log_path(&self) -> Option<String> {
        self.monitor.as_ref().and_then(|m| m.log_path.clone())
    }
}

/// Module metadata block.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleMeta {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
}

/// Upstream WebSocket endpoint configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamConfig {
    /// Full WebSocket URL.
    pub url: Option<String>,

    /// `Origin` header value for the handshake.
    pub origin: Option<String>,

    /// Extra HTTP headers for the handshake.
    pub extra_headers: Option<HashMap<String, String>>,
}

impl UpstreamConfig {
    /// Config pointing at an explicit URL, everything else defaulted.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self { url: Some(url.into()), ..Default::default() }
    }

    pub fn effective_url(&self) -> String {
        self.url.clone().unwrap_or_else(|| DEFAULT_WS_URL.into())
    }

    pub fn effective_origin(&self) -> String {
        self.origin.clone().unwrap_or_else(|| DEFAULT_ORIGIN.into())
    }

    /// Build the dial configuration for the connection manager.
    pub fn to_conn_config(&self) -> WsConnConfig {
        let mut extra_headers = self.extra_headers.clone().unwrap_or_default();
        extra_headers.entry("Origin".into()).or_insert_with(|| self.effective_origin());
        WsConnConfig { url: self.effective_url(), extra_headers }
    }
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config '{}'", path.display()))?;
    let config: AppConfig = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config '{}'", path.display()))?;
    Ok(config)
}
