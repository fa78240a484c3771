//! Single WebSocket dial to the upstream endpoint.
//!
//! There is no reconnect loop here: the stream monitor establishes exactly one
//! connection per process and treats its loss as terminal. Splitting the
//! stream into reader and writer halves is left to the caller.

use std::collections::HashMap;

use futures_util::stream::{SplitSink, SplitStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tracing::debug;

use crate::error::WatchError;

/// A connected upstream stream (plain or TLS).
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Write half of a [`WsStream`].
pub type WsWriter = SplitSink<WsStream, Message>;

/// Read half of a [`WsStream`].
pub type WsReader = SplitStream<WsStream>;

/// Configuration for the upstream WebSocket connection.
#[derive(Debug, Clone)]
pub struct WsConnConfig {
    /// Full WebSocket URL (e.g. `wss://stream.binance.com:9443/ws`).
    pub url: String,
    /// Extra HTTP headers for the handshake (including `Origin`).
    pub extra_headers: HashMap<String, String>,
}

impl WsConnConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), extra_headers: HashMap::new() }
    }
}

/// Establish a WebSocket connection (TLS for `wss://`).
pub async fn connect_ws(config: &WsConnConfig) -> Result<WsStream, WatchError> {
    let connect_err = |reason: String| WatchError::Connect { url: config.url.clone(), reason };

    let parsed = url::Url::parse(&config.url).map_err(|e| connect_err(e.to_string()))?;
    if !matches!(parsed.scheme(), "ws" | "wss") {
        return Err(connect_err(format!("unsupported scheme '{}'", parsed.scheme())));
    }

    let mut request = config
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| connect_err(e.to_string()))?;

    for (key, value) in &config.extra_headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| connect_err(format!("bad header name '{key}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| connect_err(format!("bad header value for '{key}': {e}")))?;
        request.headers_mut().insert(name, value);
    }

    let (stream, response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| connect_err(e.to_string()))?;
    debug!("handshake with {} completed ({})", config.url, response.status());
    Ok(stream)
}
