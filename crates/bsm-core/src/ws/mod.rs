//! WebSocket dialing for the upstream trade stream.

pub mod client;

pub use client::{WsConnConfig, WsReader, WsStream, WsWriter, connect_ws};
