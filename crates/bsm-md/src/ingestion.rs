//! The single reader of the upstream connection.
//!
//! Reads frames until cancelled or until the transport fails, classifies each
//! one, and routes trades to every sink registered for the trade's symbol.
//!
//! ```text
//! Idle ──run()──► Reading ──cancel / read error / decode error──► Closed
//! ```
//!
//! Fan-out pushes an independent clone of the trade into each sink's
//! unbounded queue, so a consumer that stops draining never stalls delivery
//! to the others, and every sink sees a symbol's trades in read order.

use std::sync::Arc;

use bsm_core::{Logger, Trade, WatchError};
use futures_util::StreamExt;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use crate::connection::ConnHandle;
use crate::correlator::RequestCorrelator;
use crate::protocol::{Frame, decode_frame};
use crate::registry::SubscriptionRegistry;

/// Lifecycle of the ingestion loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionState {
    Idle,
    Reading,
    Closed,
}

/// Reads the upstream connection and fans trades out.
pub struct IngestionLoop {
    conn: Arc<ConnHandle>,
    registry: Arc<SubscriptionRegistry>,
    correlator: Arc<RequestCorrelator>,
    log: Arc<dyn Logger>,
    state: IngestionState,
}

impl IngestionLoop {
    pub fn new(
        conn: Arc<ConnHandle>,
        registry: Arc<SubscriptionRegistry>,
        correlator: Arc<RequestCorrelator>,
        log: Arc<dyn Logger>,
    ) -> Self {
        Self { conn, registry, correlator, log, state: IngestionState::Idle }
    }

    pub fn state(&self) -> IngestionState {
        self.state
    }

    /// Run until `cancel` fires (returns `Ok`) or a fatal read/decode error
    /// occurs (returns it). The connection is closed on the way out either way.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), WatchError> {
        let Some(mut reader) = self.conn.take_reader().await else {
            return Err(WatchError::TransportRead("connection is already being read".into()));
        };

        self.state = IngestionState::Reading;
        let result = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    self.log.debug(format_args!("ingestion cancelled"));
                    break Ok(());
                }

                frame = reader.next() => {
                    if let Err(err) = self.handle(frame) {
                        break Err(err);
                    }
                }
            }
        };

        self.state = IngestionState::Closed;
        if self.conn.close().await {
            self.log.debug(format_args!("ws connection closed"));
        }
        result
    }

    fn handle(&self, frame: Option<Result<Message, tungstenite::Error>>) -> Result<(), WatchError> {
        match frame {
            Some(Ok(Message::Text(text))) => self.route(&text),
            Some(Ok(Message::Binary(data))) => {
                let text = std::str::from_utf8(&data).map_err(|e| WatchError::Decode {
                    raw: String::from_utf8_lossy(&data).into_owned(),
                    reason: e.to_string(),
                })?;
                self.route(text)
            }
            Some(Ok(Message::Close(frame))) => {
                let reason = frame.map(|f| f.reason.to_string()).unwrap_or_default();
                let msg = format!("connection closed by upstream {reason}");
                Err(WatchError::TransportRead(msg.trim_end().into()))
            }
            // tungstenite queues the Pong for a Ping itself.
            Some(Ok(_)) => Ok(()),
            Some(Err(err)) => Err(WatchError::TransportRead(err.to_string())),
            None => Err(WatchError::TransportRead("stream ended".into())),
        }
    }

    /// Decode one text payload and act on it.
    pub fn route(&self, text: &str) -> Result<(), WatchError> {
        match decode_frame(text)? {
            Frame::Trade(trade) => {
                self.dispatch(&trade);
            }
            Frame::Ack { id } => match self.correlator.acknowledge(id) {
                Some(symbol) => {
                    self.log.debug(format_args!("subscription {id} for '{symbol}' acknowledged"))
                }
                None => self.log.debug(format_args!("acknowledgement for unknown request {id}")),
            },
            Frame::Unrecognized => self.log.debug(format_args!("ignoring '{text}'")),
        }
        Ok(())
    }

    /// Deliver `trade` to every sink currently registered for its symbol.
    /// Returns how many sinks accepted it.
    ///
    /// Sinks whose consumer has gone away are dropped from the registry the
    /// first time a delivery to them fails.
    pub fn dispatch(&self, trade: &Trade) -> usize {
        let mut delivered = 0;
        let mut gone = false;
        for sink in self.registry.sinks_for(&trade.symbol) {
            if sink.send(trade.clone()).is_ok() {
                delivered += 1;
            } else {
                gone = true;
            }
        }
        if gone {
            let dropped = self.registry.prune_closed(&trade.symbol);
            self.log.debug(format_args!(
                "dropped {dropped} sink(s) for '{}': consumer is gone",
                trade.symbol
            ));
        }
        delivered
    }
}
