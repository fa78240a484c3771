//! Upstream connection manager.
//!
//! Owns at most one WebSocket session for the lifetime of the process. The
//! session is dialed lazily by whichever caller needs it first; concurrent
//! callers queue on the same mutex so exactly one dial ever happens. A failed
//! dial is remembered and returned to every later caller, never retried.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bsm_core::Logger;
use bsm_core::error::WatchError;
use bsm_core::ws::{WsConnConfig, WsReader, WsWriter, connect_ws};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;

/// Shared handle to the open upstream session.
///
/// Subscribe commands serialize on the writer mutex. The reader half is
/// handed out once, to the ingestion loop.
pub struct ConnHandle {
    writer: Mutex<WsWriter>,
    reader: Mutex<Option<WsReader>>,
    closed: AtomicBool,
}

impl ConnHandle {
    fn new(writer: WsWriter, reader: WsReader) -> Self {
        Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(Some(reader)),
            closed: AtomicBool::new(false),
        }
    }

    /// Send a text frame (a subscribe command).
    pub async fn send_text(&self, text: String) -> Result<(), WatchError> {
        if self.is_closed() {
            return Err(WatchError::SubscribeWrite("connection already closed".into()));
        }
        self.writer
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| WatchError::SubscribeWrite(e.to_string()))
    }

    /// Take the read half. Returns `None` once it has been taken.
    pub async fn take_reader(&self) -> Option<WsReader> {
        self.reader.lock().await.take()
    }

    /// Close the session. Only the first call sends the close frame; returns
    /// whether this call was the one that closed it.
    pub async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        // The peer may already be gone; nothing useful to do with the error.
        let _ = self.writer.lock().await.close().await;
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

enum Slot {
    Empty,
    Open(Arc<ConnHandle>),
    Failed(WatchError),
}

/// Lazily-dialed, process-wide upstream connection.
pub struct ConnectionManager {
    config: WsConnConfig,
    log: Arc<dyn Logger>,
    slot: Mutex<Slot>,
    dials: AtomicUsize,
}

impl ConnectionManager {
    /// Create a manager (no connection opened yet).
    pub fn new(config: WsConnConfig, log: Arc<dyn Logger>) -> Self {
        Self {
            config,
            log,
            slot: Mutex::new(Slot::Empty),
            dials: AtomicUsize::new(0),
        }
    }

    /// Return the open connection, dialing it on first use.
    ///
    /// The create-if-absent check runs under the slot mutex, so racing callers
    /// wait for the single in-flight dial instead of starting their own.
    /// Dropping the future mid-dial leaves the slot empty.
    pub async fn connection(&self) -> Result<Arc<ConnHandle>, WatchError> {
        let mut slot = self.slot.lock().await;
        match &*slot {
            Slot::Open(handle) => return Ok(Arc::clone(handle)),
            Slot::Failed(err) => return Err(err.clone()),
            Slot::Empty => {}
        }

        self.dials.fetch_add(1, Ordering::Relaxed);
        match connect_ws(&self.config).await {
            Ok(stream) => {
                let (writer, reader) = stream.split();
                let handle = Arc::new(ConnHandle::new(writer, reader));
                self.log.debug(format_args!("new ws connection to {} created", self.config.url));
                *slot = Slot::Open(Arc::clone(&handle));
                Ok(handle)
            }
            Err(err) => {
                *slot = Slot::Failed(err.clone());
                Err(err)
            }
        }
    }

    /// The connection if it has already been opened, without dialing.
    pub async fn current(&self) -> Option<Arc<ConnHandle>> {
        match &*self.slot.lock().await {
            Slot::Open(handle) => Some(Arc::clone(handle)),
            _ => None,
        }
    }

    /// Number of dial attempts made so far (0 or 1).
    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::Relaxed)
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }
}
