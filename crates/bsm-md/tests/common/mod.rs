//! In-process fake of the upstream trade stream.
//!
//! Accepts WebSocket connections on `127.0.0.1:0`, records every text frame
//! the client sends (subscribe commands), counts close frames, and pushes
//! whatever frames the test scripts.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bsm_core::logging::MemoryLogger;
use bsm_core::ws::WsConnConfig;
use bsm_core::WatchError;
use bsm_md::{TradeStream, TradeWatcher, trade_channel};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

pub const WAIT: Duration = Duration::from_secs(5);

enum Outbound {
    Text(String),
    Close,
    Drop,
}

pub struct FakeUpstream {
    pub url: String,
    subscribes: mpsc::UnboundedReceiver<serde_json::Value>,
    outbound: mpsc::UnboundedSender<Outbound>,
    accepts: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl FakeUpstream {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        let (sub_tx, subscribes) = mpsc::unbounded_channel();
        let (outbound, out_rx) = mpsc::unbounded_channel();
        let accepts = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));

        tokio::spawn(serve(listener, Arc::clone(&accepts), Arc::clone(&closes), sub_tx, out_rx));

        Self { url, subscribes, outbound, accepts, closes }
    }

    pub fn push(&self, text: &str) {
        self.outbound.send(Outbound::Text(text.to_string())).unwrap();
    }

    pub fn push_trade(&self, symbol: &str, price: &str) {
        self.push(&format!(r#"{{"e":"trade","s":"{symbol}","p":"{price}"}}"#));
    }

    /// Send a close frame to the client.
    pub fn close(&self) {
        self.outbound.send(Outbound::Close).unwrap();
    }

    /// Drop the TCP connection without a closing handshake.
    pub fn drop_connection(&self) {
        self.outbound.send(Outbound::Drop).unwrap();
    }

    /// Next command the client sent.
    pub async fn next_subscribe(&mut self) -> serde_json::Value {
        tokio::time::timeout(WAIT, self.subscribes.recv())
            .await
            .expect("no subscribe received")
            .unwrap()
    }

    pub fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

async fn serve(
    listener: TcpListener,
    accepts: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    sub_tx: mpsc::UnboundedSender<serde_json::Value>,
    mut out_rx: mpsc::UnboundedReceiver<Outbound>,
) {
    loop {
        let Ok((stream, _)) = listener.accept().await else { return };
        accepts.fetch_add(1, Ordering::SeqCst);
        let Ok(ws) = tokio_tungstenite::accept_async(stream).await else { continue };
        let (mut write, mut read) = ws.split();

        loop {
            tokio::select! {
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(v) = serde_json::from_str(&text) {
                            let _ = sub_tx.send(v);
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        closes.fetch_add(1, Ordering::SeqCst);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => break,
                },
                out = out_rx.recv() => match out {
                    Some(Outbound::Text(text)) => {
                        let _ = write.send(Message::Text(text.into())).await;
                    }
                    Some(Outbound::Close) => {
                        let _ = write.send(Message::Close(None)).await;
                    }
                    Some(Outbound::Drop) | None => break,
                },
            }
        }
    }
}

/// Listener that accepts TCP connections and never answers the WebSocket
/// handshake. Returns its URL; accepted sockets are held open.
pub async fn spawn_stalled_upstream() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    url
}

/// A watcher pointed at `url`, with a recording logger.
pub fn watcher_for(url: &str) -> (Arc<TradeWatcher>, Arc<MemoryLogger>) {
    let log = Arc::new(MemoryLogger::new());
    let watcher = Arc::new(TradeWatcher::new(WsConnConfig::new(url), log.clone()));
    (watcher, log)
}

pub fn spawn_start(
    watcher: &Arc<TradeWatcher>,
    cancel: &CancellationToken,
) -> JoinHandle<Result<(), WatchError>> {
    let watcher = Arc::clone(watcher);
    let cancel = cancel.clone();
    tokio::spawn(async move { watcher.start(cancel).await })
}

pub fn spawn_watch(
    watcher: &Arc<TradeWatcher>,
    cancel: &CancellationToken,
    symbol: &str,
) -> (JoinHandle<Result<(), WatchError>>, TradeStream) {
    let watcher = Arc::clone(watcher);
    let cancel = cancel.clone();
    let symbol = symbol.to_string();
    let (tx, rx) = trade_channel();
    let handle = tokio::spawn(async move { watcher.watch(cancel, &symbol, tx).await });
    (handle, rx)
}

/// Poll `cond` until it holds, panicking after [`WAIT`].
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn recv(rx: &mut TradeStream) -> bsm_core::Trade {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("no trade received")
        .expect("sink closed")
}

pub async fn join<T>(handle: JoinHandle<T>) -> T {
    tokio::time::timeout(WAIT, handle).await.expect("task did not finish").unwrap()
}
