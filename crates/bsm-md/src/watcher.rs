//! The trade stream multiplexer.
//!
//! [`TradeWatcher`] ties the connection manager, request correlator,
//! subscription registry, and ingestion loop together. One task runs
//! [`TradeWatcher::start`]; any number of tasks call
//! [`TradeWatcher::watch`] concurrently, each blocking until the shared
//! cancellation fires or ingestion stops for good.

use std::sync::Arc;

use async_trait::async_trait;
use bsm_core::ws::WsConnConfig;
use bsm_core::{Logger, WatchError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::TradeSource;
use crate::connection::{ConnHandle, ConnectionManager};
use crate::correlator::RequestCorrelator;
use crate::ingestion::IngestionLoop;
use crate::protocol::build_subscribe;
use crate::registry::{SubscriptionRegistry, TradeSink};

/// Whether ingestion is still able to deliver trades.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatcherState {
    /// Not started yet, or reading.
    Active,
    /// Ingestion stopped because it was cancelled.
    Stopped,
    /// Ingestion stopped on a fatal error.
    Failed(WatchError),
}

impl WatcherState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WatcherState::Active)
    }
}

/// Multiplexes one upstream connection across many trade consumers.
pub struct TradeWatcher {
    connections: ConnectionManager,
    correlator: Arc<RequestCorrelator>,
    registry: Arc<SubscriptionRegistry>,
    log: Arc<dyn Logger>,
    state: watch::Sender<WatcherState>,
}

impl TradeWatcher {
    /// Create a watcher. Nothing is dialed until `start` or the first `watch`.
    pub fn new(config: WsConnConfig, log: Arc<dyn Logger>) -> Self {
        Self {
            connections: ConnectionManager::new(config, Arc::clone(&log)),
            correlator: Arc::new(RequestCorrelator::new()),
            registry: Arc::new(SubscriptionRegistry::new()),
            log,
            state: watch::Sender::new(WatcherState::Active),
        }
    }

    /// Run the ingestion loop until `cancel` fires or the upstream fails.
    ///
    /// Dial failure and transport/decode failures are returned and also
    /// published to every blocked `watch` caller. Cancelling while the dial is
    /// still in flight stops without error.
    pub async fn start(&self, cancel: CancellationToken) -> Result<(), WatchError> {
        let result = match self.dial(&cancel).await {
            Ok(Some(conn)) => {
                let mut ingestion = IngestionLoop::new(
                    conn,
                    Arc::clone(&self.registry),
                    Arc::clone(&self.correlator),
                    Arc::clone(&self.log),
                );
                ingestion.run(cancel).await
            }
            Ok(None) => {
                self.log.debug(format_args!("cancelled while dialing {}", self.connections.url()));
                Ok(())
            }
            Err(err) => Err(err),
        };

        self.state.send_replace(match &result {
            Ok(()) => WatcherState::Stopped,
            Err(err) => WatcherState::Failed(err.clone()),
        });
        result
    }

    /// Subscribe `sink` to `symbol`'s trades and block until `cancel` fires
    /// (returns `Ok`) or ingestion fails (returns the failure).
    ///
    /// Every call sends its own subscribe command, even when the symbol is
    /// already subscribed. A call whose token is already cancelled, or that
    /// finds the connection already shut down by ingestion, sends nothing and
    /// reports the ingestion outcome instead of a write error.
    pub async fn watch(
        &self,
        cancel: CancellationToken,
        symbol: &str,
        sink: TradeSink,
    ) -> Result<(), WatchError> {
        if cancel.is_cancelled() {
            return Ok(());
        }
        match self.state() {
            WatcherState::Failed(err) => return Err(err),
            WatcherState::Stopped => return Ok(()),
            WatcherState::Active => {}
        }
        let terminal = self.state.subscribe();

        let Some(conn) = self.dial(&cancel).await? else {
            return Ok(());
        };
        let request = self.correlator.issue(symbol);
        self.log.debug(format_args!("subscribing to {} (id={})", request.symbol, request.id));
        match conn.send_text(build_subscribe(&request.symbol, request.id)).await {
            Ok(()) => {
                self.registry.register(symbol, sink);
                self.log.debug(format_args!("new watcher for '{symbol}' created"));
            }
            Err(_) if conn.is_closed() => {
                self.log.debug(format_args!("connection closed before subscribing to '{symbol}'"));
            }
            Err(err) => return Err(err),
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                self.log.debug(format_args!("watcher for '{symbol}' stopped"));
                Ok(())
            }
            state = wait_terminal(terminal) => match state {
                WatcherState::Failed(err) => Err(err),
                _ => {
                    self.log.debug(format_args!("watcher for '{symbol}' stopped"));
                    Ok(())
                }
            },
        }
    }

    /// The shared connection, or `None` if `cancel` fired first.
    async fn dial(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<Arc<ConnHandle>>, WatchError> {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => Ok(None),
            conn = self.connections.connection() => conn.map(Some),
        }
    }

    /// Current ingestion state.
    pub fn state(&self) -> WatcherState {
        self.state.borrow().clone()
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn correlator(&self) -> &RequestCorrelator {
        &self.correlator
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }
}

async fn wait_terminal(mut rx: watch::Receiver<WatcherState>) -> WatcherState {
    match rx.wait_for(WatcherState::is_terminal).await {
        Ok(state) => (*state).clone(),
        Err(_) => WatcherState::Stopped,
    }
}

#[async_trait]
impl TradeSource for TradeWatcher {
    async fn watch(
        &self,
        cancel: CancellationToken,
        symbol: &str,
        sink: TradeSink,
    ) -> Result<(), WatchError> {
        TradeWatcher::watch(self, cancel, symbol, sink).await
    }
}
