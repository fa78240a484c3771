//! Alert evaluation over a [`TradeSource`].
//!
//! Alerts are grouped by canonical symbol and each group gets one task. A
//! task owns one `watch` on the source and drains its trades, warning every
//! time a trade prints above an alert's limit.
//!
//! # Failure policy
//!
//! - A price that does not parse ends only that symbol's task; the error is
//!   logged and the other symbols keep running.
//! - A panic inside a `watch` call is logged and ends only that task.
//! - Any other error from a `watch` call is fatal: every sibling task is
//!   cancelled and [`AlertEvaluator::run`] returns that first error.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use bsm_core::{Alert, Logger, Trade, WatchError, canonical_symbol, same_symbol};
use bsm_md::{TradeSource, trade_channel};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// Evaluates alerts against the trades of a [`TradeSource`].
pub struct AlertEvaluator {
    source: Arc<dyn TradeSource>,
    log: Arc<dyn Logger>,
}

impl AlertEvaluator {
    pub fn new(source: Arc<dyn TradeSource>, log: Arc<dyn Logger>) -> Self {
        Self { source, log }
    }

    /// Watch every alerted symbol until `cancel` fires (`Ok`) or a watch
    /// fails fatally (returns the first such error).
    pub async fn run(
        &self,
        cancel: CancellationToken,
        alerts: Vec<Alert>,
    ) -> Result<(), WatchError> {
        let group_cancel = cancel.child_token();
        let mut tasks = JoinSet::new();

        for (symbol, alerts) in group_by_symbol(alerts) {
            let source = Arc::clone(&self.source);
            let log = Arc::clone(&self.log);
            let cancel = group_cancel.clone();
            tasks.spawn(async move {
                let result = watch_symbol(source, Arc::clone(&log), cancel, &symbol, alerts).await;
                (symbol, result)
            });
        }

        let mut first_err = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((symbol, Err(err))) if err.is_symbol_local() => {
                    self.log.error(format_args!("alerts for '{symbol}' stopped: {err}"));
                }
                Ok((_, Err(err))) => {
                    if first_err.is_none() {
                        group_cancel.cancel();
                        first_err = Some(err);
                    }
                }
                Err(err) => self.log.error(format_args!("alert task failed: {err}")),
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Group alerts by canonical symbol, keeping their input order per group.
pub fn group_by_symbol(alerts: Vec<Alert>) -> BTreeMap<String, Vec<Alert>> {
    let mut groups: BTreeMap<String, Vec<Alert>> = BTreeMap::new();
    for alert in alerts {
        groups.entry(canonical_symbol(alert.symbol())).or_default().push(alert);
    }
    groups
}

/// Parse a trade's price.
pub fn parse_price(trade: &Trade) -> Result<f64, WatchError> {
    fast_float2::parse::<f64, _>(trade.price.as_str()).map_err(|_| WatchError::PriceParse {
        symbol: trade.symbol.clone(),
        price: trade.price.clone(),
    })
}

/// Check `trade` against `alerts`, warning for each one it triggers.
/// Returns how many fired.
pub fn evaluate(log: &dyn Logger, alerts: &[Alert], trade: &Trade) -> Result<usize, WatchError> {
    let price = parse_price(trade)?;
    let mut fired = 0;
    for alert in alerts.iter().filter(|a| same_symbol(a.symbol(), &trade.symbol)) {
        if alert.is_triggered_by(price) {
            log.warn(format_args!(
                "{} price exceeded {}: {}",
                alert.symbol(),
                alert.limit(),
                price
            ));
            fired += 1;
        }
    }
    Ok(fired)
}

async fn watch_symbol(
    source: Arc<dyn TradeSource>,
    log: Arc<dyn Logger>,
    cancel: CancellationToken,
    symbol: &str,
    alerts: Vec<Alert>,
) -> Result<(), WatchError> {
    let (tx, mut rx) = trade_channel();
    let mut watch = {
        let symbol = symbol.to_string();
        tokio::spawn(async move { source.watch(cancel, &symbol, tx).await })
    };

    loop {
        tokio::select! {
            biased;

            Some(trade) = rx.recv() => {
                if let Err(err) = evaluate(&*log, &alerts, &trade) {
                    watch.abort();
                    return Err(err);
                }
            }

            joined = &mut watch => {
                return match joined {
                    Ok(result) => result,
                    Err(err) => {
                        log_join_error(&*log, symbol, err);
                        Ok(())
                    }
                };
            }
        }
    }
}

fn log_join_error(log: &dyn Logger, symbol: &str, err: JoinError) {
    if err.is_panic() {
        let payload = err.into_panic();
        let msg = panic_message(payload.as_ref());
        log.error(format_args!("panic while watching '{symbol}': {msg}"));
    } else {
        log.error(format_args!("watch for '{symbol}' aborted: {err}"));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use bsm_core::logging::{Level, MemoryLogger};
    use bsm_md::TradeSink;

    use super::*;

    /// Source that replays canned trades per symbol, then blocks until cancelled.
    #[derive(Default)]
    struct ScriptedSource {
        trades: HashMap<String, Vec<Trade>>,
        fail: HashMap<String, WatchError>,
        panic_on: Option<String>,
        watched: Mutex<Vec<String>>,
    }

    impl ScriptedSource {
        fn with_trades(mut self, symbol: &str, trades: &[(&str, &str)]) -> Self {
            self.trades
                .entry(canonical_symbol(symbol))
                .or_default()
                .extend(trades.iter().map(|(s, p)| Trade::new(*s, *p)));
            self
        }

        fn watched(&self) -> Vec<String> {
            self.watched.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TradeSource for ScriptedSource {
        async fn watch(
            &self,
            cancel: CancellationToken,
            symbol: &str,
            sink: TradeSink,
        ) -> Result<(), WatchError> {
            let key = canonical_symbol(symbol);
            self.watched.lock().unwrap().push(key.clone());
            if self.panic_on.as_deref() == Some(key.as_str()) {
                panic!("boom");
            }
            for trade in self.trades.get(&key).into_iter().flatten() {
                let _ = sink.send(trade.clone());
            }
            if let Some(err) = self.fail.get(&key) {
                return Err(err.clone());
            }
            cancel.cancelled().await;
            Ok(())
        }
    }

    fn alerts(specs: &[&str]) -> Vec<Alert> {
        bsm_core::parse_alerts(specs).unwrap()
    }

    async fn eventually(mut cond: impl FnMut() -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn spawn_run(
        source: Arc<ScriptedSource>,
        log: Arc<MemoryLogger>,
        cancel: &CancellationToken,
        alerts: Vec<Alert>,
    ) -> tokio::task::JoinHandle<Result<(), WatchError>> {
        let cancel = cancel.clone();
        tokio::spawn(async move { AlertEvaluator::new(source, log).run(cancel, alerts).await })
    }

    #[test]
    fn fires_only_above_limit() {
        let log = MemoryLogger::new();
        let alerts = alerts(&["BTCUSDT>51000"]);

        assert_eq!(evaluate(&log, &alerts, &Trade::new("BTCUSDT", "51000.01")).unwrap(), 1);
        assert_eq!(evaluate(&log, &alerts, &Trade::new("BTCUSDT", "51000")).unwrap(), 0);
        assert_eq!(evaluate(&log, &alerts, &Trade::new("BTCUSDT", "50999.99")).unwrap(), 0);
        assert_eq!(log.lines(Level::Warn), vec!["BTCUSDT price exceeded 51000: 51000.01"]);
    }

    #[test]
    fn matching_ignores_case_and_other_symbols() {
        let log = MemoryLogger::new();
        let alerts = alerts(&["btcusdt>100", "BTCUSDT>200", "ETHUSDT>1"]);

        assert_eq!(evaluate(&log, &alerts, &Trade::new("BTCUSDT", "150")).unwrap(), 1);
        assert_eq!(evaluate(&log, &alerts, &Trade::new("BTCUSDT", "250")).unwrap(), 2);
    }

    #[test]
    fn bad_price_is_price_parse_error() {
        let log = MemoryLogger::new();
        let trade = Trade::new("BTCUSDT", "not-a-number");
        let err = evaluate(&log, &alerts(&["BTCUSDT>1"]), &trade).unwrap_err();
        let expected =
            WatchError::PriceParse { symbol: "BTCUSDT".into(), price: "not-a-number".into() };
        assert_eq!(err, expected);
    }

    #[test]
    fn grouping_is_case_insensitive() {
        let groups = group_by_symbol(alerts(&["btcusdt>1", "ETHUSDT>2", "BTCUSDT>3"]));
        assert_eq!(groups.keys().collect::<Vec<_>>(), vec!["btcusdt", "ethusdt"]);
        assert_eq!(groups["btcusdt"].iter().map(Alert::limit).collect::<Vec<_>>(), vec![1.0, 3.0]);
    }

    #[tokio::test]
    async fn scenario_btc_fires_eth_does_not() {
        let source = Arc::new(
            ScriptedSource::default()
                .with_trades("BTCUSDT", &[("BTCUSDT", "51050.5"), ("BTCUSDT", "50999.99")])
                .with_trades("ETHUSDT", &[("ETHUSDT", "2999.99")]),
        );
        let log = Arc::new(MemoryLogger::new());
        let cancel = CancellationToken::new();
        let alerts = alerts(&["BTCUSDT>51000", "ETHUSDT>3000"]);
        let run = spawn_run(Arc::clone(&source), Arc::clone(&log), &cancel, alerts);

        eventually(|| source.watched().len() == 2).await;
        eventually(|| log.lines(Level::Warn).len() == 1).await;
        cancel.cancel();

        assert_eq!(run.await.unwrap(), Ok(()));
        assert_eq!(log.lines(Level::Warn), vec!["BTCUSDT price exceeded 51000: 51050.5"]);
    }

    #[tokio::test]
    async fn one_watch_per_distinct_symbol() {
        let source = Arc::new(ScriptedSource::default());
        let log = Arc::new(MemoryLogger::new());
        let cancel = CancellationToken::new();
        let alerts = alerts(&["btcusdt>1", "BTCUSDT>2", "ETHUSDT>3"]);
        let run = spawn_run(Arc::clone(&source), log, &cancel, alerts);

        eventually(|| source.watched().len() == 2).await;
        cancel.cancel();
        assert_eq!(run.await.unwrap(), Ok(()));

        let mut watched = source.watched();
        watched.sort();
        assert_eq!(watched, vec!["btcusdt", "ethusdt"]);
    }

    #[tokio::test]
    async fn bad_price_stops_only_its_symbol() {
        let source = Arc::new(
            ScriptedSource::default()
                .with_trades("BTCUSDT", &[("BTCUSDT", "not-a-number"), ("BTCUSDT", "99999")])
                .with_trades("ETHUSDT", &[("ETHUSDT", "3500")]),
        );
        let log = Arc::new(MemoryLogger::new());
        let cancel = CancellationToken::new();
        let alerts = alerts(&["BTCUSDT>51000", "ETHUSDT>3000"]);
        let run = spawn_run(Arc::clone(&source), Arc::clone(&log), &cancel, alerts);

        eventually(|| !log.lines(Level::Error).is_empty()).await;
        eventually(|| log.lines(Level::Warn).len() == 1).await;
        assert!(!run.is_finished());

        let errors = log.lines(Level::Error);
        assert!(errors[0].contains("alerts for 'btcusdt' stopped"), "{errors:?}");
        assert!(errors[0].contains("not-a-number"), "{errors:?}");
        assert_eq!(log.lines(Level::Warn), vec!["ETHUSDT price exceeded 3000: 3500"]);

        cancel.cancel();
        assert_eq!(run.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn fatal_watch_error_cancels_siblings() {
        let mut source = ScriptedSource::default();
        source.fail.insert("ethusdt".into(), WatchError::TransportRead("stream ended".into()));
        let source = Arc::new(source);
        let log = Arc::new(MemoryLogger::new());
        let cancel = CancellationToken::new();
        let run = spawn_run(Arc::clone(&source), log, &cancel, alerts(&["BTCUSDT>1", "ETHUSDT>1"]));

        let result = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result, Err(WatchError::TransportRead("stream ended".into())));
        assert!(!cancel.is_cancelled(), "only the evaluation's own token is cancelled");
    }

    #[tokio::test]
    async fn panicking_watch_is_logged_not_propagated() {
        let source = Arc::new(ScriptedSource {
            panic_on: Some("btcusdt".into()),
            ..ScriptedSource::default().with_trades("ETHUSDT", &[("ETHUSDT", "3500")])
        });
        let log = Arc::new(MemoryLogger::new());
        let cancel = CancellationToken::new();
        let alerts = alerts(&["BTCUSDT>1", "ETHUSDT>3000"]);
        let run = spawn_run(Arc::clone(&source), Arc::clone(&log), &cancel, alerts);

        let panicked = |l: &String| l.contains("panic while watching 'btcusdt': boom");
        eventually(|| log.lines(Level::Error).iter().any(panicked)).await;
        eventually(|| log.lines(Level::Warn).len() == 1).await;
        assert!(!run.is_finished());

        cancel.cancel();
        assert_eq!(run.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn no_alerts_returns_immediately() {
        let source = Arc::new(ScriptedSource::default());
        let log = Arc::new(MemoryLogger::new());
        let evaluator = AlertEvaluator::new(source, log);
        let result = evaluator.run(CancellationToken::new(), Vec::new()).await;
        assert_eq!(result, Ok(()));
    }
}
