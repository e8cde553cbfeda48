use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};

use super::{BuyOutcome, PositionLifecycleManager, PriceIngestor};
use crate::api::MarketGateway;
use crate::error::AnalysisError;
use crate::models::{Signal, TradingPair};
use crate::persistence::{PriceStore, SettingsSource, SwapJournal};
use crate::strategy::{gate, SignalAnalyzer};

const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_RETENTION_HOURS: i64 = 48;
const PRUNE_PERIOD_SECS: u64 = 3600;

/// What one tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub pairs: usize,
    pub prices_stored: usize,
    pub buys: usize,
    pub sells: usize,
}

/// The per-tick control loop
///
/// Pairs are processed one after another inside a tick and ticks never
/// overlap, so the open-position and window counts read by a buy always
/// include the positions opened earlier in the same run.
pub struct TradingEngine {
    settings: Arc<dyn SettingsSource>,
    prices: Arc<dyn PriceStore>,
    journal: Arc<dyn SwapJournal>,
    ingestor: PriceIngestor,
    analyzer: SignalAnalyzer,
    lifecycle: Option<PositionLifecycleManager>, // None: signals are only logged
    tick_interval: Duration,
    retention: ChronoDuration,
}

impl TradingEngine {
    pub fn new(
        settings: Arc<dyn SettingsSource>,
        prices: Arc<dyn PriceStore>,
        journal: Arc<dyn SwapJournal>,
        market: Arc<dyn MarketGateway>,
        lifecycle: Option<PositionLifecycleManager>,
    ) -> Self {
        Self {
            settings,
            ingestor: PriceIngestor::new(market, prices.clone()),
            analyzer: SignalAnalyzer::new(prices.clone()),
            prices,
            journal,
            lifecycle,
            tick_interval: DEFAULT_TICK_INTERVAL,
            retention: ChronoDuration::hours(DEFAULT_RETENTION_HOURS),
        }
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    pub fn with_price_retention(mut self, hours: i64) -> Self {
        self.retention = ChronoDuration::hours(hours);
        self
    }

    pub fn is_read_only(&self) -> bool {
        self.lifecycle.is_none()
    }

    /// Tick until `shutdown` resolves
    ///
    /// Shutdown is only observed between ticks; a tick in flight always
    /// runs to completion.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let prune_every = (PRUNE_PERIOD_SECS / self.tick_interval.as_secs().max(1)).max(1);
        let mut tick_count = 0u64;

        tracing::info!(
            "🔄 Trading loop starting: tick every {:?}{}",
            self.tick_interval,
            if self.is_read_only() { " (read-only)" } else { "" }
        );

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("⚠️  Shutdown requested, leaving trading loop");
                    break;
                }
                _ = ticker.tick() => {}
            }

            tick_count += 1;
            let summary = self.run_tick().await;
            tracing::debug!("Tick {} done: {:?}", tick_count, summary);

            if tick_count % prune_every == 0 {
                self.prune_history().await;
            }
        }
    }

    pub async fn run_tick(&self) -> TickSummary {
        self.run_tick_at(Utc::now()).await
    }

    /// One pass: journal report, ingestion, then every active pair in turn
    pub async fn run_tick_at(&self, now: DateTime<Utc>) -> TickSummary {
        let mut summary = TickSummary::default();

        self.report_unresolved_swaps().await;

        let pairs = match self.settings.active_pairs().await {
            Ok(pairs) => pairs,
            Err(e) => {
                tracing::warn!("Failed to load active pairs, skipping tick: {}", e);
                return summary;
            }
        };
        summary.pairs = pairs.len();

        if pairs.is_empty() {
            tracing::debug!("No active trading pairs");
            return summary;
        }

        summary.prices_stored = self.ingestor.ingest(&pairs).await;

        for pair in &pairs {
            self.process_pair(pair, now, &mut summary).await;
        }

        summary
    }

    async fn process_pair(&self, pair: &TradingPair, now: DateTime<Utc>, summary: &mut TickSummary) {
        let analysis = match self.analyzer.analyze_at(pair, now).await {
            Ok(analysis) => analysis,
            Err(AnalysisError::InsufficientData(e)) => {
                tracing::warn!("{}: waiting for more history ({})", pair.label(), e);
                return;
            }
            Err(e @ AnalysisError::NoPrice(_)) => {
                tracing::warn!("{}: {}", pair.label(), e);
                return;
            }
            Err(e) => {
                tracing::error!("{}: analysis failed: {}", pair.label(), e);
                return;
            }
        };

        let Some(signal) = gate(analysis.signal, &pair.settings) else {
            return;
        };

        let Some(lifecycle) = &self.lifecycle else {
            tracing::info!(
                "[READ-ONLY] {:?} signal on {} not dispatched: no wallet configured",
                signal,
                pair.label()
            );
            return;
        };

        match signal {
            Signal::Buy => match lifecycle.handle_buy(pair, &analysis, now).await {
                Ok(BuyOutcome::Opened(_)) => summary.buys += 1,
                Ok(_) => {}
                Err(e) => tracing::error!("[BUY] {} failed: {:#}", pair.label(), e),
            },
            Signal::Sell => match lifecycle.handle_sell(pair, &analysis).await {
                Ok(sells) => summary.sells += sells.len(),
                Err(e) => tracing::error!("[SELL] {} failed: {:#}", pair.label(), e),
            },
            Signal::Hold => {}
        }
    }

    async fn report_unresolved_swaps(&self) {
        match self.journal.unresolved().await {
            Ok(entries) => {
                for entry in entries {
                    tracing::error!(
                        signature = %entry.signature,
                        pair_id = entry.pair_id,
                        "Swap outcome unsettled, reconcile manually: {} (submitted {})",
                        entry.description,
                        entry.submitted_at
                    );
                }
            }
            Err(e) => tracing::warn!("Failed to read swap journal: {}", e),
        }
    }

    pub async fn prune_history(&self) -> usize {
        self.prune_history_at(Utc::now()).await
    }

    /// Drop stored prices older than the retention window for every traded token
    pub async fn prune_history_at(&self, now: DateTime<Utc>) -> usize {
        let pairs = match self.settings.active_pairs().await {
            Ok(pairs) => pairs,
            Err(e) => {
                tracing::warn!("Failed to load pairs for price cleanup: {}", e);
                return 0;
            }
        };

        let cutoff = now - self.retention;
        let token_ids: BTreeSet<i32> = pairs.iter().map(|p| p.target.id).collect();
        let mut removed = 0;

        for token_id in token_ids {
            match self.prices.prune_prices(token_id, cutoff).await {
                Ok(n) => removed += n,
                Err(e) => tracing::warn!("Failed to prune prices of token {}: {}", token_id, e),
            }
        }

        if removed > 0 {
            tracing::info!("🧹 Pruned {} prices older than {}", removed, cutoff);
        }
        removed
    }
}
