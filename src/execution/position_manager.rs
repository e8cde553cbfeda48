use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use super::{PendingSwap, TransactionExecutor};
use crate::error::ExecutionError;
use crate::models::{NewPosition, NewSell, Position, Sell, TradingPair, TransactionResult};
use crate::persistence::{JournalEntry, OrderStore, SwapJournal};
use crate::risk::{assess_buy, BuyContext, BuyEligibility, ExitDecision, ExitThresholds};
use crate::strategy::Analysis;

/// Result of handling one BUY signal
#[derive(Debug, Clone, PartialEq)]
pub enum BuyOutcome {
    Opened(Position),
    Rejected(BuyEligibility),
    Aborted, // no confirmed swap
}

/// Opens positions on BUY and closes them on stop-loss / take-profit
///
/// A position is open while no sell references it; that is always asked of
/// the order store, never tracked here. Every submitted swap is journaled
/// until its outcome is settled, and an unsettled swap blocks further trades
/// on what it touches.
pub struct PositionLifecycleManager {
    orders: Arc<dyn OrderStore>,
    journal: Arc<dyn SwapJournal>,
    executor: TransactionExecutor,
}

impl PositionLifecycleManager {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        journal: Arc<dyn SwapJournal>,
        executor: TransactionExecutor,
    ) -> Self {
        Self {
            orders,
            journal,
            executor,
        }
    }

    /// Buy path: guards, then swap, then persist
    pub async fn handle_buy(
        &self,
        pair: &TradingPair,
        analysis: &Analysis,
        now: DateTime<Utc>,
    ) -> anyhow::Result<BuyOutcome> {
        let settings = &pair.settings;
        let target_id = pair.target.id;

        let unsettled_swaps = self
            .journal
            .unresolved()
            .await
            .map_err(|e| anyhow::anyhow!("reading swap journal: {}", e))?
            .iter()
            .filter(|entry| entry.pair_id == pair.id)
            .count();
        let open_positions = self
            .orders
            .get_open_positions(target_id)
            .await
            .map_err(|e| anyhow::anyhow!("loading open positions: {}", e))?
            .len();
        let since = now - Duration::minutes(settings.window_minutes);
        let recent_positions = self
            .orders
            .get_recent_position_count(target_id, since)
            .await
            .map_err(|e| anyhow::anyhow!("counting recent positions: {}", e))?;

        let buy_price = analysis.latest_price * self.executor.market_fee();
        let eligibility = assess_buy(
            &BuyContext {
                open_positions,
                recent_positions,
                buy_price,
                window_mean: analysis.window_mean,
                unsettled_swaps,
            },
            settings,
        );

        if !eligibility.is_allowed() {
            tracing::info!("[BUY] {} skipped: {}", pair.label(), eligibility);
            return Ok(BuyOutcome::Rejected(eligibility));
        }

        let pending = match self
            .executor
            .try_buy(&pair.base, &pair.target, settings.buy_amount, analysis.latest_price)
            .await
        {
            Ok(pending) => pending,
            Err(e) => {
                tracing::error!("[BUY] {} aborted: {}", pair.label(), e);
                return Ok(BuyOutcome::Aborted);
            }
        };

        let description = format!(
            "BUY {} {} for {} raw {}",
            pair.target.to_ui(pending.amount_received),
            pair.target.symbol,
            pending.amount_sent,
            pair.base.symbol
        );
        let Some(result) = self.settle(pair, pending, description, None).await else {
            return Ok(BuyOutcome::Aborted);
        };

        let position = self
            .orders
            .create_position(NewPosition {
                base_token_id: pair.base.id,
                target_token_id: target_id,
                amount_spent: result.amount_sent,
                amount_received: result.amount_received,
                price: result.price,
            })
            .await
            .map_err(|e| anyhow::anyhow!("swap {} confirmed but position not stored: {}", result.signature, e))?;

        self.resolve(&result.signature).await;

        tracing::info!(
            "🟢 [BUY] Opened position {} on {}: {} {} at {:.6} (tx {})",
            position.id,
            pair.label(),
            pair.target.to_ui(position.amount_received),
            pair.target.symbol,
            position.price,
            result.signature
        );

        Ok(BuyOutcome::Opened(position))
    }

    /// Sell path: evaluate every open position against its exit bounds
    ///
    /// A failure on one position is logged and does not stop the others.
    pub async fn handle_sell(
        &self,
        pair: &TradingPair,
        analysis: &Analysis,
    ) -> anyhow::Result<Vec<Sell>> {
        let positions = self
            .orders
            .get_open_positions(pair.target.id)
            .await
            .map_err(|e| anyhow::anyhow!("loading open positions: {}", e))?;
        let in_flight: HashSet<Uuid> = self
            .journal
            .unresolved()
            .await
            .map_err(|e| anyhow::anyhow!("reading swap journal: {}", e))?
            .into_iter()
            .filter_map(|entry| entry.position_id)
            .collect();

        tracing::info!("[SELL] {} open positions on {}", positions.len(), pair.label());

        let sell_price_with_fee = analysis.latest_price / self.executor.market_fee();
        let mut sells = Vec::new();

        for position in positions {
            if in_flight.contains(&position.id) {
                tracing::warn!(
                    "[SELL] Position {} has an unsettled sell, skipping until reconciled",
                    position.id
                );
                continue;
            }

            match self
                .evaluate_position(pair, &position, analysis.latest_price, sell_price_with_fee)
                .await
            {
                Ok(Some(sell)) => sells.push(sell),
                Ok(None) => {}
                Err(e) => tracing::error!("[SELL] Closing position {} failed: {:#}", position.id, e),
            }
        }

        Ok(sells)
    }

    async fn evaluate_position(
        &self,
        pair: &TradingPair,
        position: &Position,
        latest_price: f64,
        sell_price_with_fee: f64,
    ) -> anyhow::Result<Option<Sell>> {
        let amount = pair.target.to_ui(position.amount_received);
        let entry_value = position.price * amount;
        let current_value = sell_price_with_fee * amount;

        let thresholds = ExitThresholds::new(entry_value, &pair.settings);
        let decision = thresholds.evaluate(current_value);

        tracing::info!(
            "[SELL] Position {}: entry {:.6}, now {:.6} (stop-loss {:.6}, take-profit {:.6}) => {:?}",
            position.id,
            entry_value,
            current_value,
            thresholds.stop_loss_value,
            thresholds.take_profit_value,
            decision
        );

        let min_acceptable_value = match decision {
            ExitDecision::Hold => return Ok(None),
            ExitDecision::StopLoss => 0.0,
            ExitDecision::TakeProfit => thresholds.take_profit_value,
        };

        let pending = match self
            .executor
            .try_sell(
                &pair.target,
                &pair.base,
                position.amount_received,
                latest_price,
                min_acceptable_value,
            )
            .await
        {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!("[SELL] Position {} stays open, retrying next tick: {}", position.id, e);
                return Ok(None);
            }
        };

        let description = format!(
            "SELL {} {} closing {} ({:?})",
            pair.target.to_ui(pending.amount_sent),
            pair.target.symbol,
            position.id,
            decision
        );
        let Some(result) = self.settle(pair, pending, description, Some(position.id)).await else {
            return Ok(None);
        };

        let sell = self
            .orders
            .create_sell(NewSell {
                buy_order_id: position.id,
                from_token_id: pair.target.id,
                to_token_id: pair.base.id,
                amount_sent: result.amount_sent,
                amount_received: result.amount_received,
                price: result.price,
            })
            .await
            .map_err(|e| anyhow::anyhow!("swap {} confirmed but sell not stored: {}", result.signature, e))?;

        self.resolve(&result.signature).await;

        tracing::info!(
            "🔴 [SELL] Closed position {} ({:?}): received {} {} (tx {})",
            position.id,
            decision,
            pair.base.to_ui(sell.amount_received),
            pair.base.symbol,
            result.signature
        );

        Ok(Some(sell))
    }

    /// Journal a submitted swap, then wait for its outcome
    ///
    /// A confirmed swap keeps its entry until the caller has persisted the
    /// order. A swap that failed or expired is resolved here. An unknown
    /// outcome stays journaled for reconciliation.
    async fn settle(
        &self,
        pair: &TradingPair,
        pending: PendingSwap,
        description: String,
        position_id: Option<Uuid>,
    ) -> Option<TransactionResult> {
        let signature = pending.signature.clone();
        let entry = JournalEntry {
            signature: signature.clone(),
            pair_id: pair.id,
            description,
            position_id,
            submitted_at: Utc::now(),
        };
        if let Err(e) = self.journal.record(entry).await {
            tracing::error!("Failed to journal swap {}: {}", signature, e);
        }

        match self.executor.confirm(pending).await {
            Ok(result) => Some(result),
            Err(ExecutionError::Unconfirmed(_)) => {
                tracing::error!(
                    signature = %signature,
                    pair_id = pair.id,
                    "Swap outcome unknown on {}, left for reconciliation",
                    pair.label()
                );
                None
            }
            Err(e) => {
                tracing::error!("Swap on {} did not land: {}", pair.label(), e);
                self.resolve(&signature).await;
                None
            }
        }
    }

    async fn resolve(&self, signature: &str) {
        if let Err(e) = self.journal.resolve(signature).await {
            tracing::warn!("Failed to resolve journal entry {}: {}", signature, e);
        }
    }
}
