use std::collections::BTreeMap;
use std::sync::Arc;

use crate::api::MarketGateway;
use crate::models::{Token, TradingPair};
use crate::persistence::PriceStore;

/// Samples market prices for the active pairs and appends them to the store
pub struct PriceIngestor {
    market: Arc<dyn MarketGateway>,
    prices: Arc<dyn PriceStore>,
}

impl PriceIngestor {
    pub fn new(market: Arc<dyn MarketGateway>, prices: Arc<dyn PriceStore>) -> Self {
        Self { market, prices }
    }

    /// One batched price request per quote token; returns how many prices were stored
    ///
    /// Failures are logged and never abort the tick: analysis still runs on
    /// the history already stored.
    pub async fn ingest(&self, pairs: &[TradingPair]) -> usize {
        let mut stored = 0;

        for (quote, targets) in group_by_quote(pairs) {
            let prices = match self.market.get_price(&quote, &targets).await {
                Ok(prices) => prices,
                Err(e) => {
                    tracing::warn!("Failed to fetch prices in {}: {}", quote.symbol, e);
                    continue;
                }
            };

            for target in &targets {
                let Some(&price) = prices.get(&target.mint_address) else {
                    tracing::warn!("No {} price for {}, skipping", quote.symbol, target.symbol);
                    continue;
                };

                match self.prices.create_price(target.id, price).await {
                    Ok(_) => {
                        stored += 1;
                        tracing::debug!("Stored {} price {:.6} {}", target.symbol, price, quote.symbol);
                    }
                    Err(e) => tracing::error!("Failed to store {} price: {}", target.symbol, e),
                }
            }
        }

        stored
    }
}

/// Distinct targets per quote token, in a stable order
fn group_by_quote(pairs: &[TradingPair]) -> Vec<(Token, Vec<Token>)> {
    let mut groups: BTreeMap<i32, (Token, Vec<Token>)> = BTreeMap::new();

    for pair in pairs {
        let (_, targets) = groups
            .entry(pair.base.id)
            .or_insert_with(|| (pair.base.clone(), Vec::new()));
        if !targets.iter().any(|t| t.id == pair.target.id) {
            targets.push(pair.target.clone());
        }
    }

    groups.into_values().collect()
}
