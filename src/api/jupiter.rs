use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;

use super::{MarketGateway, Quote, SwapInstructions};
use crate::config::RetryPolicy;
use crate::error::GatewayError;
use crate::models::Token;

// Jupiter Swap API v1 + Price API v2
// Docs: https://dev.jup.ag/docs/swap-api/get-quote
pub const JUPITER_API_BASE: &str = "https://lite-api.jup.ag";

type JupiterRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Client for Jupiter aggregator API
///
/// Cloneable; all clones share the same rate limiter.
#[derive(Clone)]
pub struct JupiterClient {
    client: Client,
    base_url: String,
    slippage_bps: u16,
    retry: RetryPolicy,
    rate_limiter: Arc<JupiterRateLimiter>,
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    data: HashMap<String, Option<PriceEntry>>,
}

#[derive(Debug, Deserialize)]
struct PriceEntry {
    price: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    input_mint: String,
    in_amount: String,
    output_mint: String,
    out_amount: String,
    swap_usd_value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    swap_transaction: String,
    last_valid_block_height: Option<u64>,
}

fn parse_field<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, GatewayError> {
    value
        .parse()
        .map_err(|_| GatewayError::Decode(format!("invalid {}: {:?}", name, value)))
}

impl JupiterClient {
    /// # Arguments
    /// * `base_url` - API root, e.g. `https://lite-api.jup.ag`
    /// * `requests_per_minute` - Shared request budget across all endpoints
    /// * `slippage_bps` - Slippage tolerance in basis points (50 = 0.5%)
    /// * `retry` - Policy for transient failures of read endpoints
    pub fn new(
        base_url: impl Into<String>,
        requests_per_minute: u32,
        slippage_bps: u16,
        retry: RetryPolicy,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        let rpm = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            slippage_bps,
            retry,
            rate_limiter,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, GatewayError> {
        self.rate_limiter.until_ready().await;

        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    async fn fetch_prices_once(
        &self,
        quote: &Token,
        targets: &[Token],
    ) -> Result<HashMap<String, f64>, GatewayError> {
        let ids: Vec<&str> = targets.iter().map(|t| t.mint_address.as_str()).collect();
        let url = format!(
            "{}/price/v2?ids={}&vsToken={}",
            self.base_url,
            ids.join(","),
            quote.mint_address
        );

        let response: PriceResponse = self.get_json(&url).await?;

        let mut prices = HashMap::new();
        for (mint, entry) in response.data {
            match entry.and_then(|e| e.price) {
                Some(price) => {
                    prices.insert(mint, parse_field::<f64>("price", &price)?);
                }
                None => tracing::debug!("Jupiter returned no price for {}", mint),
            }
        }

        Ok(prices)
    }

    async fn fetch_quote_once(
        &self,
        from: &Token,
        to: &Token,
        amount: u64,
    ) -> Result<Quote, GatewayError> {
        let url = format!(
            "{}/swap/v1/quote?inputMint={}&outputMint={}&amount={}&slippageBps={}",
            self.base_url, from.mint_address, to.mint_address, amount, self.slippage_bps
        );

        self.rate_limiter.until_ready().await;
        let raw: serde_json::Value = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let response: QuoteResponse = serde_json::from_value(raw.clone())
            .map_err(|e| GatewayError::Decode(format!("quote: {}", e)))?;

        let swap_usd_value = response
            .swap_usd_value
            .as_deref()
            .ok_or_else(|| GatewayError::Decode("quote without swapUsdValue".to_string()))?;

        let quote = Quote {
            input_mint: response.input_mint,
            output_mint: response.output_mint,
            in_amount: parse_field("inAmount", &response.in_amount)?,
            out_amount: parse_field("outAmount", &response.out_amount)?,
            swap_usd_value: parse_field("swapUsdValue", swap_usd_value)?,
            raw,
        };

        tracing::debug!(
            "Jupiter quote {} {} -> {} {} (${:.4})",
            quote.in_amount,
            from.symbol,
            quote.out_amount,
            to.symbol,
            quote.swap_usd_value
        );

        Ok(quote)
    }
}

#[async_trait]
impl MarketGateway for JupiterClient {
    async fn get_price(
        &self,
        quote: &Token,
        targets: &[Token],
    ) -> Result<HashMap<String, f64>, GatewayError> {
        if targets.is_empty() {
            return Ok(HashMap::new());
        }

        self.retry
            .retry("Jupiter price request", move || self.fetch_prices_once(quote, targets))
            .await
    }

    async fn get_quote(
        &self,
        from: &Token,
        to: &Token,
        amount: u64,
    ) -> Result<Quote, GatewayError> {
        self.retry
            .retry("Jupiter quote request", move || self.fetch_quote_once(from, to, amount))
            .await
    }

    async fn build_swap(
        &self,
        quote: &Quote,
        wallet_public_key: &str,
    ) -> Result<SwapInstructions, GatewayError> {
        let url = format!("{}/swap/v1/swap", self.base_url);
        let body = serde_json::json!({
            "quoteResponse": quote.raw,
            "userPublicKey": wallet_public_key,
            "wrapAndUnwrapSol": true,
            "dynamicComputeUnitLimit": true,
        });

        // Not retried: a rebuilt swap must come from a fresh quote
        self.rate_limiter.until_ready().await;
        let response: SwapResponse = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(SwapInstructions {
            swap_transaction: response.swap_transaction,
            last_valid_block_height: response.last_valid_block_height,
        })
    }
}
