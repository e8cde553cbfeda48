pub mod jupiter;

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::GatewayError;
use crate::models::Token;

pub use jupiter::JupiterClient;

/// Priced offer for one swap, as returned by the exchange
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub input_mint: String,
    pub output_mint: String,
    pub in_amount: u64,       // raw units of the input token
    pub out_amount: u64,      // raw units of the output token
    pub swap_usd_value: f64,  // exchange's valuation of the swap in quote currency
    pub raw: serde_json::Value, // echoed back verbatim when building the swap
}

/// Unsigned swap transaction built by the exchange for our wallet
#[derive(Debug, Clone, PartialEq)]
pub struct SwapInstructions {
    pub swap_transaction: String, // base64 serialized versioned transaction
    pub last_valid_block_height: Option<u64>, // blockhash expiry, when the exchange reports it
}

/// Price and quote source
#[async_trait]
pub trait MarketGateway: Send + Sync {
    /// Prices of `targets` denominated in `quote`, keyed by mint address
    ///
    /// Targets the exchange has no price for are absent from the map.
    async fn get_price(
        &self,
        quote: &Token,
        targets: &[Token],
    ) -> Result<HashMap<String, f64>, GatewayError>;

    /// Quote for swapping `amount` raw units of `from` into `to`
    async fn get_quote(&self, from: &Token, to: &Token, amount: u64)
        -> Result<Quote, GatewayError>;

    /// Build the signable swap transaction for a quote
    async fn build_swap(
        &self,
        quote: &Quote,
        wallet_public_key: &str,
    ) -> Result<SwapInstructions, GatewayError>;
}
