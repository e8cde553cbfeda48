use std::sync::Arc;

use crate::api::{MarketGateway, Quote};
use crate::error::ExecutionError;
use crate::models::{Token, TransactionResult};
use crate::wallet::{Confirmation, WalletGateway};

/// Swap accepted by the RPC node but not yet confirmed
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSwap {
    pub signature: String,
    pub last_valid_block_height: Option<u64>,
    pub amount_sent: u64,
    pub amount_received: u64,
    pub price: f64,
}

impl PendingSwap {
    fn into_result(self) -> TransactionResult {
        TransactionResult {
            amount_sent: self.amount_sent,
            amount_received: self.amount_received,
            price: self.price,
            signature: self.signature,
        }
    }
}

/// Quote-validated swap execution
///
/// Every check runs before anything is submitted; a rejected attempt
/// leaves no trace and can simply be retried on the next tick. Submission
/// and confirmation are separate steps so callers can record the signature
/// while the outcome is still open.
pub struct TransactionExecutor {
    market: Arc<dyn MarketGateway>,
    wallet: Arc<dyn WalletGateway>,
    market_fee: f64, // multiplicative, e.g. 1.001
}

impl TransactionExecutor {
    pub fn new(market: Arc<dyn MarketGateway>, wallet: Arc<dyn WalletGateway>, market_fee: f64) -> Self {
        Self {
            market,
            wallet,
            market_fee,
        }
    }

    pub fn market_fee(&self) -> f64 {
        self.market_fee
    }

    /// Submit a buy of `amount` whole units of `to`, paying with `from`
    ///
    /// # Arguments
    /// * `reference_price` - Latest market price of `to` in `from`, before fees
    pub async fn try_buy(
        &self,
        from: &Token,
        to: &Token,
        amount: f64,
        reference_price: f64,
    ) -> Result<PendingSwap, ExecutionError> {
        let price_with_fee = reference_price * self.market_fee;
        let expected_spend = price_with_fee * amount;
        let expected_receive = to.to_raw(amount);
        let required_spend = from.to_raw(expected_spend);

        tracing::info!(
            "[BUY] Requesting quote: {:.6} {} for {} {} (price with fee {:.6})",
            expected_spend,
            from.symbol,
            amount,
            to.symbol,
            price_with_fee
        );

        let quote = self.market.get_quote(from, to, required_spend).await?;

        if quote.out_amount < expected_receive {
            return Err(ExecutionError::QuoteMismatch(format!(
                "would receive {} raw {}, expected at least {}",
                quote.out_amount, to.symbol, expected_receive
            )));
        }
        if quote.swap_usd_value > expected_spend {
            return Err(ExecutionError::QuoteMismatch(format!(
                "swap valued at {:.6}, expected at most {:.6}",
                quote.swap_usd_value, expected_spend
            )));
        }

        self.ensure_balance(from, quote.in_amount).await?;
        self.submit(&quote, price_with_fee).await
    }

    /// Submit a sell of `amount` raw units of `from` for `to`
    ///
    /// # Arguments
    /// * `reference_price` - Latest market price of `from` in `to`, before fees
    /// * `min_acceptable_value` - Lowest acceptable proceeds in `to`; 0 accepts any quote
    pub async fn try_sell(
        &self,
        from: &Token,
        to: &Token,
        amount: u64,
        reference_price: f64,
        min_acceptable_value: f64,
    ) -> Result<PendingSwap, ExecutionError> {
        let price_with_fee = reference_price / self.market_fee;

        tracing::info!(
            "[SELL] Requesting quote: {} {} at {:.6} (min proceeds {:.6} {})",
            from.to_ui(amount),
            from.symbol,
            price_with_fee,
            min_acceptable_value,
            to.symbol
        );

        let quote = self.market.get_quote(from, to, amount).await?;

        let min_receive = to.to_raw(min_acceptable_value);
        if quote.out_amount < min_receive {
            return Err(ExecutionError::QuoteMismatch(format!(
                "would receive {} raw {}, expected at least {}",
                quote.out_amount, to.symbol, min_receive
            )));
        }
        if min_acceptable_value > 0.0 && quote.swap_usd_value < min_acceptable_value {
            return Err(ExecutionError::QuoteMismatch(format!(
                "swap valued at {:.6}, expected at least {:.6}",
                quote.swap_usd_value, min_acceptable_value
            )));
        }

        self.ensure_balance(from, amount).await?;
        self.submit(&quote, price_with_fee).await
    }

    /// Wait for a submitted swap to settle
    ///
    /// Only a confirmed transaction yields a result; `Unconfirmed` means the
    /// swap may still land.
    pub async fn confirm(&self, pending: PendingSwap) -> Result<TransactionResult, ExecutionError> {
        match self
            .wallet
            .confirm_transaction(&pending.signature, pending.last_valid_block_height)
            .await
        {
            Confirmation::Confirmed => Ok(pending.into_result()),
            Confirmation::Failed(reason) => Err(ExecutionError::Failed(format!(
                "{}: {}",
                pending.signature, reason
            ))),
            Confirmation::Expired => Err(ExecutionError::Expired(pending.signature)),
            Confirmation::Unknown => Err(ExecutionError::Unconfirmed(pending.signature)),
        }
    }

    async fn ensure_balance(&self, token: &Token, required: u64) -> Result<(), ExecutionError> {
        let balance = self.wallet.get_balance(token).await?;
        let available = balance.available(token);

        if available < required {
            return Err(ExecutionError::InsufficientBalance {
                required,
                available,
            });
        }
        Ok(())
    }

    async fn submit(&self, quote: &Quote, price: f64) -> Result<PendingSwap, ExecutionError> {
        let instructions = self
            .market
            .build_swap(quote, &self.wallet.public_key())
            .await?;
        let signature = self.wallet.submit_transaction(&instructions).await?;

        Ok(PendingSwap {
            signature,
            last_valid_block_height: instructions.last_valid_block_height,
            amount_sent: quote.in_amount,
            amount_received: quote.out_amount,
            price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SwapInstructions;
    use crate::error::GatewayError;
    use crate::models::{NATIVE_SOL_MINT, USDC_MINT};
    use crate::wallet::{WalletBalance, NATIVE_FEE_RESERVE};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    struct ScriptedMarket {
        out_amount: u64,
        swap_usd_value: f64,
        fail: bool,
        requested: Mutex<Vec<u64>>,
    }

    impl ScriptedMarket {
        fn quoting(out_amount: u64, swap_usd_value: f64) -> Self {
            Self {
                out_amount,
                swap_usd_value,
                fail: false,
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MarketGateway for ScriptedMarket {
        async fn get_price(
            &self,
            _quote: &Token,
            _targets: &[Token],
        ) -> Result<HashMap<String, f64>, GatewayError> {
            Ok(HashMap::new())
        }

        async fn get_quote(&self, from: &Token, to: &Token, amount: u64) -> Result<Quote, GatewayError> {
            if self.fail {
                return Err(GatewayError::Decode("upstream unavailable".to_string()));
            }
            self.requested.lock().unwrap().push(amount);
            Ok(Quote {
                input_mint: from.mint_address.clone(),
                output_mint: to.mint_address.clone(),
                in_amount: amount,
                out_amount: self.out_amount,
                swap_usd_value: self.swap_usd_value,
                raw: serde_json::Value::Null,
            })
        }

        async fn build_swap(&self, _quote: &Quote, _key: &str) -> Result<SwapInstructions, GatewayError> {
            Ok(SwapInstructions {
                swap_transaction: "unsigned".to_string(),
                last_valid_block_height: Some(1_000),
            })
        }
    }

    struct ScriptedWallet {
        balance: WalletBalance,
        outcome: Confirmation,
        sent: Mutex<usize>,
        confirmed: Mutex<Vec<(String, Option<u64>)>>,
    }

    impl ScriptedWallet {
        fn holding(native_amount: u64, token_amount: Option<u64>) -> Self {
            Self {
                balance: WalletBalance {
                    native_amount,
                    token_amount,
                },
                outcome: Confirmation::Confirmed,
                sent: Mutex::new(0),
                confirmed: Mutex::new(Vec::new()),
            }
        }

        fn settling(outcome: Confirmation) -> Self {
            Self {
                outcome,
                ..Self::holding(0, Some(50_000_000))
            }
        }

        fn sent(&self) -> usize {
            *self.sent.lock().unwrap()
        }
    }

    #[async_trait]
    impl WalletGateway for ScriptedWallet {
        fn public_key(&self) -> String {
            "WalletPubkey111".to_string()
        }

        async fn get_balance(&self, _token: &Token) -> Result<WalletBalance, GatewayError> {
            Ok(self.balance)
        }

        async fn submit_transaction(&self, _instructions: &SwapInstructions) -> Result<String, GatewayError> {
            *self.sent.lock().unwrap() += 1;
            Ok("5xSignature".to_string())
        }

        async fn confirm_transaction(&self, signature: &str, last_valid_block_height: Option<u64>) -> Confirmation {
            self.confirmed
                .lock()
                .unwrap()
                .push((signature.to_string(), last_valid_block_height));
            self.outcome.clone()
        }
    }

    fn sol() -> Token {
        Token {
            id: 1,
            symbol: "SOL".to_string(),
            mint_address: NATIVE_SOL_MINT.to_string(),
            decimals: 9,
        }
    }

    fn usdc() -> Token {
        Token {
            id: 2,
            symbol: "USDC".to_string(),
            mint_address: USDC_MINT.to_string(),
            decimals: 6,
        }
    }

    fn executor(market: Arc<ScriptedMarket>, wallet: Arc<ScriptedWallet>) -> TransactionExecutor {
        TransactionExecutor::new(market, wallet, 1.001)
    }

    #[tokio::test]
    async fn test_buy_submits_quoted_amounts() {
        let market = Arc::new(ScriptedMarket::quoting(100_100_000, 20.0));
        let wallet = Arc::new(ScriptedWallet::holding(0, Some(50_000_000)));
        let executor = executor(market.clone(), wallet.clone());

        let pending = executor.try_buy(&usdc(), &sol(), 0.1, 200.0).await.unwrap();

        // 0.1 SOL at 200 * 1.001 = 20.02 USDC
        assert_eq!(market.requested.lock().unwrap()[0], usdc().to_raw(20.02));
        assert_eq!(pending.amount_received, 100_100_000);
        assert!((pending.price - 200.2).abs() < 1e-9);
        assert_eq!(pending.signature, "5xSignature");
        assert_eq!(pending.last_valid_block_height, Some(1_000));
        assert_eq!(wallet.sent(), 1);
        assert!(wallet.confirmed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_buy_rejects_under_delivery() {
        let market = Arc::new(ScriptedMarket::quoting(99_999_999, 20.0));
        let wallet = Arc::new(ScriptedWallet::holding(0, Some(50_000_000)));
        let executor = executor(market, wallet.clone());

        let result = executor.try_buy(&usdc(), &sol(), 0.1, 200.0).await;

        assert!(matches!(result, Err(ExecutionError::QuoteMismatch(_))));
        assert_eq!(wallet.sent(), 0);
    }

    #[tokio::test]
    async fn test_buy_rejects_overpriced_swap() {
        let market = Arc::new(ScriptedMarket::quoting(100_000_000, 20.5));
        let wallet = Arc::new(ScriptedWallet::holding(0, Some(50_000_000)));
        let executor = executor(market, wallet.clone());

        let result = executor.try_buy(&usdc(), &sol(), 0.1, 200.0).await;

        assert!(matches!(result, Err(ExecutionError::QuoteMismatch(_))));
        assert_eq!(wallet.sent(), 0);
    }

    #[tokio::test]
    async fn test_buy_requires_funds() {
        let market = Arc::new(ScriptedMarket::quoting(100_000_000, 20.0));
        let wallet = Arc::new(ScriptedWallet::holding(5_000_000_000, Some(1_000_000)));
        let executor = executor(market, wallet.clone());

        let result = executor.try_buy(&usdc(), &sol(), 0.1, 200.0).await;

        assert!(matches!(
            result,
            Err(ExecutionError::InsufficientBalance {
                available: 1_000_000,
                ..
            })
        ));
        assert_eq!(wallet.sent(), 0);
    }

    #[tokio::test]
    async fn test_quote_failure_is_transport() {
        let market = Arc::new(ScriptedMarket {
            fail: true,
            ..ScriptedMarket::quoting(0, 0.0)
        });
        let wallet = Arc::new(ScriptedWallet::holding(0, Some(50_000_000)));
        let executor = executor(market, wallet);

        let result = executor.try_buy(&usdc(), &sol(), 0.1, 200.0).await;
        assert!(matches!(result, Err(ExecutionError::Transport(_))));
    }

    #[tokio::test]
    async fn test_sell_uses_native_balance_for_sol() {
        let market = Arc::new(ScriptedMarket::quoting(21_000_000, 21.0));
        let wallet = Arc::new(ScriptedWallet::holding(100_000_000 + NATIVE_FEE_RESERVE, None));
        let executor = executor(market.clone(), wallet.clone());

        let pending = assert_ok!(executor.try_sell(&sol(), &usdc(), 100_000_000, 210.0, 0.0).await);

        assert_eq!(market.requested.lock().unwrap()[0], 100_000_000);
        assert_eq!(pending.amount_received, 21_000_000);
        assert!((pending.price - 210.0 / 1.001).abs() < 1e-9);
        assert_eq!(wallet.sent(), 1);
    }

    #[tokio::test]
    async fn test_take_profit_sell_requires_min_proceeds() {
        let market = Arc::new(ScriptedMarket::quoting(20_000_000, 20.0));
        let wallet = Arc::new(ScriptedWallet::holding(200_000_000, None));
        let executor = executor(market, wallet.clone());

        let result = executor
            .try_sell(&sol(), &usdc(), 100_000_000, 210.0, 21.0)
            .await;

        assert!(matches!(result, Err(ExecutionError::QuoteMismatch(_))));
        assert_eq!(wallet.sent(), 0);
    }

    #[tokio::test]
    async fn test_sell_cannot_spend_fee_reserve() {
        let market = Arc::new(ScriptedMarket::quoting(21_000_000, 21.0));
        let wallet = Arc::new(ScriptedWallet::holding(100_000_000, None));
        let executor = executor(market, wallet.clone());

        let result = executor.try_sell(&sol(), &usdc(), 100_000_000, 210.0, 0.0).await;

        assert_eq!(
            assert_err!(result),
            ExecutionError::InsufficientBalance {
                required: 100_000_000,
                available: 100_000_000 - NATIVE_FEE_RESERVE,
            }
        );
        assert_eq!(wallet.sent(), 0);
    }

    #[tokio::test]
    async fn test_confirmed_swap_becomes_result() {
        let market = Arc::new(ScriptedMarket::quoting(100_100_000, 20.0));
        let wallet = Arc::new(ScriptedWallet::settling(Confirmation::Confirmed));
        let executor = executor(market, wallet.clone());

        let pending = executor.try_buy(&usdc(), &sol(), 0.1, 200.0).await.unwrap();
        let result = assert_ok!(executor.confirm(pending.clone()).await);

        assert_eq!(result.signature, "5xSignature");
        assert_eq!(result.amount_sent, pending.amount_sent);
        assert_eq!(result.amount_received, 100_100_000);
        assert_eq!(
            *wallet.confirmed.lock().unwrap(),
            vec![("5xSignature".to_string(), Some(1_000))]
        );
    }

    #[tokio::test]
    async fn test_unsettled_swaps_map_to_errors() {
        let cases = [
            (Confirmation::Failed("InstructionError".to_string()), "failed"),
            (Confirmation::Expired, "expired"),
            (Confirmation::Unknown, "unknown"),
        ];

        for (outcome, label) in cases {
            let market = Arc::new(ScriptedMarket::quoting(100_100_000, 20.0));
            let executor = executor(market, Arc::new(ScriptedWallet::settling(outcome)));

            let pending = executor.try_buy(&usdc(), &sol(), 0.1, 200.0).await.unwrap();
            let err = assert_err!(executor.confirm(pending).await);

            match (label, err) {
                ("failed", ExecutionError::Failed(msg)) => assert!(msg.contains("InstructionError")),
                ("expired", ExecutionError::Expired(sig)) => assert_eq!(sig, "5xSignature"),
                ("unknown", ExecutionError::Unconfirmed(sig)) => assert_eq!(sig, "5xSignature"),
                (label, other) => panic!("{} confirmation mapped to {:?}", label, other),
            }
        }
    }
}
