use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::{sleep, Duration};

use super::{Confirmation, TransactionSigner, WalletBalance, WalletGateway};
use crate::api::SwapInstructions;
use crate::config::RetryPolicy;
use crate::error::GatewayError;
use crate::models::Token;

const CONFIRM_MAX_POLLS: u32 = 90;
const CONFIRM_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureStatus {
    err: Option<Value>,
    confirmation_status: Option<String>,
}

/// Wallet backed by a Solana JSON-RPC endpoint
pub struct SolanaRpcWallet {
    client: Client,
    rpc_url: String,
    signer: TransactionSigner,
    retry: RetryPolicy,
    confirm_max_polls: u32,
    confirm_interval: Duration,
}

impl SolanaRpcWallet {
    /// # Arguments
    /// * `rpc_url` - Solana JSON-RPC endpoint
    /// * `signer` - Keypair owning the traded balances
    /// * `retry` - Policy for token-account lookups and confirmation status reads
    pub fn new(
        rpc_url: impl Into<String>,
        signer: TransactionSigner,
        retry: RetryPolicy,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            rpc_url: rpc_url.into(),
            signer,
            retry,
            confirm_max_polls: CONFIRM_MAX_POLLS,
            confirm_interval: CONFIRM_POLL_INTERVAL,
        })
    }

    /// Override the polling cadence of `confirm_transaction`
    ///
    /// `max_polls` bounds the wait when the blockhash expiry is unknown or the
    /// node cannot report block height.
    pub fn with_confirmation_polling(mut self, max_polls: u32, interval: Duration) -> Self {
        self.confirm_max_polls = max_polls.max(1);
        self.confirm_interval = interval;
        self
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, GatewayError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response: RpcResponse<T> = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(GatewayError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        response
            .result
            .ok_or_else(|| GatewayError::Decode(format!("{} returned no result", method)))
    }

    async fn native_balance(&self) -> Result<u64, GatewayError> {
        let balance: WithContext<u64> = self
            .call("getBalance", json!([self.signer.public_key()]))
            .await?;
        Ok(balance.value)
    }

    /// Sum of all token accounts the wallet holds for `mint`
    async fn token_balance_once(&self, mint: &str) -> Result<u64, GatewayError> {
        let accounts: WithContext<Vec<Value>> = self
            .call(
                "getTokenAccountsByOwner",
                json!([
                    self.signer.public_key(),
                    { "mint": mint },
                    { "encoding": "jsonParsed" }
                ]),
            )
            .await?;

        if accounts.value.is_empty() {
            return Err(GatewayError::Decode(format!("no token account for {}", mint)));
        }

        accounts.value.iter().try_fold(0u64, |total, account| {
            let amount = account
                .pointer("/account/data/parsed/info/tokenAmount/amount")
                .and_then(Value::as_str)
                .ok_or_else(|| GatewayError::Decode("token account without amount".to_string()))?;
            let amount: u64 = amount
                .parse()
                .map_err(|_| GatewayError::Decode(format!("invalid token amount {:?}", amount)))?;
            Ok(total.saturating_add(amount))
        })
    }

    async fn signature_status_once(&self, signature: &str) -> Result<Option<SignatureStatus>, GatewayError> {
        let statuses: WithContext<Vec<Option<SignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                json!([[signature], { "searchTransactionHistory": true }]),
            )
            .await?;
        Ok(statuses.value.into_iter().next().flatten())
    }

    async fn block_height_once(&self) -> Result<u64, GatewayError> {
        self.call("getBlockHeight", json!([{ "commitment": "confirmed" }]))
            .await
    }

    /// `Ok(None)` while the transaction is unseen or only processed
    async fn settled_status(&self, signature: &str) -> Result<Option<Confirmation>, GatewayError> {
        let status = self
            .retry
            .retry("Signature status lookup", move || self.signature_status_once(signature))
            .await?;

        let Some(status) = status else {
            return Ok(None);
        };
        if let Some(err) = status.err {
            return Ok(Some(Confirmation::Failed(err.to_string())));
        }
        let settled = matches!(
            status.confirmation_status.as_deref(),
            Some("confirmed") | Some("finalized")
        );
        Ok(settled.then_some(Confirmation::Confirmed))
    }

    /// Whether the chain has moved past the transaction's last valid block
    async fn blockhash_expired(&self, signature: &str, last_valid_block_height: u64) -> bool {
        match self
            .retry
            .retry("Block height lookup", move || self.block_height_once())
            .await
        {
            Ok(height) => height > last_valid_block_height,
            Err(e) => {
                tracing::warn!("Block height unknown while confirming {}: {}", signature, e);
                false
            }
        }
    }
}

#[async_trait]
impl WalletGateway for SolanaRpcWallet {
    fn public_key(&self) -> String {
        self.signer.public_key()
    }

    async fn get_balance(&self, token: &Token) -> Result<WalletBalance, GatewayError> {
        let native_amount = self.native_balance().await?;

        if token.is_native() {
            return Ok(WalletBalance {
                native_amount,
                token_amount: None,
            });
        }

        let mint = token.mint_address.as_str();
        let token_amount = match self
            .retry
            .retry("Token balance lookup", move || self.token_balance_once(mint))
            .await
        {
            Ok(amount) => Some(amount),
            Err(e) => {
                tracing::warn!("No {} balance available: {}", token.symbol, e);
                None
            }
        };

        Ok(WalletBalance {
            native_amount,
            token_amount,
        })
    }

    async fn submit_transaction(&self, instructions: &SwapInstructions) -> Result<String, GatewayError> {
        let (signed, signature) = self.signer.sign_transaction(&instructions.swap_transaction)?;

        let submitted: String = self
            .call(
                "sendTransaction",
                json!([signed, { "encoding": "base64", "maxRetries": 3 }]),
            )
            .await?;

        tracing::info!("📤 Submitted transaction {}", submitted);
        if submitted != signature {
            tracing::warn!(
                "RPC returned signature {} but we signed {}",
                submitted,
                signature
            );
        }

        Ok(submitted)
    }

    async fn confirm_transaction(&self, signature: &str, last_valid_block_height: Option<u64>) -> Confirmation {
        for poll in 1..=self.confirm_max_polls {
            match self.settled_status(signature).await {
                Ok(Some(outcome)) => {
                    tracing::info!("Transaction {} settled: {:?}", signature, outcome);
                    return outcome;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Status of {} unavailable (poll {}): {}", signature, poll, e),
            }

            if let Some(last_valid) = last_valid_block_height {
                if self.blockhash_expired(signature, last_valid).await {
                    // It may still have landed in the last valid block
                    return match self.settled_status(signature).await {
                        Ok(Some(outcome)) => outcome,
                        Ok(None) => {
                            tracing::warn!("Transaction {} expired without landing", signature);
                            Confirmation::Expired
                        }
                        Err(e) => {
                            tracing::warn!("Transaction {} expired, final status unknown: {}", signature, e);
                            Confirmation::Unknown
                        }
                    };
                }
            }

            if poll < self.confirm_max_polls {
                sleep(self.confirm_interval).await;
            }
        }

        tracing::warn!(
            "Gave up confirming {} after {} polls",
            signature,
            self.confirm_max_polls
        );
        Confirmation::Unknown
    }
}
