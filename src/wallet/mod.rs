pub mod rpc;
pub mod signer;

use async_trait::async_trait;

use crate::api::SwapInstructions;
use crate::error::GatewayError;
use crate::models::Token;

pub use rpc::SolanaRpcWallet;
pub use signer::TransactionSigner;

/// Lamports never spent by a swap: transaction fees and token-account rent
pub const NATIVE_FEE_RESERVE: u64 = 10_000_000;

/// Wallet holdings relevant to one token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalletBalance {
    pub native_amount: u64,       // lamports
    pub token_amount: Option<u64>, // raw units; None when no token account was found
}

impl WalletBalance {
    /// Spendable raw amount of `token`
    ///
    /// Native SOL keeps `NATIVE_FEE_RESERVE` back for transaction fees
    pub fn available(&self, token: &Token) -> u64 {
        if token.is_native() {
            self.native_amount.saturating_sub(NATIVE_FEE_RESERVE)
        } else {
            self.token_amount.unwrap_or(0)
        }
    }
}

/// Terminal (or given-up) state of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Failed(String), // landed with an error; nothing was swapped
    Expired,        // blockhash expired without the transaction landing
    Unknown,        // gave up polling; may still have landed
}

/// Balance lookup and signed submission of swap transactions
///
/// Submission and confirmation are separate calls so that the caller can
/// record the signature while the outcome is still open.
#[async_trait]
pub trait WalletGateway: Send + Sync {
    fn public_key(&self) -> String;

    async fn get_balance(&self, token: &Token) -> Result<WalletBalance, GatewayError>;

    /// Sign and submit; returns the transaction signature once the node accepted it
    async fn submit_transaction(&self, instructions: &SwapInstructions) -> Result<String, GatewayError>;

    /// Wait until a submitted transaction lands, fails or expires
    async fn confirm_transaction(&self, signature: &str, last_valid_block_height: Option<u64>) -> Confirmation;
}
