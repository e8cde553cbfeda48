use base64::{engine::general_purpose::STANDARD, Engine as _};
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::signer::keypair::keypair_from_seed;
use solana_sdk::transaction::VersionedTransaction;

use crate::error::GatewayError;

/// Keypair that signs exchange-built swap transactions
pub struct TransactionSigner {
    keypair: Keypair,
}

impl TransactionSigner {
    /// # Arguments
    /// * `secret` - base58 of a 64-byte keypair (secret || public) or a 32-byte seed
    pub fn from_base58(secret: &str) -> Result<Self, GatewayError> {
        let bytes = bs58::decode(secret.trim())
            .into_vec()
            .map_err(|e| GatewayError::Signing(format!("invalid private key encoding: {}", e)))?;

        let keypair = match bytes.len() {
            64 => Keypair::try_from(bytes.as_slice())
                .map_err(|e| GatewayError::Signing(format!("invalid keypair: {}", e)))?,
            32 => keypair_from_seed(&bytes)
                .map_err(|e| GatewayError::Signing(format!("invalid seed: {}", e)))?,
            n => {
                return Err(GatewayError::Signing(format!(
                    "private key must be 32 or 64 bytes, got {}",
                    n
                )))
            }
        };

        Ok(Self { keypair })
    }

    /// Wallet address (base58 public key)
    pub fn public_key(&self) -> String {
        self.keypair.pubkey().to_string()
    }

    /// Sign a base64 bincode-serialized versioned transaction in our signer slot
    ///
    /// Returns the re-encoded signed transaction and the base58 signature,
    /// which doubles as the transaction id.
    pub fn sign_transaction(&self, transaction_base64: &str) -> Result<(String, String), GatewayError> {
        let bytes = STANDARD
            .decode(transaction_base64)
            .map_err(|e| GatewayError::Signing(format!("failed to decode transaction: {}", e)))?;

        let mut transaction: VersionedTransaction = bincode::deserialize(&bytes)
            .map_err(|e| GatewayError::Signing(format!("failed to deserialize transaction: {}", e)))?;

        let required = transaction.message.header().num_required_signatures as usize;
        let ours = self.keypair.pubkey();
        let slot = transaction
            .message
            .static_account_keys()
            .iter()
            .take(required)
            .position(|key| *key == ours)
            .ok_or_else(|| GatewayError::Signing(format!("{} is not a required signer", ours)))?;

        if transaction.signatures.len() < required {
            transaction.signatures.resize(required, Signature::default());
        }

        let signature = self.keypair.sign_message(&transaction.message.serialize());
        transaction.signatures[slot] = signature;

        let signed = bincode::serialize(&transaction)
            .map_err(|e| GatewayError::Signing(format!("failed to serialize transaction: {}", e)))?;

        Ok((STANDARD.encode(signed), signature.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::hash::Hash;
    use solana_sdk::message::{v0, MessageHeader, VersionedMessage};
    use solana_sdk::pubkey::Pubkey;

    fn keypair() -> Keypair {
        keypair_from_seed(&[7u8; 32]).unwrap()
    }

    fn signer() -> TransactionSigner {
        TransactionSigner::from_base58(&keypair().to_base58_string()).unwrap()
    }

    /// Unsigned v0 transaction with `payer` as the only required signer
    fn unsigned_transaction(payer: Pubkey) -> VersionedTransaction {
        let message = v0::Message {
            header: MessageHeader {
                num_required_signatures: 1,
                num_readonly_signed_accounts: 0,
                num_readonly_unsigned_accounts: 1,
            },
            account_keys: vec![payer, Pubkey::new_from_array([9u8; 32])],
            recent_blockhash: Hash::new_from_array([3u8; 32]),
            instructions: vec![],
            address_table_lookups: vec![],
        };
        VersionedTransaction {
            signatures: vec![Signature::default()],
            message: VersionedMessage::V0(message),
        }
    }

    fn encode(transaction: &VersionedTransaction) -> String {
        STANDARD.encode(bincode::serialize(transaction).unwrap())
    }

    #[test]
    fn test_keypair_and_seed_give_same_address() {
        let from_seed = TransactionSigner::from_base58(&bs58::encode([7u8; 32]).into_string()).unwrap();

        assert_eq!(signer().public_key(), from_seed.public_key());
        assert_eq!(signer().public_key(), keypair().pubkey().to_string());
    }

    #[test]
    fn test_rejects_bad_key_length() {
        let result = TransactionSigner::from_base58(&bs58::encode([1u8; 16]).into_string());
        assert!(matches!(result, Err(GatewayError::Signing(_))));
    }

    #[test]
    fn test_sign_transaction_fills_payer_slot() {
        let unsigned = unsigned_transaction(keypair().pubkey());

        let (signed, signature) = signer().sign_transaction(&encode(&unsigned)).unwrap();
        let signed: VersionedTransaction =
            bincode::deserialize(&STANDARD.decode(signed).unwrap()).unwrap();

        assert_eq!(signed.message, unsigned.message);
        assert_eq!(signed.signatures.len(), 1);
        assert!(signed.signatures[0].verify(keypair().pubkey().as_ref(), &signed.message.serialize()));
        assert_eq!(signature, signed.signatures[0].to_string());
    }

    #[test]
    fn test_refuses_transaction_for_other_wallet() {
        let unsigned = unsigned_transaction(Pubkey::new_from_array([5u8; 32]));
        let result = signer().sign_transaction(&encode(&unsigned));
        assert!(matches!(result, Err(GatewayError::Signing(_))));
    }

    #[test]
    fn test_rejects_garbage_payload() {
        let result = signer().sign_transaction(&STANDARD.encode([0xffu8; 7]));
        assert!(matches!(result, Err(GatewayError::Signing(_))));
    }
}
