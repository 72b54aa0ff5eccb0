use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::crypto::{verify_transfer, Wallet};

/// Sender marker used by the ledger itself when it issues a mining reward
pub const REWARD_SENDER: &str = "0";

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    /// Covers forged signatures as well as malformed keys or signature bytes
    #[error("Invalid transaction signature")]
    InvalidSignature,
}

/// Represents a transfer of value between two parties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Sender's public key (hex), or the reward marker "0"
    pub sender: String,

    /// Recipient's public key (hex) or node identifier
    pub recipient: String,

    /// Amount being transferred
    pub amount: u64,

    /// Hex signature over `sender || recipient || amount`
    #[serde(default)]
    pub signature: Option<String>,
}

impl Transaction {
    /// Creates a new transaction
    ///
    /// # Arguments
    ///
    /// * `sender` - The sender's public key
    /// * `recipient` - The recipient's public key
    /// * `amount` - The amount to transfer
    /// * `signature` - The sender's signature, if any
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: u64,
        signature: Option<String>,
    ) -> Self {
        Transaction {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
            signature: signature.filter(|s| !s.is_empty()),
        }
    }

    /// Creates a mining reward transaction issued by the ledger
    pub fn new_reward(recipient: impl Into<String>, amount: u64) -> Self {
        Transaction::new(REWARD_SENDER, recipient, amount, None)
    }

    /// Creates a transaction signed by `wallet`, using the wallet's public key as sender
    pub fn new_signed(wallet: &Wallet, recipient: impl Into<String>, amount: u64) -> Self {
        let sender = wallet.public_key_hex();
        let recipient = recipient.into();
        let signature = wallet.sign(&signing_message(&sender, &recipient, amount));

        Transaction {
            sender,
            recipient,
            amount,
            signature: Some(signature),
        }
    }

    /// Checks whether the transaction takes the unconditional admission path:
    /// a reward issued by the ledger, or a transaction carrying no signature
    pub fn skips_verification(&self) -> bool {
        self.sender == REWARD_SENDER
            || self.signature.as_deref().map_or(true, str::is_empty)
    }

    /// Verifies the signature against the sender's public key
    pub fn verify_signature(&self) -> Result<(), TransactionError> {
        let signature = self.signature.as_deref().unwrap_or_default();
        let message = signing_message(&self.sender, &self.recipient, self.amount);

        if verify_transfer(&self.sender, &message, signature) {
            Ok(())
        } else {
            Err(TransactionError::InvalidSignature)
        }
    }
}

/// Builds the message a sender signs: the canonical string forms of
/// sender, recipient and amount, concatenated in that order
pub fn signing_message(sender: &str, recipient: &str, amount: u64) -> Vec<u8> {
    format!("{}{}{}", sender, recipient, amount).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reward_transaction() {
        let transaction = Transaction::new_reward("miner", 1);

        assert_eq!(transaction.sender, REWARD_SENDER);
        assert_eq!(transaction.recipient, "miner");
        assert_eq!(transaction.amount, 1);
        assert!(transaction.signature.is_none());
        assert!(transaction.skips_verification());
    }

    #[test]
    fn test_empty_signature_is_treated_as_absent() {
        let transaction = Transaction::new("alice", "bob", 5, Some(String::new()));

        assert!(transaction.signature.is_none());
        assert!(transaction.skips_verification());
    }

    #[test]
    fn test_signed_transaction_verifies() {
        let sender = Wallet::new();
        let recipient = Wallet::new();

        let transaction = Transaction::new_signed(&sender, recipient.public_key_hex(), 10);

        assert!(!transaction.skips_verification());
        assert!(transaction.verify_signature().is_ok());
    }

    #[test]
    fn test_tampered_amount_fails_verification() {
        let sender = Wallet::new();

        let mut transaction = Transaction::new_signed(&sender, "bob", 10);
        transaction.amount = 1000;

        assert!(matches!(
            transaction.verify_signature(),
            Err(TransactionError::InvalidSignature)
        ));
    }

    #[test]
    fn test_signing_message_order() {
        assert_eq!(signing_message("a", "b", 42), b"ab42".to_vec());
    }

    #[test]
    fn test_signature_serialized_as_null_when_absent() {
        let json = serde_json::to_value(Transaction::new_reward("miner", 1)).unwrap();

        assert!(json["signature"].is_null());
        assert_eq!(json["amount"], 1);
    }

    #[test]
    fn test_missing_signature_field_deserializes_to_none() {
        let tx: Transaction =
            serde_json::from_str(r#"{"sender":"0","recipient":"miner","amount":1}"#).unwrap();

        assert_eq!(tx, Transaction::new_reward("miner", 1));
    }

    #[test]
    fn test_bincode_round_trip_unsigned_and_signed() {
        let unsigned = Transaction::new_reward("miner", 1);
        let signed = Transaction::new("a", "b", 2, Some("ff".to_string()));

        let bytes = bincode::serialize(&vec![unsigned.clone(), signed.clone()]).unwrap();
        let decoded: Vec<Transaction> = bincode::deserialize(&bytes).unwrap();

        assert_eq!(decoded, vec![unsigned, signed]);
    }
}
