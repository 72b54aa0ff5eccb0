use ed25519_dalek::{Signature, SigningKey, Signer, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use thiserror::Error;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Decoding error: {0}")]
    DecodingError(#[from] hex::FromHexError),
}

/// Reconstructs a public key from its hex serialization
pub fn parse_public_key(encoded: &str) -> Result<VerifyingKey, CryptoError> {
    let bytes: [u8; 32] = hex::decode(encoded)?.try_into().map_err(|_| {
        CryptoError::InvalidPublicKey("expected 32 bytes".to_string())
    })?;

    VerifyingKey::from_bytes(&bytes).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}

/// Decodes a signature from its hex serialization
pub fn parse_signature(encoded: &str) -> Result<Signature, CryptoError> {
    let bytes: [u8; 64] = hex::decode(encoded)?.try_into().map_err(|_| {
        CryptoError::InvalidSignature("expected 64 bytes".to_string())
    })?;

    Ok(Signature::from_bytes(&bytes))
}

/// Verifies `signature` over `message` against the sender's serialized public key.
///
/// Fails closed: a key or signature that cannot be decoded yields `false`.
pub fn verify_transfer(sender_key: &str, message: &[u8], signature: &str) -> bool {
    let public_key = match parse_public_key(sender_key) {
        Ok(key) => key,
        Err(_) => return false,
    };

    let signature = match parse_signature(signature) {
        Ok(signature) => signature,
        Err(_) => return false,
    };

    public_key.verify(message, &signature).is_ok()
}

/// Represents a wallet with a keypair
#[derive(Debug, Clone)]
pub struct Wallet {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl Wallet {
    /// Creates a new wallet with a random keypair
    pub fn new() -> Self {
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        let verifying_key = signing_key.verifying_key();

        Wallet {
            signing_key,
            verifying_key,
        }
    }

    /// Creates a wallet from an existing hex-encoded secret key
    pub fn from_secret_key_hex(secret_key: &str) -> Result<Self, CryptoError> {
        let bytes: [u8; 32] = hex::decode(secret_key)?.try_into().map_err(|_| {
            CryptoError::InvalidPrivateKey("Invalid private key length".to_string())
        })?;

        let signing_key = SigningKey::from_bytes(&bytes);
        let verifying_key = signing_key.verifying_key();

        Ok(Wallet {
            signing_key,
            verifying_key,
        })
    }

    /// Gets the wallet's public key as hex, the form used as a sender identifier
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying_key.as_bytes())
    }

    /// Exports the wallet's secret key as hex
    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Signs a message with the wallet's private key, returning the hex signature
    pub fn sign(&self, message: &[u8]) -> String {
        hex::encode(self.signing_key.sign(message).to_bytes())
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signing_and_verification() {
        let wallet = Wallet::new();
        let message = b"Hello, world!";

        let signature = wallet.sign(message);

        assert!(verify_transfer(&wallet.public_key_hex(), message, &signature));
        assert!(!verify_transfer(&wallet.public_key_hex(), b"Wrong message", &signature));
    }

    #[test]
    fn test_signature_from_other_key_is_rejected() {
        let wallet = Wallet::new();
        let impostor = Wallet::new();
        let message = b"pay bob";

        let signature = impostor.sign(message);

        assert!(!verify_transfer(&wallet.public_key_hex(), message, &signature));
    }

    #[test]
    fn test_malformed_inputs_fail_closed() {
        let wallet = Wallet::new();
        let signature = wallet.sign(b"msg");

        assert!(!verify_transfer("not-hex", b"msg", &signature));
        assert!(!verify_transfer("abcd", b"msg", &signature));
        assert!(!verify_transfer(&wallet.public_key_hex(), b"msg", "zz"));
        assert!(!verify_transfer(&wallet.public_key_hex(), b"msg", "00ff"));
        assert!(!verify_transfer(&wallet.public_key_hex(), b"msg", ""));
    }

    #[test]
    fn test_secret_key_round_trip() {
        let wallet = Wallet::new();

        let restored = Wallet::from_secret_key_hex(&wallet.secret_key_hex()).unwrap();

        assert_eq!(restored.public_key_hex(), wallet.public_key_hex());
        assert!(Wallet::from_secret_key_hex("1234").is_err());
    }

    #[test]
    fn test_parse_public_key() {
        let wallet = Wallet::new();

        assert!(parse_public_key(&wallet.public_key_hex()).is_ok());
        assert!(matches!(
            parse_public_key("00"),
            Err(CryptoError::InvalidPublicKey(_))
        ));
        assert!(matches!(
            parse_public_key("xyz"),
            Err(CryptoError::DecodingError(_))
        ));
    }
}
