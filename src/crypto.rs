//! Cryptographic primitives for govchain
//!
//! Transactions without a public key fall back to the digest-as-signature
//! scheme; this module backs the verified path with secp256k1 ECDSA.

use crate::error::ChainError;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use secp256k1::{
    constants::{COMPACT_SIGNATURE_SIZE, PUBLIC_KEY_SIZE},
    ecdsa::Signature,
    All, Message, PublicKey, Secp256k1, SecretKey,
};
use sha2::{Digest, Sha256};

/// A thread-safe, lazily initialized Secp256k1 context.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Addresses are opaque strings. Key-derived addresses are the hex SHA-256 of
/// the compressed public key; system and test addresses can be any label.
pub type Address = String;

/// Hex SHA-256 of arbitrary bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Derives the address that belongs to a compressed public key.
pub fn address_from_public_key(public_key: &PublicKey) -> Address {
    sha256_hex(&public_key.serialize())
}

/// Derives the address from a hex-encoded compressed public key.
pub fn address_from_public_key_hex(public_key_hex: &str) -> Result<Address, ChainError> {
    let bytes = hex::decode(public_key_hex)
        .map_err(|e| ChainError::CryptoError(format!("Invalid hex public key: {}", e)))?;
    let public_key = PublicKey::from_slice(&bytes)
        .map_err(|e| ChainError::CryptoError(format!("Invalid public key: {}", e)))?;
    Ok(address_from_public_key(&public_key))
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generates a new random KeyPair using the OS random number generator.
    pub fn generate() -> Self {
        let secret_key = SecretKey::new(&mut OsRng);
        Self::from_secret_key(secret_key)
    }

    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);
        KeyPair {
            secret_key,
            public_key,
        }
    }

    pub fn address(&self) -> Address {
        address_from_public_key(&self.public_key)
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.serialize())
    }

    /// Signs a message (hashed with SHA-256 first) and returns the hex compact signature.
    pub fn sign(&self, message: &[u8]) -> Result<String, ChainError> {
        let digest = Sha256::digest(message);
        let message = Message::from_digest_slice(&digest)
            .map_err(|e| ChainError::CryptoError(format!("Failed to create message: {}", e)))?;

        let signature = SECP256K1_CONTEXT.sign_ecdsa(&message, &self.secret_key);
        Ok(hex::encode(signature.serialize_compact()))
    }
}

/// Verifies a hex compact ECDSA signature over `message` against a hex
/// compressed public key.
pub fn verify_signature(
    public_key_hex: &str,
    message: &[u8],
    signature_hex: &str,
) -> Result<(), ChainError> {
    let public_key_bytes = hex::decode(public_key_hex)
        .map_err(|e| ChainError::CryptoError(format!("Invalid hex public key: {}", e)))?;
    let signature_bytes = hex::decode(signature_hex)
        .map_err(|e| ChainError::CryptoError(format!("Invalid hex signature: {}", e)))?;

    if public_key_bytes.len() != PUBLIC_KEY_SIZE {
        return Err(ChainError::CryptoError(format!(
            "Public key must be exactly {} bytes (compressed), got {}",
            PUBLIC_KEY_SIZE,
            public_key_bytes.len()
        )));
    }
    if signature_bytes.len() != COMPACT_SIGNATURE_SIZE {
        return Err(ChainError::CryptoError(format!(
            "Signature must be exactly {} bytes (compact), got {}",
            COMPACT_SIGNATURE_SIZE,
            signature_bytes.len()
        )));
    }

    let public_key = PublicKey::from_slice(&public_key_bytes)
        .map_err(|e| ChainError::CryptoError(format!("Invalid public key: {}", e)))?;

    let digest = Sha256::digest(message);
    let message = Message::from_digest_slice(&digest)
        .map_err(|e| ChainError::CryptoError(format!("Failed to create message: {}", e)))?;

    let signature = Signature::from_compact(&signature_bytes)
        .map_err(|e| ChainError::CryptoError(format!("Invalid signature: {}", e)))?;

    SECP256K1_CONTEXT
        .verify_ecdsa(&message, &signature, &public_key)
        .map_err(|_| ChainError::CryptoError("Signature verification failed".to_string()))
}
