/// Transaction types for govchain
use crate::clock::{Clock, SystemClock};
use crate::crypto::{Address, KeyPair};
use crate::error::ChainError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Maximum transaction size in bytes (100KB) to prevent DoS
pub const MAX_TRANSACTION_SIZE: usize = 100_000;

/// Sender label used by transactions the ledger itself originates.
pub const SYSTEM_ADDRESS: &str = "SYSTEM";

/// Signatures produced by [`SystemAuthority`] carry this prefix.
pub const SYSTEM_SIGNATURE_PREFIX: &str = "SYSTEM:";

/// Typed payload carried in a transaction's `data` field. The `type` tag is
/// what validation branches on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxPayload {
    WalletRegistration {
        address: Address,
    },
    TokenCreation {
        symbol: String,
        name: String,
        supply: u64,
    },
    MiningReward {
        block_index: u64,
    },
    Vote {
        proposal_id: String,
        option_id: usize,
        weight: u64,
    },
    Report {
        report_id: String,
        target: String,
        category: String,
    },
    ReversalRequest {
        transaction_id: String,
        reason: String,
    },
    Reversal {
        original_transaction_id: String,
    },
    ProposalFee {
        proposal_id: String,
    },
    ReportReward {
        report_id: String,
    },
    FalseReportPenalty {
        report_id: String,
    },
    TreasuryGrant {
        proposal_id: String,
    },
    Memo {
        text: String,
    },
}

impl TxPayload {
    pub fn type_name(&self) -> &'static str {
        match self {
            TxPayload::WalletRegistration { .. } => "WALLET_REGISTRATION",
            TxPayload::TokenCreation { .. } => "TOKEN_CREATION",
            TxPayload::MiningReward { .. } => "MINING_REWARD",
            TxPayload::Vote { .. } => "VOTE",
            TxPayload::Report { .. } => "REPORT",
            TxPayload::ReversalRequest { .. } => "REVERSAL_REQUEST",
            TxPayload::Reversal { .. } => "REVERSAL",
            TxPayload::ProposalFee { .. } => "PROPOSAL_FEE",
            TxPayload::ReportReward { .. } => "REPORT_REWARD",
            TxPayload::FalseReportPenalty { .. } => "FALSE_REPORT_PENALTY",
            TxPayload::TreasuryGrant { .. } => "TREASURY_GRANT",
            TxPayload::Memo { .. } => "MEMO",
        }
    }

    /// Governance audit records: zero-value, accepted on signature presence.
    pub fn is_audit_record(&self) -> bool {
        matches!(
            self,
            TxPayload::Vote { .. } | TxPayload::Report { .. } | TxPayload::ReversalRequest { .. }
        )
    }
}

/// A value transfer with an optional typed payload. `from` is `None` for
/// minted value (mining rewards, genesis supply, report rewards).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub from: Option<Address>,
    pub to: Address,
    pub amount: u64,
    #[serde(default)]
    pub data: Option<TxPayload>,
    pub timestamp: u64,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    pub hash: String,
}

impl Transaction {
    /// Builds an unsigned transaction stamped with the current system time.
    pub fn new(
        from: Option<Address>,
        to: impl Into<Address>,
        amount: u64,
        data: Option<TxPayload>,
    ) -> Self {
        Self::new_at(from, to, amount, data, SystemClock.now_millis())
    }

    pub fn new_at(
        from: Option<Address>,
        to: impl Into<Address>,
        amount: u64,
        data: Option<TxPayload>,
        timestamp: u64,
    ) -> Self {
        let mut tx = Transaction {
            from,
            to: to.into(),
            amount,
            data,
            timestamp,
            signature: None,
            public_key: None,
            hash: String::new(),
        };
        tx.hash = tx.compute_digest();
        tx
    }

    /// Hex SHA-256 over the canonical encoding of
    /// `{from, to, amount, timestamp, data}`. Strings are length-prefixed and
    /// `from = None` is distinguished from an empty sender.
    pub fn compute_digest(&self) -> String {
        let mut hasher = Sha256::new();
        match &self.from {
            Some(from) => {
                hasher.update([1u8]);
                hasher.update((from.len() as u64).to_le_bytes());
                hasher.update(from.as_bytes());
            }
            None => hasher.update([0u8]),
        }
        hasher.update((self.to.len() as u64).to_le_bytes());
        hasher.update(self.to.as_bytes());
        hasher.update(self.amount.to_le_bytes());
        hasher.update(self.timestamp.to_le_bytes());
        match &self.data {
            // Serializing a derived enum of strings and integers cannot fail.
            Some(data) => hasher.update(serde_json::to_vec(data).unwrap_or_default()),
            None => hasher.update(b"null"),
        }
        hex::encode(hasher.finalize())
    }

    /// Placeholder signing: the signature is the digest itself. Provides no
    /// authentication; use [`Transaction::sign_with`] for a verifiable one.
    pub fn sign(&mut self) {
        self.hash = self.compute_digest();
        self.signature = Some(self.hash.clone());
        self.public_key = None;
    }

    /// Signs the digest with a secp256k1 key. The sender must be the key's address.
    pub fn sign_with(&mut self, keypair: &KeyPair) -> Result<(), ChainError> {
        if self.from.as_deref() != Some(keypair.address().as_str()) {
            return Err(ChainError::CryptoError(
                "Signing key does not belong to the sender".to_string(),
            ));
        }
        self.hash = self.compute_digest();
        self.signature = Some(keypair.sign(self.hash.as_bytes())?);
        self.public_key = Some(keypair.public_key_hex());
        Ok(())
    }

    /// True for transactions without a sender (minted value).
    pub fn is_mint(&self) -> bool {
        self.from.is_none()
    }

    /// Whether `address` is the sender or the recipient.
    pub fn involves(&self, address: &str) -> bool {
        self.to == address || self.from.as_deref() == Some(address)
    }

    /// Validate transaction size to prevent DoS attacks
    pub fn validate_size(&self) -> Result<(), ChainError> {
        let serialized = bincode::serialize(self)?;
        if serialized.len() > MAX_TRANSACTION_SIZE {
            return Err(ChainError::ValidationError(format!(
                "Transaction too large: {} bytes (max: {})",
                serialized.len(),
                MAX_TRANSACTION_SIZE
            )));
        }
        Ok(())
    }
}

/// Signs effect-transactions the ledger emits on its own behalf (reversals,
/// fees, rewards, penalties).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAuthority;

impl SystemAuthority {
    pub fn sign(&self, tx: &mut Transaction) {
        tx.hash = tx.compute_digest();
        tx.signature = Some(format!("{}{}", SYSTEM_SIGNATURE_PREFIX, tx.hash));
        tx.public_key = None;
    }

    /// Builds and signs a transaction in one step.
    pub fn issue(
        &self,
        from: Option<Address>,
        to: impl Into<Address>,
        amount: u64,
        data: TxPayload,
        timestamp: u64,
    ) -> Transaction {
        let mut tx = Transaction::new_at(from, to, amount, Some(data), timestamp);
        self.sign(&mut tx);
        tx
    }
}
