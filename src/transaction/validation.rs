/// Validation logic for transactions separated from type definitions
use crate::crypto::{address_from_public_key_hex, verify_signature};
use crate::error::ChainError;
use crate::transaction::types::{
    Transaction, TxPayload, SYSTEM_ADDRESS, SYSTEM_SIGNATURE_PREFIX,
};

impl Transaction {
    /// Stateless validation. Branch order matters: SYSTEM wallet
    /// registrations and governance audit records are checked before the
    /// generic transfer rules. Audit records move no value and need only an
    /// intact hash plus any signature.
    pub fn validate(&self) -> Result<(), ChainError> {
        let signature = self.signature.as_deref().ok_or_else(|| {
            ChainError::ValidationError("Transaction not signed".to_string())
        })?;

        if self.from.as_deref() == Some(SYSTEM_ADDRESS)
            && matches!(self.data, Some(TxPayload::WalletRegistration { .. }))
        {
            return if signature.starts_with(SYSTEM_SIGNATURE_PREFIX) {
                Ok(())
            } else {
                Err(ChainError::ValidationError(
                    "System wallet registration must carry a system signature".to_string(),
                ))
            };
        }

        if self.data.as_ref().is_some_and(TxPayload::is_audit_record) {
            if self.amount != 0 {
                return Err(ChainError::ValidationError(
                    "Governance records cannot carry value".to_string(),
                ));
            }
            if self.hash != self.compute_digest() {
                return Err(ChainError::ValidationError(
                    "Transaction hash does not match its contents".to_string(),
                ));
            }
            return Ok(());
        }

        if self.amount == 0 {
            return Err(ChainError::ValidationError(
                "Transaction amount must be greater than zero".to_string(),
            ));
        }
        if let Some(from) = &self.from {
            if from.is_empty() {
                return Err(ChainError::ValidationError(
                    "Sender address cannot be empty".to_string(),
                ));
            }
        }
        if self.to.is_empty() {
            return Err(ChainError::ValidationError(
                "Recipient address cannot be empty".to_string(),
            ));
        }

        let digest = self.compute_digest();
        if self.hash != digest {
            return Err(ChainError::ValidationError(
                "Transaction hash does not match its contents".to_string(),
            ));
        }

        match &self.public_key {
            Some(public_key) => {
                let owner = address_from_public_key_hex(public_key)
                    .map_err(|e| ChainError::ValidationError(e.to_string()))?;
                if self.from.as_deref() != Some(owner.as_str()) {
                    return Err(ChainError::ValidationError(
                        "Public key does not belong to the sender".to_string(),
                    ));
                }
                verify_signature(public_key, digest.as_bytes(), signature)
                    .map_err(|e| ChainError::ValidationError(e.to_string()))
            }
            None => {
                let signed = signature == digest
                    || signature
                        .strip_prefix(SYSTEM_SIGNATURE_PREFIX)
                        .is_some_and(|rest| rest == digest);
                if signed {
                    Ok(())
                } else {
                    Err(ChainError::ValidationError(
                        "Signature does not match transaction digest".to_string(),
                    ))
                }
            }
        }
    }

    /// Boolean form of [`Transaction::validate`]; never panics on malformed input.
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}
