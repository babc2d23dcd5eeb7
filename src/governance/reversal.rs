//! N-of-M approved reversal of committed transfers.
//!
//! A request moves `Pending -> Executed` once `required_approvals` distinct
//! approvers sign off, or `Pending -> Rejected` on the first rejection. The
//! compensating transfer is submitted through the chain before the final
//! approval is recorded, so a failed submission leaves the request pending.

use crate::blockchain::Blockchain;
use crate::clock::duration_millis;
use crate::crypto::Address;
use crate::error::ChainError;
use crate::transaction::{SystemAuthority, TxPayload, SYSTEM_ADDRESS};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReversalStatus {
    Pending,
    Rejected,
    Executed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReversalRequest {
    pub id: String,
    pub transaction_id: String,
    pub requester_address: Address,
    pub reason: String,
    pub evidence: Option<String>,
    pub approvals: BTreeSet<Address>,
    pub rejections: BTreeSet<Address>,
    pub status: ReversalStatus,
    pub requested_at: u64,
    pub resolved_at: Option<u64>,
    pub rejection_reason: Option<String>,
    pub reversal_transaction_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReversalSystem {
    /// Keyed by the id of the transaction being reversed. Resolved requests
    /// stay here so a transaction is never reversed twice.
    requests: BTreeMap<String, ReversalRequest>,
    history: Vec<ReversalRequest>,
    authorized_approvers: BTreeSet<Address>,
    required_approvals: usize,
    reversal_window_ms: u64,
    next_id: u64,
}

impl Default for ReversalSystem {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(24 * 60 * 60))
    }
}

impl ReversalSystem {
    pub fn new(required_approvals: usize, reversal_window: Duration) -> Self {
        Self {
            requests: BTreeMap::new(),
            history: Vec::new(),
            authorized_approvers: BTreeSet::new(),
            required_approvals: required_approvals.max(1),
            reversal_window_ms: duration_millis(reversal_window),
            next_id: 1,
        }
    }

    pub fn add_approver(&mut self, address: impl Into<Address>) {
        self.authorized_approvers.insert(address.into());
    }

    pub fn is_authorized(&self, address: &str) -> bool {
        self.authorized_approvers.contains(address)
    }

    pub fn approvers(&self) -> impl Iterator<Item = &Address> {
        self.authorized_approvers.iter()
    }

    pub fn required_approvals(&self) -> usize {
        self.required_approvals
    }

    pub fn set_required_approvals(&mut self, required: usize) -> Result<(), ChainError> {
        if required == 0 {
            return Err(ChainError::ValidationError(
                "Required approvals must be at least 1".to_string(),
            ));
        }
        info!(old = self.required_approvals, new = required, "reversal quorum changed");
        self.required_approvals = required;
        Ok(())
    }

    pub fn get_request(&self, transaction_id: &str) -> Option<&ReversalRequest> {
        self.requests.get(transaction_id)
    }

    pub fn pending_requests(&self) -> impl Iterator<Item = &ReversalRequest> {
        self.requests
            .values()
            .filter(|r| r.status == ReversalStatus::Pending)
    }

    /// Resolved requests, oldest first.
    pub fn history(&self) -> &[ReversalRequest] {
        &self.history
    }

    /// Whether the transaction's block is still inside the reversal window.
    /// Says nothing about whether a request exists.
    pub fn can_reverse(&self, chain: &Blockchain, transaction_id: &str) -> bool {
        match chain.find_committed_transaction(transaction_id) {
            Some((_, block)) => {
                chain.now_millis().saturating_sub(block.timestamp) <= self.reversal_window_ms
            }
            None => false,
        }
    }

    pub fn request_reversal(
        &mut self,
        chain: &mut Blockchain,
        transaction_id: &str,
        requester: &str,
        reason: &str,
        evidence: Option<String>,
    ) -> Result<ReversalRequest, ChainError> {
        if requester.is_empty() {
            return Err(ChainError::ValidationError(
                "Requester address cannot be empty".to_string(),
            ));
        }
        if reason.trim().is_empty() {
            return Err(ChainError::ValidationError(
                "A reason is required to request a reversal".to_string(),
            ));
        }
        if self.requests.contains_key(transaction_id) {
            return Err(ChainError::StateError(format!(
                "A reversal was already requested for transaction {}",
                transaction_id
            )));
        }

        let (tx, block) = match chain.find_committed_transaction(transaction_id) {
            Some(found) => found,
            None if chain.mempool.contains(transaction_id) => {
                return Err(ChainError::StateError(format!(
                    "Transaction {} is not yet committed",
                    transaction_id
                )))
            }
            None => {
                return Err(ChainError::NotFound(format!(
                    "Transaction {}",
                    transaction_id
                )))
            }
        };

        if tx.is_mint() || tx.amount == 0 {
            return Err(ChainError::ValidationError(format!(
                "Transaction {} is not a reversible transfer",
                transaction_id
            )));
        }
        let now = chain.now_millis();
        if now.saturating_sub(block.timestamp) > self.reversal_window_ms {
            return Err(ChainError::StateError(format!(
                "Reversal window for transaction {} has expired",
                transaction_id
            )));
        }
        if !tx.involves(requester) {
            return Err(ChainError::AuthorizationError(format!(
                "{} is not a party to transaction {}",
                requester, transaction_id
            )));
        }

        let audit = SystemAuthority.issue(
            Some(requester.to_string()),
            SYSTEM_ADDRESS,
            0,
            TxPayload::ReversalRequest {
                transaction_id: transaction_id.to_string(),
                reason: reason.to_string(),
            },
            now,
        );
        chain.submit_transaction(audit)?;

        let request = ReversalRequest {
            id: format!("reversal-{}", self.next_id),
            transaction_id: transaction_id.to_string(),
            requester_address: requester.to_string(),
            reason: reason.to_string(),
            evidence,
            approvals: BTreeSet::new(),
            rejections: BTreeSet::new(),
            status: ReversalStatus::Pending,
            requested_at: now,
            resolved_at: None,
            rejection_reason: None,
            reversal_transaction_id: None,
        };
        self.next_id += 1;
        self.requests
            .insert(transaction_id.to_string(), request.clone());
        info!(tx = %transaction_id, requester, "reversal requested");
        Ok(request)
    }

    /// Records an approval. The approval that reaches quorum submits the
    /// compensating transfer; approving twice is a no-op.
    pub fn approve_reversal(
        &mut self,
        chain: &mut Blockchain,
        transaction_id: &str,
        approver: &str,
    ) -> Result<ReversalRequest, ChainError> {
        if !self.is_authorized(approver) {
            return Err(ChainError::AuthorizationError(format!(
                "{} is not an authorized reversal approver",
                approver
            )));
        }
        let required = self.required_approvals;
        let request = self.requests.get(transaction_id).ok_or_else(|| {
            ChainError::NotFound(format!("Reversal request for {}", transaction_id))
        })?;
        if request.status != ReversalStatus::Pending {
            return Err(ChainError::StateError(format!(
                "Reversal request for {} is already {:?}",
                transaction_id, request.status
            )));
        }
        if request.approvals.contains(approver) {
            return Ok(request.clone());
        }

        let reaches_quorum = request.approvals.len() + 1 >= required;
        let mut reversal_id = None;
        let now = chain.now_millis();
        if reaches_quorum {
            let (original, _) = chain
                .find_committed_transaction(transaction_id)
                .ok_or_else(|| ChainError::NotFound(format!("Transaction {}", transaction_id)))?;
            let refund_to = original.from.clone().ok_or_else(|| {
                ChainError::ValidationError(format!(
                    "Transaction {} has no sender to refund",
                    transaction_id
                ))
            })?;
            let reverse = SystemAuthority.issue(
                Some(original.to.clone()),
                refund_to,
                original.amount,
                TxPayload::Reversal {
                    original_transaction_id: transaction_id.to_string(),
                },
                now,
            );
            reversal_id = Some(chain.submit_transaction(reverse)?);
        }

        let request = self
            .requests
            .get_mut(transaction_id)
            .ok_or_else(|| ChainError::NotFound(format!("Reversal request for {}", transaction_id)))?;
        request.approvals.insert(approver.to_string());
        if let Some(id) = reversal_id {
            request.status = ReversalStatus::Executed;
            request.resolved_at = Some(now);
            request.reversal_transaction_id = Some(id.clone());
            self.history.push(request.clone());
            info!(tx = %transaction_id, reversal = %id, "reversal executed");
        }
        Ok(request.clone())
    }

    /// A single authorized rejection vetoes the request.
    pub fn reject_reversal(
        &mut self,
        chain: &Blockchain,
        transaction_id: &str,
        rejecter: &str,
        reason: &str,
    ) -> Result<ReversalRequest, ChainError> {
        if !self.is_authorized(rejecter) {
            return Err(ChainError::AuthorizationError(format!(
                "{} is not an authorized reversal approver",
                rejecter
            )));
        }
        let request = self.requests.get_mut(transaction_id).ok_or_else(|| {
            ChainError::NotFound(format!("Reversal request for {}", transaction_id))
        })?;
        if request.status != ReversalStatus::Pending {
            return Err(ChainError::StateError(format!(
                "Reversal request for {} is already {:?}",
                transaction_id, request.status
            )));
        }

        request.rejections.insert(rejecter.to_string());
        request.status = ReversalStatus::Rejected;
        request.resolved_at = Some(chain.now_millis());
        request.rejection_reason = Some(reason.to_string());
        self.history.push(request.clone());
        info!(tx = %transaction_id, rejecter, "reversal rejected");
        Ok(request.clone())
    }
}
