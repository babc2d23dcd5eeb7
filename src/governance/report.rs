//! Abuse reports, moderation, and the blacklist and flag registries.

use crate::blockchain::{BlockRef, Blockchain};
use crate::crypto::Address;
use crate::error::ChainError;
use crate::transaction::{SystemAuthority, TxPayload};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

pub const MAX_PRIORITY: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportTargetType {
    Transaction,
    Address,
    Block,
}

impl fmt::Display for ReportTargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReportTargetType::Transaction => "transaction",
            ReportTargetType::Address => "address",
            ReportTargetType::Block => "block",
        };
        f.write_str(name)
    }
}

impl FromStr for ReportTargetType {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transaction" => Ok(ReportTargetType::Transaction),
            "address" => Ok(ReportTargetType::Address),
            "block" => Ok(ReportTargetType::Block),
            other => Err(ChainError::ValidationError(format!(
                "Unknown report target type '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportCategory {
    MoneyLaundering,
    IllegalActivity,
    Fraud,
    Scam,
    Phishing,
    MarketManipulation,
    Impersonation,
    Spam,
    Other,
}

impl ReportCategory {
    pub fn priority(self) -> u8 {
        match self {
            ReportCategory::MoneyLaundering | ReportCategory::IllegalActivity => 5,
            ReportCategory::Fraud | ReportCategory::Scam => 4,
            ReportCategory::Phishing | ReportCategory::MarketManipulation => 3,
            ReportCategory::Impersonation => 2,
            ReportCategory::Spam | ReportCategory::Other => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReportCategory::MoneyLaundering => "money_laundering",
            ReportCategory::IllegalActivity => "illegal_activity",
            ReportCategory::Fraud => "fraud",
            ReportCategory::Scam => "scam",
            ReportCategory::Phishing => "phishing",
            ReportCategory::MarketManipulation => "market_manipulation",
            ReportCategory::Impersonation => "impersonation",
            ReportCategory::Spam => "spam",
            ReportCategory::Other => "other",
        }
    }
}

impl FromStr for ReportCategory {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let category = match s {
            "money_laundering" => ReportCategory::MoneyLaundering,
            "illegal_activity" => ReportCategory::IllegalActivity,
            "fraud" => ReportCategory::Fraud,
            "scam" => ReportCategory::Scam,
            "phishing" => ReportCategory::Phishing,
            "market_manipulation" => ReportCategory::MarketManipulation,
            "impersonation" => ReportCategory::Impersonation,
            "spam" => ReportCategory::Spam,
            "other" => ReportCategory::Other,
            other => {
                return Err(ChainError::ValidationError(format!(
                    "Unknown report category '{}'",
                    other
                )))
            }
        };
        Ok(category)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Investigating,
    Escalated,
    Approved,
    Rejected,
}

impl ReportStatus {
    pub fn is_resolved(self) -> bool {
        matches!(self, ReportStatus::Approved | ReportStatus::Rejected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationAction {
    Approve,
    Reject,
    Investigate,
    Escalate,
}

impl ModerationAction {
    fn resulting_status(self) -> ReportStatus {
        match self {
            ModerationAction::Approve => ReportStatus::Approved,
            ModerationAction::Reject => ReportStatus::Rejected,
            ModerationAction::Investigate => ReportStatus::Investigating,
            ModerationAction::Escalate => ReportStatus::Escalated,
        }
    }
}

impl FromStr for ModerationAction {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(ModerationAction::Approve),
            "reject" => Ok(ModerationAction::Reject),
            "investigate" => Ok(ModerationAction::Investigate),
            "escalate" => Ok(ModerationAction::Escalate),
            other => Err(ChainError::ValidationError(format!(
                "Unknown moderation action '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeratorActionRecord {
    pub moderator: Address,
    pub action: ModerationAction,
    pub notes: Option<String>,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVotes {
    pub valid: BTreeSet<Address>,
    pub invalid: BTreeSet<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: String,
    pub reporter_address: Address,
    pub target_type: ReportTargetType,
    pub target_id: String,
    pub category: ReportCategory,
    pub description: String,
    pub evidence: Vec<String>,
    pub status: ReportStatus,
    pub moderator_actions: Vec<ModeratorActionRecord>,
    pub votes: ReportVotes,
    pub priority: u8,
    pub reward_paid: bool,
    pub penalty_applied: bool,
    pub created_at: u64,
    pub resolved_at: Option<u64>,
    pub audit_transaction_id: String,
}

/// Input for [`ReportSystem::submit_report`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReport {
    pub reporter: Address,
    pub target_type: ReportTargetType,
    pub target_id: String,
    pub category: ReportCategory,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSystem {
    reports: BTreeMap<String, Report>,
    /// `reporter|type|target` keys for duplicate detection.
    report_index: BTreeSet<String>,
    moderators: BTreeSet<Address>,
    /// Blacklisted address -> id of the report that put it there.
    blacklisted_addresses: BTreeMap<Address, String>,
    flagged_transactions: BTreeMap<String, String>,
    flagged_blocks: BTreeMap<String, String>,
    report_reward: u64,
    false_report_penalty: u64,
    community_vote_min_balance: u64,
    treasury_address: Address,
    next_id: u64,
}

impl Default for ReportSystem {
    fn default() -> Self {
        Self::new(25, 10, 50, "GOVERNANCE_TREASURY")
    }
}

fn index_key(reporter: &str, target_type: ReportTargetType, target_id: &str) -> String {
    format!("{}|{}|{}", reporter, target_type, target_id)
}

impl ReportSystem {
    pub fn new(
        report_reward: u64,
        false_report_penalty: u64,
        community_vote_min_balance: u64,
        treasury_address: impl Into<Address>,
    ) -> Self {
        Self {
            reports: BTreeMap::new(),
            report_index: BTreeSet::new(),
            moderators: BTreeSet::new(),
            blacklisted_addresses: BTreeMap::new(),
            flagged_transactions: BTreeMap::new(),
            flagged_blocks: BTreeMap::new(),
            report_reward,
            false_report_penalty,
            community_vote_min_balance,
            treasury_address: treasury_address.into(),
            next_id: 1,
        }
    }

    pub fn add_moderator(&mut self, address: impl Into<Address>) {
        self.moderators.insert(address.into());
    }

    pub fn is_moderator(&self, address: &str) -> bool {
        self.moderators.contains(address)
    }

    pub fn is_blacklisted(&self, address: &str) -> bool {
        self.blacklisted_addresses.contains_key(address)
    }

    pub fn is_transaction_flagged(&self, hash: &str) -> bool {
        self.flagged_transactions.contains_key(hash)
    }

    pub fn is_block_flagged(&self, hash: &str) -> bool {
        self.flagged_blocks.contains_key(hash)
    }

    pub fn get_report(&self, report_id: &str) -> Option<&Report> {
        self.reports.get(report_id)
    }

    /// Unresolved reports, highest priority first, oldest first within a priority.
    pub fn open_reports(&self) -> Vec<&Report> {
        let mut open: Vec<&Report> = self
            .reports
            .values()
            .filter(|r| !r.status.is_resolved())
            .collect();
        open.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
        open
    }

    /// Canonical id of an existing target; blocks resolve to their hash.
    fn resolve_target(
        chain: &Blockchain,
        target_type: ReportTargetType,
        target_id: &str,
    ) -> Option<String> {
        match target_type {
            ReportTargetType::Transaction => chain
                .find_transaction(target_id)
                .map(|found| found.transaction().hash.clone()),
            ReportTargetType::Address => {
                chain.address_known(target_id).then(|| target_id.to_string())
            }
            ReportTargetType::Block => target_id
                .parse::<BlockRef>()
                .ok()
                .and_then(|r| chain.get_block(&r))
                .map(|block| block.hash.clone()),
        }
    }

    pub fn submit_report(&mut self, chain: &mut Blockchain, new: NewReport) -> Result<Report, ChainError> {
        if new.reporter.is_empty() || new.target_id.is_empty() {
            return Err(ChainError::ValidationError(
                "Reporter and target are required".to_string(),
            ));
        }
        if self.is_blacklisted(&new.reporter) {
            return Err(ChainError::AuthorizationError(format!(
                "{} is blacklisted and cannot file reports",
                new.reporter
            )));
        }
        let target_id = Self::resolve_target(chain, new.target_type, &new.target_id)
            .ok_or_else(|| {
                ChainError::NotFound(format!(
                    "Report target {} {}",
                    new.target_type, new.target_id
                ))
            })?;
        let key = index_key(&new.reporter, new.target_type, &target_id);
        if self.report_index.contains(&key) {
            return Err(ChainError::StateError(format!(
                "{} already reported {} {}",
                new.reporter, new.target_type, target_id
            )));
        }

        let id = format!("report-{}", self.next_id);
        let now = chain.now_millis();
        let audit = SystemAuthority.issue(
            Some(new.reporter.clone()),
            self.treasury_address.clone(),
            0,
            TxPayload::Report {
                report_id: id.clone(),
                target: target_id.clone(),
                category: new.category.as_str().to_string(),
            },
            now,
        );
        let audit_transaction_id = chain.submit_transaction(audit)?;

        let report = Report {
            id: id.clone(),
            reporter_address: new.reporter,
            target_type: new.target_type,
            target_id,
            category: new.category,
            description: new.description,
            evidence: new.evidence,
            status: ReportStatus::Pending,
            moderator_actions: Vec::new(),
            votes: ReportVotes::default(),
            priority: new.category.priority(),
            reward_paid: false,
            penalty_applied: false,
            created_at: now,
            resolved_at: None,
            audit_transaction_id,
        };
        self.next_id += 1;
        self.report_index.insert(key);
        self.reports.insert(id.clone(), report.clone());
        info!(report = %id, priority = report.priority, "report submitted");
        Ok(report)
    }

    /// Applies a moderator decision to a pending report. Repeating the action
    /// that produced the current status is a no-op.
    pub fn moderate_report(
        &mut self,
        chain: &mut Blockchain,
        report_id: &str,
        moderator: &str,
        action: ModerationAction,
        notes: Option<String>,
    ) -> Result<Report, ChainError> {
        if !self.is_moderator(moderator) {
            return Err(ChainError::AuthorizationError(format!(
                "{} is not a registered moderator",
                moderator
            )));
        }
        let report = self
            .reports
            .get(report_id)
            .ok_or_else(|| ChainError::NotFound(format!("Report {}", report_id)))?;
        if report.status == action.resulting_status() {
            return Ok(report.clone());
        }
        if report.status != ReportStatus::Pending {
            return Err(ChainError::StateError(format!(
                "Report {} is {:?} and can no longer be moderated",
                report_id, report.status
            )));
        }

        let now = chain.now_millis();
        let mut reward_paid = report.reward_paid;
        let mut penalty_applied = report.penalty_applied;
        match action {
            ModerationAction::Approve if !reward_paid && self.report_reward > 0 => {
                let reward = SystemAuthority.issue(
                    None,
                    report.reporter_address.clone(),
                    self.report_reward,
                    TxPayload::ReportReward {
                        report_id: report_id.to_string(),
                    },
                    now,
                );
                chain.submit_transaction(reward)?;
                reward_paid = true;
            }
            ModerationAction::Reject if self.false_report_penalty > 0 => {
                let balance = chain.get_balance(&report.reporter_address);
                if balance >= self.false_report_penalty {
                    let penalty = SystemAuthority.issue(
                        Some(report.reporter_address.clone()),
                        self.treasury_address.clone(),
                        self.false_report_penalty,
                        TxPayload::FalseReportPenalty {
                            report_id: report_id.to_string(),
                        },
                        now,
                    );
                    chain.submit_transaction(penalty)?;
                    penalty_applied = true;
                } else {
                    warn!(
                        report = %report_id,
                        balance,
                        "reporter cannot cover the false report penalty"
                    );
                }
            }
            _ => {}
        }

        let report = self
            .reports
            .get_mut(report_id)
            .ok_or_else(|| ChainError::NotFound(format!("Report {}", report_id)))?;
        report.status = action.resulting_status();
        report.reward_paid = reward_paid;
        report.penalty_applied = penalty_applied;
        report.moderator_actions.push(ModeratorActionRecord {
            moderator: moderator.to_string(),
            action,
            notes,
            timestamp: now,
        });
        match action {
            ModerationAction::Approve => {
                report.resolved_at = Some(now);
                let (target_type, target_id) = (report.target_type, report.target_id.clone());
                let registry = match target_type {
                    ReportTargetType::Address => &mut self.blacklisted_addresses,
                    ReportTargetType::Transaction => &mut self.flagged_transactions,
                    ReportTargetType::Block => &mut self.flagged_blocks,
                };
                registry.insert(target_id, report_id.to_string());
            }
            ModerationAction::Reject => report.resolved_at = Some(now),
            ModerationAction::Escalate => report.priority = (report.priority + 1).min(MAX_PRIORITY),
            ModerationAction::Investigate => {}
        }

        let report = report.clone();
        info!(report = %report_id, moderator, status = ?report.status, "report moderated");
        Ok(report)
    }

    /// Advisory community vote; the last vote from an address wins. Does not
    /// resolve the report.
    pub fn vote_on_report(
        &mut self,
        chain: &Blockchain,
        report_id: &str,
        voter: &str,
        is_valid: bool,
    ) -> Result<Report, ChainError> {
        if self.is_blacklisted(voter) {
            return Err(ChainError::AuthorizationError(format!(
                "{} is blacklisted",
                voter
            )));
        }
        let balance = chain.get_balance(voter);
        let report = self
            .reports
            .get_mut(report_id)
            .ok_or_else(|| ChainError::NotFound(format!("Report {}", report_id)))?;
        if report.status.is_resolved() {
            return Err(ChainError::StateError(format!(
                "Report {} is already resolved",
                report_id
            )));
        }
        if balance < self.community_vote_min_balance {
            return Err(ChainError::InsufficientBalance {
                address: voter.to_string(),
                required: self.community_vote_min_balance,
                available: balance,
            });
        }

        report.votes.valid.remove(voter);
        report.votes.invalid.remove(voter);
        if is_valid {
            report.votes.valid.insert(voter.to_string());
        } else {
            report.votes.invalid.insert(voter.to_string());
        }
        Ok(report.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Transaction;

    fn setup() -> (Blockchain, ReportSystem, String) {
        let mut chain = Blockchain::new("GENESIS", 1).unwrap();
        let mut funded = Transaction::new_at(Some("GENESIS".into()), "reporter", 100, None, 1);
        funded.sign();
        chain.submit_transaction(funded).unwrap();
        let mut scam = Transaction::new_at(Some("GENESIS".into()), "scammer", 40, None, 2);
        scam.sign();
        let scam_id = chain.submit_transaction(scam).unwrap();
        chain.mine_block("miner").unwrap();

        let mut system = ReportSystem::default();
        system.add_moderator("mod");
        (chain, system, scam_id)
    }

    fn address_report(category: ReportCategory) -> NewReport {
        NewReport {
            reporter: "reporter".into(),
            target_type: ReportTargetType::Address,
            target_id: "scammer".into(),
            category,
            description: "asked for my seed phrase".into(),
            evidence: vec![],
        }
    }

    fn reward_count(chain: &Blockchain) -> usize {
        chain
            .mempool
            .iter()
            .filter(|tx| matches!(tx.data, Some(TxPayload::ReportReward { .. })))
            .count()
    }

    #[test]
    fn test_priority_table() {
        assert_eq!(ReportCategory::Fraud.priority(), 4);
        assert_eq!(ReportCategory::MoneyLaundering.priority(), 5);
        assert_eq!(ReportCategory::Spam.priority(), 1);
        assert_eq!("fraud".parse::<ReportCategory>().unwrap(), ReportCategory::Fraud);
        assert!("rudeness".parse::<ReportCategory>().is_err());
    }

    #[test]
    fn test_approve_blacklists_and_pays_once() {
        let (mut chain, mut system, _) = setup();
        let report = system
            .submit_report(&mut chain, address_report(ReportCategory::Fraud))
            .unwrap();
        assert_eq!(report.priority, 4);

        let approved = system
            .moderate_report(&mut chain, &report.id, "mod", ModerationAction::Approve, None)
            .unwrap();
        assert_eq!(approved.status, ReportStatus::Approved);
        assert!(approved.reward_paid);
        assert!(system.is_blacklisted("scammer"));
        assert_eq!(reward_count(&chain), 1);

        let again = system
            .moderate_report(&mut chain, &report.id, "mod", ModerationAction::Approve, None)
            .unwrap();
        assert_eq!(again, approved);
        assert_eq!(reward_count(&chain), 1);
    }

    #[test]
    fn test_duplicate_report_rejected() {
        let (mut chain, mut system, _) = setup();
        system
            .submit_report(&mut chain, address_report(ReportCategory::Scam))
            .unwrap();
        assert!(matches!(
            system.submit_report(&mut chain, address_report(ReportCategory::Spam)),
            Err(ChainError::StateError(_))
        ));
    }

    #[test]
    fn test_missing_target_rejected() {
        let (mut chain, mut system, _) = setup();
        let mut new = address_report(ReportCategory::Spam);
        new.target_id = "ghost".into();
        assert!(matches!(
            system.submit_report(&mut chain, new),
            Err(ChainError::NotFound(_))
        ));

        let block = NewReport {
            target_type: ReportTargetType::Block,
            target_id: "42".into(),
            ..address_report(ReportCategory::Spam)
        };
        assert!(system.submit_report(&mut chain, block).is_err());
    }

    #[test]
    fn test_transaction_report_flags_transaction() {
        let (mut chain, mut system, scam_id) = setup();
        let report = system
            .submit_report(
                &mut chain,
                NewReport {
                    target_type: ReportTargetType::Transaction,
                    target_id: scam_id.clone(),
                    ..address_report(ReportCategory::Phishing)
                },
            )
            .unwrap();
        system
            .moderate_report(&mut chain, &report.id, "mod", ModerationAction::Approve, None)
            .unwrap();
        assert!(system.is_transaction_flagged(&scam_id));
        assert!(!system.is_blacklisted("scammer"));
    }

    #[test]
    fn test_block_report_resolves_index_to_hash() {
        let (mut chain, mut system, _) = setup();
        let hash = chain.blocks[1].hash.clone();
        let report = system
            .submit_report(
                &mut chain,
                NewReport {
                    target_type: ReportTargetType::Block,
                    target_id: "1".into(),
                    ..address_report(ReportCategory::MarketManipulation)
                },
            )
            .unwrap();
        assert_eq!(report.target_id, hash);
        system
            .moderate_report(&mut chain, &report.id, "mod", ModerationAction::Approve, None)
            .unwrap();
        assert!(system.is_block_flagged(&hash));
    }

    #[test]
    fn test_reject_applies_penalty_when_affordable() {
        let (mut chain, mut system, _) = setup();
        let report = system
            .submit_report(&mut chain, address_report(ReportCategory::Other))
            .unwrap();
        let rejected = system
            .moderate_report(&mut chain, &report.id, "mod", ModerationAction::Reject, None)
            .unwrap();
        assert!(rejected.penalty_applied);
        assert_eq!(chain.get_balance("reporter"), 90);
    }

    #[test]
    fn test_reject_skips_penalty_when_unaffordable() {
        let (mut chain, mut system, _) = setup();
        let new = NewReport {
            reporter: "scammer".into(),
            target_id: "reporter".into(),
            ..address_report(ReportCategory::Other)
        };
        // scammer holds 40, so drain it below the penalty first
        let mut drain = Transaction::new_at(Some("scammer".into()), "GENESIS", 35, None, 9);
        drain.sign();
        chain.submit_transaction(drain).unwrap();

        let report = system.submit_report(&mut chain, new).unwrap();
        let rejected = system
            .moderate_report(&mut chain, &report.id, "mod", ModerationAction::Reject, None)
            .unwrap();
        assert_eq!(rejected.status, ReportStatus::Rejected);
        assert!(!rejected.penalty_applied);
    }

    #[test]
    fn test_transitions_only_from_pending() {
        let (mut chain, mut system, _) = setup();
        let report = system
            .submit_report(&mut chain, address_report(ReportCategory::Impersonation))
            .unwrap();
        let escalated = system
            .moderate_report(&mut chain, &report.id, "mod", ModerationAction::Escalate, None)
            .unwrap();
        assert_eq!(escalated.status, ReportStatus::Escalated);
        assert_eq!(escalated.priority, 3);
        assert!(matches!(
            system.moderate_report(&mut chain, &report.id, "mod", ModerationAction::Approve, None),
            Err(ChainError::StateError(_))
        ));
    }

    #[test]
    fn test_unregistered_moderator_rejected() {
        let (mut chain, mut system, _) = setup();
        let report = system
            .submit_report(&mut chain, address_report(ReportCategory::Spam))
            .unwrap();
        assert!(matches!(
            system.moderate_report(&mut chain, &report.id, "rando", ModerationAction::Approve, None),
            Err(ChainError::AuthorizationError(_))
        ));
    }

    #[test]
    fn test_community_vote_last_vote_wins() {
        let (mut chain, mut system, _) = setup();
        let report = system
            .submit_report(&mut chain, address_report(ReportCategory::Spam))
            .unwrap();
        system.vote_on_report(&chain, &report.id, "reporter", true).unwrap();
        let updated = system
            .vote_on_report(&chain, &report.id, "reporter", false)
            .unwrap();
        assert!(updated.votes.valid.is_empty());
        assert_eq!(updated.votes.invalid.len(), 1);
        assert_eq!(updated.status, ReportStatus::Pending);

        assert!(matches!(
            system.vote_on_report(&chain, &report.id, "nobody", true),
            Err(ChainError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn test_blacklisted_reporter_cannot_report() {
        let (mut chain, mut system, _) = setup();
        let report = system
            .submit_report(&mut chain, address_report(ReportCategory::Fraud))
            .unwrap();
        system
            .moderate_report(&mut chain, &report.id, "mod", ModerationAction::Approve, None)
            .unwrap();
        let retaliation = NewReport {
            reporter: "scammer".into(),
            target_id: "reporter".into(),
            ..address_report(ReportCategory::Spam)
        };
        assert!(matches!(
            system.submit_report(&mut chain, retaliation),
            Err(ChainError::AuthorizationError(_))
        ));
    }
}
