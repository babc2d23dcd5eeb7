//! Governance layer: reversal, voting and reporting wired over one chain.
//!
//! Each subsystem owns its own maps and only reads chain state; every effect
//! (fees, refunds, rewards, penalties, audit records) goes back through
//! [`Blockchain::submit_transaction`].

pub mod report;
pub mod reversal;
pub mod voting;

pub use report::{
    ModerationAction, NewReport, Report, ReportCategory, ReportStatus, ReportSystem,
    ReportTargetType,
};
pub use reversal::{ReversalRequest, ReversalStatus, ReversalSystem};
pub use voting::{
    BoundAction, Proposal, ProposalAction, ProposalResult, ProposalStatus, Vote, VotingSystem,
};

use crate::blockchain::Blockchain;
use crate::config::GovernanceConfig;
use crate::error::ChainError;
use crate::transaction::{SystemAuthority, Transaction, TxPayload};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Serialized form of all governance state, checkpointed alongside the chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernanceSnapshot {
    pub reversal: ReversalSystem,
    pub voting: VotingSystem,
    pub report: ReportSystem,
}

#[derive(Debug, Clone)]
pub struct GovernanceSystems {
    pub reversal: ReversalSystem,
    pub voting: VotingSystem,
    pub report: ReportSystem,
    treasury_address: String,
}

impl GovernanceSystems {
    pub fn new(config: &GovernanceConfig) -> Self {
        let mut systems = Self {
            reversal: ReversalSystem::new(config.required_approvals, config.reversal_window),
            voting: VotingSystem::new(
                config.minimum_stake,
                config.proposal_fee,
                config.default_voting_period,
                config.treasury_address.clone(),
            ),
            report: ReportSystem::new(
                config.report_reward,
                config.false_report_penalty,
                config.community_vote_min_balance,
                config.treasury_address.clone(),
            ),
            treasury_address: config.treasury_address.clone(),
        };
        for authority in &config.authorities {
            systems.register_authority(authority);
        }
        systems
    }

    /// Rebuilds from a checkpoint. Authorities from `config` are re-registered
    /// on top of whatever the snapshot holds.
    pub fn restore(config: &GovernanceConfig, snapshot: GovernanceSnapshot) -> Self {
        let mut systems = Self {
            reversal: snapshot.reversal,
            voting: snapshot.voting,
            report: snapshot.report,
            treasury_address: config.treasury_address.clone(),
        };
        for authority in &config.authorities {
            systems.register_authority(authority);
        }
        systems
    }

    pub fn snapshot(&self) -> GovernanceSnapshot {
        GovernanceSnapshot {
            reversal: self.reversal.clone(),
            voting: self.voting.clone(),
            report: self.report.clone(),
        }
    }

    /// Registers `address` as both a moderator and a reversal approver.
    pub fn register_authority(&mut self, address: &str) {
        self.report.add_moderator(address);
        self.reversal.add_approver(address);
    }

    pub fn treasury_address(&self) -> &str {
        &self.treasury_address
    }

    /// Chain submission behind the moderation gate: transfers touching a
    /// blacklisted address never reach the mempool.
    pub fn submit_transaction(
        &self,
        chain: &mut Blockchain,
        tx: Transaction,
    ) -> Result<String, ChainError> {
        if let Some(from) = tx.from.as_deref() {
            if self.report.is_blacklisted(from) {
                return Err(ChainError::AuthorizationError(format!(
                    "Sender {} is blacklisted",
                    from
                )));
            }
        }
        if self.report.is_blacklisted(&tx.to) {
            return Err(ChainError::AuthorizationError(format!(
                "Recipient {} is blacklisted",
                tx.to
            )));
        }
        chain.submit_transaction(tx)
    }

    /// Finalizes a proposal and, when its trigger option won, applies the bound
    /// action. The proposal stays unfinalized if the action fails.
    pub fn finalize_proposal(
        &mut self,
        chain: &mut Blockchain,
        proposal_id: &str,
    ) -> Result<ProposalResult, ChainError> {
        let now = chain.now_millis();
        self.voting.refresh_statuses(now);
        let result = self.voting.tally(proposal_id, now)?;
        if let Some(action) = &result.triggered_action {
            self.execute_action(chain, proposal_id, action, now)?;
        }
        self.voting.record_result(result.clone())?;
        Ok(result)
    }

    fn execute_action(
        &mut self,
        chain: &mut Blockchain,
        proposal_id: &str,
        action: &ProposalAction,
        now: u64,
    ) -> Result<(), ChainError> {
        match action {
            ProposalAction::SetDifficulty { difficulty } => chain.set_difficulty(*difficulty)?,
            ProposalAction::SetMiningReward { reward } => chain.set_mining_reward(*reward),
            ProposalAction::SetRequiredApprovals { required } => {
                self.reversal.set_required_approvals(*required)?
            }
            ProposalAction::AddAuthority { address } => self.register_authority(address),
            ProposalAction::TreasuryGrant { recipient, amount } => {
                let grant = SystemAuthority.issue(
                    Some(self.treasury_address.clone()),
                    recipient.clone(),
                    *amount,
                    TxPayload::TreasuryGrant {
                        proposal_id: proposal_id.to_string(),
                    },
                    now,
                );
                self.submit_transaction(chain, grant)?;
            }
        }
        info!(proposal = %proposal_id, action = ?action, "proposal action executed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::ChainConfig;
    use crate::persistence::InMemoryPersistence;
    use std::sync::Arc;
    use std::time::Duration;

    fn setup() -> (ManualClock, Blockchain, GovernanceSystems) {
        let clock = ManualClock::new(1_700_000_000_000);
        let chain = Blockchain::with_config(
            &ChainConfig {
                difficulty: 1,
                ..ChainConfig::default()
            },
            Arc::new(clock.clone()),
            Arc::new(InMemoryPersistence::new()),
        )
        .unwrap();
        let config = GovernanceConfig {
            authorities: vec!["auth1".into(), "auth2".into()],
            ..GovernanceConfig::default()
        };
        (clock, chain, GovernanceSystems::new(&config))
    }

    #[test]
    fn test_authorities_are_cross_registered() {
        let (_, _, gov) = setup();
        assert!(gov.report.is_moderator("auth1"));
        assert!(gov.reversal.is_authorized("auth2"));
    }

    #[test]
    fn test_blacklisted_address_cannot_transact() {
        let (_, mut chain, mut gov) = setup();
        let mut funding = Transaction::new_at(Some("GENESIS".into()), "spammer", 100, None, 1);
        funding.sign();
        gov.submit_transaction(&mut chain, funding).unwrap();
        chain.mine_block("miner").unwrap();

        let report = gov
            .report
            .submit_report(
                &mut chain,
                NewReport {
                    reporter: "GENESIS".into(),
                    target_type: ReportTargetType::Address,
                    target_id: "spammer".into(),
                    category: ReportCategory::Spam,
                    description: String::new(),
                    evidence: vec![],
                },
            )
            .unwrap();
        gov.report
            .moderate_report(&mut chain, &report.id, "auth1", ModerationAction::Approve, None)
            .unwrap();

        let mut outgoing = Transaction::new_at(Some("spammer".into()), "victim", 5, None, 2);
        outgoing.sign();
        assert!(matches!(
            gov.submit_transaction(&mut chain, outgoing),
            Err(ChainError::AuthorizationError(_))
        ));
        let mut incoming = Transaction::new_at(Some("GENESIS".into()), "spammer", 5, None, 3);
        incoming.sign();
        assert!(gov.submit_transaction(&mut chain, incoming).is_err());
    }

    #[test]
    fn test_winning_action_changes_chain_parameters() {
        let (clock, mut chain, mut gov) = setup();
        gov.voting.register_voter(&chain, "GENESIS").unwrap();
        let proposal = gov
            .voting
            .create_proposal(
                &mut chain,
                "GENESIS",
                "Harder blocks",
                "",
                vec!["no".into(), "yes".into()],
                Some(Duration::from_secs(60)),
                Some(BoundAction {
                    trigger_option: 1,
                    action: ProposalAction::SetDifficulty { difficulty: 3 },
                }),
            )
            .unwrap();
        gov.voting
            .cast_vote(&mut chain, &proposal.id, "GENESIS", 1, 10)
            .unwrap();
        clock.advance(Duration::from_secs(60));

        let result = gov.finalize_proposal(&mut chain, &proposal.id).unwrap();
        assert!(result.triggered_action.is_some());
        assert_eq!(chain.difficulty, 3);
    }

    #[test]
    fn test_failed_action_leaves_proposal_open() {
        let (clock, mut chain, mut gov) = setup();
        gov.voting.register_voter(&chain, "GENESIS").unwrap();
        let proposal = gov
            .voting
            .create_proposal(
                &mut chain,
                "GENESIS",
                "Grant",
                "",
                vec!["yes".into(), "no".into()],
                Some(Duration::from_secs(60)),
                Some(BoundAction {
                    trigger_option: 0,
                    action: ProposalAction::TreasuryGrant {
                        recipient: "builder".into(),
                        amount: 1_000,
                    },
                }),
            )
            .unwrap();
        gov.voting
            .cast_vote(&mut chain, &proposal.id, "GENESIS", 0, 1)
            .unwrap();
        clock.advance(Duration::from_secs(60));

        // the treasury only holds the proposal fee
        assert!(matches!(
            gov.finalize_proposal(&mut chain, &proposal.id),
            Err(ChainError::InsufficientBalance { .. })
        ));
        assert!(gov.voting.get_result(&proposal.id).is_none());
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let (_, mut chain, mut gov) = setup();
        gov.voting.register_voter(&chain, "GENESIS").unwrap();
        gov.voting
            .create_proposal(&mut chain, "GENESIS", "t", "", vec!["a".into(), "b".into()], None, None)
            .unwrap();

        let json = serde_json::to_string(&gov.snapshot()).unwrap();
        let snapshot: GovernanceSnapshot = serde_json::from_str(&json).unwrap();
        let restored = GovernanceSystems::restore(&GovernanceConfig::default(), snapshot);
        assert!(restored.voting.is_registered("GENESIS"));
        assert_eq!(restored.voting.list_proposals(0).len(), 1);
        assert!(restored.reversal.is_authorized("auth1"));
    }
}
