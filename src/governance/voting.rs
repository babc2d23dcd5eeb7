//! Stake-gated proposals with weighted voting and deadline-based finalization.
//!
//! # State Machine
//!
//! ```text
//! Active -> Ended      (deadline passed, observed on the next read)
//! Active -> Finalized  (finalize after the deadline)
//! Ended  -> Finalized
//! ```

use crate::blockchain::Blockchain;
use crate::clock::duration_millis;
use crate::crypto::Address;
use crate::error::ChainError;
use crate::miner;
use crate::transaction::{SystemAuthority, TxPayload};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Active,
    Ended,
    Finalized,
}

/// Chain or governance change applied when a proposal's trigger option wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProposalAction {
    SetDifficulty { difficulty: u32 },
    SetMiningReward { reward: u64 },
    SetRequiredApprovals { required: usize },
    AddAuthority { address: Address },
    TreasuryGrant { recipient: Address, amount: u64 },
}

impl ProposalAction {
    pub fn validate(&self) -> Result<(), ChainError> {
        match self {
            ProposalAction::SetDifficulty { difficulty } => miner::validate_difficulty(*difficulty),
            ProposalAction::SetRequiredApprovals { required } if *required == 0 => Err(
                ChainError::ValidationError("Required approvals must be at least 1".to_string()),
            ),
            ProposalAction::AddAuthority { address } if address.is_empty() => Err(
                ChainError::ValidationError("Authority address cannot be empty".to_string()),
            ),
            ProposalAction::TreasuryGrant { recipient, amount }
                if recipient.is_empty() || *amount == 0 =>
            {
                Err(ChainError::ValidationError(
                    "Treasury grant needs a recipient and a positive amount".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// An action plus the option whose win executes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundAction {
    pub trigger_option: usize,
    pub action: ProposalAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalOption {
    pub id: usize,
    pub text: String,
    pub votes: u64,
    pub voters: BTreeSet<Address>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: String,
    pub title: String,
    pub description: String,
    pub options: Vec<ProposalOption>,
    pub proposer_address: Address,
    pub voting_start_time: u64,
    pub voting_end_time: u64,
    pub status: ProposalStatus,
    pub total_votes: u64,
    pub participation_rate: f64,
    pub action: Option<BoundAction>,
    pub fee_transaction_id: Option<String>,
}

impl Proposal {
    pub fn voter_count(&self) -> usize {
        self.options.iter().map(|o| o.voters.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub voter_address: Address,
    pub proposal_id: String,
    pub option_id: usize,
    pub weight: u64,
    pub timestamp: u64,
    pub block_height: u64,
    pub transaction_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionResult {
    pub id: usize,
    pub text: String,
    pub votes: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalResult {
    pub proposal_id: String,
    pub winning_option: Option<OptionResult>,
    pub options: Vec<OptionResult>,
    pub total_votes: u64,
    pub participation_rate: f64,
    pub finalized_at: u64,
    /// The bound action when its trigger option won.
    pub triggered_action: Option<ProposalAction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingSystem {
    proposals: BTreeMap<String, Proposal>,
    /// proposal id -> voter -> vote
    votes: BTreeMap<String, BTreeMap<Address, Vote>>,
    registered_voters: BTreeSet<Address>,
    results: BTreeMap<String, ProposalResult>,
    minimum_stake: u64,
    proposal_fee: u64,
    default_voting_period_ms: u64,
    treasury_address: Address,
    next_id: u64,
}

impl Default for VotingSystem {
    fn default() -> Self {
        Self::new(
            100,
            10,
            Duration::from_secs(7 * 24 * 60 * 60),
            "GOVERNANCE_TREASURY",
        )
    }
}

impl VotingSystem {
    pub fn new(
        minimum_stake: u64,
        proposal_fee: u64,
        default_voting_period: Duration,
        treasury_address: impl Into<Address>,
    ) -> Self {
        Self {
            proposals: BTreeMap::new(),
            votes: BTreeMap::new(),
            registered_voters: BTreeSet::new(),
            results: BTreeMap::new(),
            minimum_stake: minimum_stake.max(1),
            proposal_fee,
            default_voting_period_ms: duration_millis(default_voting_period),
            treasury_address: treasury_address.into(),
            next_id: 1,
        }
    }

    pub fn minimum_stake(&self) -> u64 {
        self.minimum_stake
    }

    pub fn is_registered(&self, address: &str) -> bool {
        self.registered_voters.contains(address)
    }

    pub fn registered_voter_count(&self) -> usize {
        self.registered_voters.len()
    }

    /// Moves every active proposal whose deadline has passed to `Ended`.
    pub fn refresh_statuses(&mut self, now: u64) {
        for proposal in self.proposals.values_mut() {
            if proposal.status == ProposalStatus::Active && now >= proposal.voting_end_time {
                proposal.status = ProposalStatus::Ended;
            }
        }
    }

    /// The proposal with its status as of `now`.
    pub fn get_proposal(&self, proposal_id: &str, now: u64) -> Option<Proposal> {
        let mut proposal = self.proposals.get(proposal_id)?.clone();
        if proposal.status == ProposalStatus::Active && now >= proposal.voting_end_time {
            proposal.status = ProposalStatus::Ended;
        }
        Some(proposal)
    }

    pub fn list_proposals(&self, now: u64) -> Vec<Proposal> {
        self.proposals
            .keys()
            .filter_map(|id| self.get_proposal(id, now))
            .collect()
    }

    pub fn get_votes(&self, proposal_id: &str) -> Vec<&Vote> {
        self.votes
            .get(proposal_id)
            .map(|votes| votes.values().collect())
            .unwrap_or_default()
    }

    pub fn get_result(&self, proposal_id: &str) -> Option<&ProposalResult> {
        self.results.get(proposal_id)
    }

    pub fn register_voter(&mut self, chain: &Blockchain, address: &str) -> Result<(), ChainError> {
        if address.is_empty() {
            return Err(ChainError::ValidationError(
                "Voter address cannot be empty".to_string(),
            ));
        }
        if self.registered_voters.contains(address) {
            return Ok(());
        }
        let balance = chain.get_balance(address);
        if balance < self.minimum_stake {
            return Err(ChainError::InsufficientBalance {
                address: address.to_string(),
                required: self.minimum_stake,
                available: balance,
            });
        }
        self.registered_voters.insert(address.to_string());
        info!(voter = address, balance, "voter registered");
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_proposal(
        &mut self,
        chain: &mut Blockchain,
        proposer: &str,
        title: &str,
        description: &str,
        options: Vec<String>,
        voting_period: Option<Duration>,
        action: Option<BoundAction>,
    ) -> Result<Proposal, ChainError> {
        if proposer.is_empty() {
            return Err(ChainError::ValidationError(
                "Proposer address cannot be empty".to_string(),
            ));
        }
        if title.trim().is_empty() {
            return Err(ChainError::ValidationError(
                "Proposal title cannot be empty".to_string(),
            ));
        }
        if options.len() < 2 {
            return Err(ChainError::ValidationError(
                "A proposal needs at least two options".to_string(),
            ));
        }
        if options.iter().any(|o| o.trim().is_empty()) {
            return Err(ChainError::ValidationError(
                "Proposal options cannot be empty".to_string(),
            ));
        }
        if let Some(bound) = &action {
            if bound.trigger_option >= options.len() {
                return Err(ChainError::ValidationError(format!(
                    "Trigger option {} does not exist",
                    bound.trigger_option
                )));
            }
            bound.action.validate()?;
        }
        let period_ms = voting_period
            .map(duration_millis)
            .unwrap_or(self.default_voting_period_ms);
        if period_ms == 0 {
            return Err(ChainError::ValidationError(
                "Voting period must be positive".to_string(),
            ));
        }

        let balance = chain.get_balance(proposer);
        if balance < self.proposal_fee {
            return Err(ChainError::InsufficientBalance {
                address: proposer.to_string(),
                required: self.proposal_fee,
                available: balance,
            });
        }

        let id = format!("proposal-{}", self.next_id);
        let now = chain.now_millis();
        let fee_transaction_id = if self.proposal_fee > 0 {
            let fee = SystemAuthority.issue(
                Some(proposer.to_string()),
                self.treasury_address.clone(),
                self.proposal_fee,
                TxPayload::ProposalFee {
                    proposal_id: id.clone(),
                },
                now,
            );
            Some(chain.submit_transaction(fee)?)
        } else {
            None
        };

        let proposal = Proposal {
            id: id.clone(),
            title: title.to_string(),
            description: description.to_string(),
            options: options
                .into_iter()
                .enumerate()
                .map(|(id, text)| ProposalOption {
                    id,
                    text,
                    votes: 0,
                    voters: BTreeSet::new(),
                })
                .collect(),
            proposer_address: proposer.to_string(),
            voting_start_time: now,
            voting_end_time: now.saturating_add(period_ms),
            status: ProposalStatus::Active,
            total_votes: 0,
            participation_rate: 0.0,
            action,
            fee_transaction_id,
        };
        self.next_id += 1;
        self.proposals.insert(id.clone(), proposal.clone());
        info!(proposal = %id, proposer, "proposal created");
        Ok(proposal)
    }

    /// Records a vote weighted by `min(requested, balance / minimum_stake)`.
    pub fn cast_vote(
        &mut self,
        chain: &mut Blockchain,
        proposal_id: &str,
        voter: &str,
        option_id: usize,
        requested_weight: u64,
    ) -> Result<Vote, ChainError> {
        if !self.registered_voters.contains(voter) {
            return Err(ChainError::AuthorizationError(format!(
                "{} is not a registered voter",
                voter
            )));
        }
        let now = chain.now_millis();
        self.refresh_statuses(now);

        let proposal = self
            .proposals
            .get(proposal_id)
            .ok_or_else(|| ChainError::NotFound(format!("Proposal {}", proposal_id)))?;
        if proposal.status != ProposalStatus::Active {
            return Err(ChainError::StateError(format!(
                "Proposal {} is not accepting votes",
                proposal_id
            )));
        }
        if option_id >= proposal.options.len() {
            return Err(ChainError::ValidationError(format!(
                "Proposal {} has no option {}",
                proposal_id, option_id
            )));
        }
        let already_voted = self
            .votes
            .get(proposal_id)
            .map_or(false, |votes| votes.contains_key(voter));
        if already_voted {
            return Err(ChainError::StateError(format!(
                "{} already voted on proposal {}",
                voter, proposal_id
            )));
        }
        if requested_weight == 0 {
            return Err(ChainError::ValidationError(
                "Vote weight must be positive".to_string(),
            ));
        }

        let balance = chain.get_balance(voter);
        let weight = requested_weight.min(balance / self.minimum_stake);
        if weight == 0 {
            return Err(ChainError::InsufficientBalance {
                address: voter.to_string(),
                required: self.minimum_stake,
                available: balance,
            });
        }

        let audit = SystemAuthority.issue(
            Some(voter.to_string()),
            self.treasury_address.clone(),
            0,
            TxPayload::Vote {
                proposal_id: proposal_id.to_string(),
                option_id,
                weight,
            },
            now,
        );
        let transaction_id = chain.submit_transaction(audit)?;

        let vote = Vote {
            voter_address: voter.to_string(),
            proposal_id: proposal_id.to_string(),
            option_id,
            weight,
            timestamp: now,
            block_height: chain.height(),
            transaction_id,
        };

        let registered = self.registered_voters.len();
        let proposal = self
            .proposals
            .get_mut(proposal_id)
            .ok_or_else(|| ChainError::NotFound(format!("Proposal {}", proposal_id)))?;
        let option = &mut proposal.options[option_id];
        option.votes += weight;
        option.voters.insert(voter.to_string());
        proposal.total_votes += weight;
        proposal.participation_rate = if registered == 0 {
            0.0
        } else {
            proposal.voter_count() as f64 / registered as f64 * 100.0
        };

        self.votes
            .entry(proposal_id.to_string())
            .or_default()
            .insert(voter.to_string(), vote.clone());
        info!(proposal = %proposal_id, voter, option_id, weight, "vote cast");
        Ok(vote)
    }

    /// Computes the outcome without changing anything. Fails before the deadline.
    pub fn tally(&self, proposal_id: &str, now: u64) -> Result<ProposalResult, ChainError> {
        let proposal = self
            .proposals
            .get(proposal_id)
            .ok_or_else(|| ChainError::NotFound(format!("Proposal {}", proposal_id)))?;
        if proposal.status == ProposalStatus::Finalized {
            return Err(ChainError::StateError(format!(
                "Proposal {} is already finalized",
                proposal_id
            )));
        }
        if now < proposal.voting_end_time {
            return Err(ChainError::StateError(format!(
                "Voting on proposal {} is still open",
                proposal_id
            )));
        }

        let total = proposal.total_votes;
        let options: Vec<OptionResult> = proposal
            .options
            .iter()
            .map(|o| OptionResult {
                id: o.id,
                text: o.text.clone(),
                votes: o.votes,
                percentage: if total == 0 {
                    0.0
                } else {
                    o.votes as f64 / total as f64 * 100.0
                },
            })
            .collect();

        // strictly greater keeps the first-seen option on ties
        let mut winner: Option<&OptionResult> = None;
        for option in options.iter().filter(|o| o.votes > 0) {
            if winner.map_or(true, |w| option.votes > w.votes) {
                winner = Some(option);
            }
        }
        let winning_option = winner.cloned();

        let triggered_action = match (&proposal.action, &winning_option) {
            (Some(bound), Some(win)) if bound.trigger_option == win.id => Some(bound.action.clone()),
            _ => None,
        };

        Ok(ProposalResult {
            proposal_id: proposal_id.to_string(),
            winning_option,
            options,
            total_votes: total,
            participation_rate: proposal.participation_rate,
            finalized_at: now,
            triggered_action,
        })
    }

    /// Marks a tallied proposal finalized and archives its result.
    pub fn record_result(&mut self, result: ProposalResult) -> Result<(), ChainError> {
        let proposal = self
            .proposals
            .get_mut(&result.proposal_id)
            .ok_or_else(|| ChainError::NotFound(format!("Proposal {}", result.proposal_id)))?;
        proposal.status = ProposalStatus::Finalized;
        info!(
            proposal = %result.proposal_id,
            winner = ?result.winning_option.as_ref().map(|o| &o.text),
            "proposal finalized"
        );
        self.results.insert(result.proposal_id.clone(), result);
        Ok(())
    }

    pub fn finalize_proposal(&mut self, proposal_id: &str, now: u64) -> Result<ProposalResult, ChainError> {
        let result = self.tally(proposal_id, now)?;
        self.record_result(result.clone())?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::config::ChainConfig;
    use crate::persistence::InMemoryPersistence;
    use crate::transaction::Transaction;
    use std::sync::Arc;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn setup() -> (ManualClock, Blockchain, VotingSystem) {
        let clock = ManualClock::new(1_700_000_000_000);
        let config = ChainConfig {
            difficulty: 1,
            ..ChainConfig::default()
        };
        let mut chain = Blockchain::with_config(
            &config,
            Arc::new(clock.clone()),
            Arc::new(InMemoryPersistence::new()),
        )
        .unwrap();
        for (i, (voter, amount)) in [("v1", 1_000), ("v2", 500), ("v3", 300), ("poor", 50)]
            .into_iter()
            .enumerate()
        {
            let mut tx = Transaction::new_at(
                Some("GENESIS".into()),
                voter,
                amount,
                None,
                clock.now_millis() + i as u64,
            );
            tx.sign();
            chain.submit_transaction(tx).unwrap();
        }
        chain.mine_block("miner").unwrap();
        (clock, chain, VotingSystem::default())
    }

    fn two_options() -> Vec<String> {
        vec!["A".to_string(), "B".to_string()]
    }

    #[test]
    fn test_register_requires_minimum_stake() {
        let (_, chain, mut voting) = setup();
        voting.register_voter(&chain, "v1").unwrap();
        voting.register_voter(&chain, "v1").unwrap();
        assert_eq!(voting.registered_voter_count(), 1);
        assert!(matches!(
            voting.register_voter(&chain, "poor"),
            Err(ChainError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn test_create_proposal_charges_fee() {
        let (_, mut chain, mut voting) = setup();
        let before = chain.get_balance("v1");
        let proposal = voting
            .create_proposal(&mut chain, "v1", "Raise reward", "", two_options(), None, None)
            .unwrap();
        assert_eq!(proposal.status, ProposalStatus::Active);
        assert_eq!(chain.get_balance("v1"), before - 10);
        assert_eq!(chain.get_balance("GOVERNANCE_TREASURY"), 10);
        assert!(proposal.fee_transaction_id.is_some());
    }

    #[test]
    fn test_proposal_needs_two_options() {
        let (_, mut chain, mut voting) = setup();
        assert!(matches!(
            voting.create_proposal(&mut chain, "v1", "t", "", vec!["only".into()], None, None),
            Err(ChainError::ValidationError(_))
        ));
    }

    #[test]
    fn test_proposer_without_fee_rejected() {
        let (_, mut chain, mut voting) = setup();
        assert!(matches!(
            voting.create_proposal(&mut chain, "nobody", "t", "", two_options(), None, None),
            Err(ChainError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn test_huge_voting_period_does_not_wrap() {
        let (clock, mut chain, mut voting) = setup();
        voting.register_voter(&chain, "v2").unwrap();
        let period = Duration::from_secs(18_446_744_073_709_552);
        let p = voting
            .create_proposal(&mut chain, "v1", "t", "", two_options(), Some(period), None)
            .unwrap();
        assert_eq!(p.voting_end_time, u64::MAX);

        clock.advance(DAY);
        assert!(voting.cast_vote(&mut chain, &p.id, "v2", 0, 1).is_ok());
    }

    #[test]
    fn test_weight_capped_by_stake() {
        let (_, mut chain, mut voting) = setup();
        voting.register_voter(&chain, "v2").unwrap();
        let p = voting
            .create_proposal(&mut chain, "v1", "t", "", two_options(), None, None)
            .unwrap();
        let vote = voting.cast_vote(&mut chain, &p.id, "v2", 0, 1_000).unwrap();
        assert_eq!(vote.weight, 5);

        let p2 = voting
            .create_proposal(&mut chain, "v1", "t2", "", two_options(), None, None)
            .unwrap();
        let small = voting.cast_vote(&mut chain, &p2.id, "v2", 1, 2).unwrap();
        assert_eq!(small.weight, 2);
    }

    #[test]
    fn test_vote_errors_are_distinct() {
        let (clock, mut chain, mut voting) = setup();
        voting.register_voter(&chain, "v1").unwrap();
        let p = voting
            .create_proposal(&mut chain, "v1", "t", "", two_options(), Some(DAY), None)
            .unwrap();

        assert!(matches!(
            voting.cast_vote(&mut chain, &p.id, "v3", 0, 1),
            Err(ChainError::AuthorizationError(_))
        ));
        assert!(matches!(
            voting.cast_vote(&mut chain, &p.id, "v1", 7, 1),
            Err(ChainError::ValidationError(_))
        ));
        assert!(matches!(
            voting.cast_vote(&mut chain, "missing", "v1", 0, 1),
            Err(ChainError::NotFound(_))
        ));
        voting.cast_vote(&mut chain, &p.id, "v1", 0, 1).unwrap();
        assert!(matches!(
            voting.cast_vote(&mut chain, &p.id, "v1", 1, 1),
            Err(ChainError::StateError(_))
        ));

        voting.register_voter(&chain, "v2").unwrap();
        clock.advance(DAY);
        assert!(matches!(
            voting.cast_vote(&mut chain, &p.id, "v2", 0, 1),
            Err(ChainError::StateError(_))
        ));
        assert_eq!(
            voting.get_proposal(&p.id, clock.now_millis()).unwrap().status,
            ProposalStatus::Ended
        );
    }

    #[test]
    fn test_finalize_picks_majority_after_deadline() {
        let (clock, mut chain, mut voting) = setup();
        for voter in ["v1", "v2", "v3"] {
            voting.register_voter(&chain, voter).unwrap();
        }
        let p = voting
            .create_proposal(&mut chain, "v1", "t", "", two_options(), Some(DAY), None)
            .unwrap();
        voting.cast_vote(&mut chain, &p.id, "v1", 0, 1).unwrap();
        voting.cast_vote(&mut chain, &p.id, "v2", 0, 1).unwrap();
        voting.cast_vote(&mut chain, &p.id, "v3", 1, 1).unwrap();

        assert!(matches!(
            voting.finalize_proposal(&p.id, clock.now_millis()),
            Err(ChainError::StateError(_))
        ));

        clock.advance(DAY);
        let result = voting.finalize_proposal(&p.id, clock.now_millis()).unwrap();
        let winner = result.winning_option.unwrap();
        assert_eq!(winner.text, "A");
        assert!((winner.percentage - 66.666).abs() < 0.01);
        assert!((result.participation_rate - 100.0).abs() < f64::EPSILON);
        assert!(voting.finalize_proposal(&p.id, clock.now_millis()).is_err());
        assert!(voting.get_result(&p.id).is_some());
    }

    #[test]
    fn test_tie_goes_to_first_option() {
        let (clock, mut chain, mut voting) = setup();
        voting.register_voter(&chain, "v2").unwrap();
        voting.register_voter(&chain, "v3").unwrap();
        let p = voting
            .create_proposal(&mut chain, "v1", "t", "", two_options(), Some(DAY), None)
            .unwrap();
        voting.cast_vote(&mut chain, &p.id, "v2", 1, 1).unwrap();
        voting.cast_vote(&mut chain, &p.id, "v3", 0, 1).unwrap();
        clock.advance(DAY);
        let result = voting.finalize_proposal(&p.id, clock.now_millis()).unwrap();
        assert_eq!(result.winning_option.unwrap().id, 0);
    }

    #[test]
    fn test_zero_votes_has_no_winner() {
        let (clock, mut chain, mut voting) = setup();
        let p = voting
            .create_proposal(&mut chain, "v1", "t", "", two_options(), Some(DAY), None)
            .unwrap();
        clock.advance(DAY);
        let result = voting.finalize_proposal(&p.id, clock.now_millis()).unwrap();
        assert!(result.winning_option.is_none());
        assert_eq!(result.total_votes, 0);
    }

    #[test]
    fn test_triggered_action_only_when_trigger_wins() {
        let (clock, mut chain, mut voting) = setup();
        voting.register_voter(&chain, "v1").unwrap();
        let bound = BoundAction {
            trigger_option: 1,
            action: ProposalAction::SetMiningReward { reward: 75 },
        };
        let p = voting
            .create_proposal(&mut chain, "v1", "t", "", two_options(), Some(DAY), Some(bound))
            .unwrap();
        voting.cast_vote(&mut chain, &p.id, "v1", 1, 1).unwrap();
        clock.advance(DAY);
        let result = voting.tally(&p.id, clock.now_millis()).unwrap();
        assert_eq!(
            result.triggered_action,
            Some(ProposalAction::SetMiningReward { reward: 75 })
        );
    }

    #[test]
    fn test_invalid_action_rejected_at_creation() {
        let (_, mut chain, mut voting) = setup();
        let bound = BoundAction {
            trigger_option: 0,
            action: ProposalAction::SetDifficulty { difficulty: 12 },
        };
        assert!(voting
            .create_proposal(&mut chain, "v1", "t", "", two_options(), None, Some(bound))
            .is_err());
    }
}
