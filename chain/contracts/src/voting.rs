//! Liquidation Voting Engine — scheduled token-holder votes on liquidation
//!
//! One proposal per scheduled checkpoint:
//! - PendingVoting until the checkpoint; the notary may still set its quorum
//! - AcceptingVotes for `voting_period` seconds, weighted by the holder's
//!   token balance at the checkpoint
//! - PendingResult until anyone calculates the result
//! - A passed proposal is terminal: the payout engine is triggered and the
//!   crowdsale disabled. A failed one hands over to the next checkpoint.

use realcoin_types::ids::{Address, ProposalIndex};
use realcoin_types::numeric::{is_positive, permille, PERMILLE_SCALE};
use realcoin_types::time::{annual_checkpoints, Clock, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::errors::VotingError;
use crate::events::{ContractEvent, LiquidationResult, ProposalVoted, QuorumRateChanged, VotingEnabled};
use crate::hooks::VotingHooks;
use crate::ledger::TokenLedger;
use crate::security::OnceRegistry;

/// Length of every voting window (23 days).
pub const VOTING_PERIOD: i64 = 1_987_200;

/// Default quorum, per mille of the votes cast.
pub const DEFAULT_QUORUM_RATE: u32 = 600;

/// Five checkpoints, 1 December 2018 to 2022, midnight UTC.
pub fn default_schedule() -> Vec<Timestamp> {
    annual_checkpoints(2018, 12, 1, 5)
}

fn default_voting_period() -> i64 {
    VOTING_PERIOD
}

fn default_quorum_rate() -> u32 {
    DEFAULT_QUORUM_RATE
}

/// Voting engine deployment parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VotingConfig {
    pub notary: Address,
    /// Opening time of each proposal, strictly increasing
    #[serde(default = "default_schedule")]
    pub schedule: Vec<Timestamp>,
    #[serde(default = "default_voting_period")]
    pub voting_period: i64,
    #[serde(default = "default_quorum_rate")]
    pub default_quorum_rate: u32,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self::new(Address::from_label("realcoin-notary"))
    }
}

impl VotingConfig {
    pub fn new(notary: Address) -> Self {
        Self {
            notary,
            schedule: default_schedule(),
            voting_period: VOTING_PERIOD,
            default_quorum_rate: DEFAULT_QUORUM_RATE,
        }
    }

    /// Load from JSON and validate.
    pub fn from_json(json: &str) -> Result<Self, VotingError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| VotingError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), VotingError> {
        let invalid = |msg: &str| Err(VotingError::InvalidConfig(msg.to_string()));
        if self.notary.is_zero() {
            return invalid("notary must not be the null address");
        }
        if self.schedule.is_empty() {
            return invalid("schedule must contain at least one checkpoint");
        }
        if self.voting_period <= 0 {
            return invalid("voting period must be positive");
        }
        // Windows must not overlap the next checkpoint.
        for pair in self.schedule.windows(2) {
            if pair[0].saturating_add(self.voting_period) > pair[1] {
                return invalid("voting windows overlap");
            }
        }
        if !valid_quorum(self.default_quorum_rate) {
            return Err(VotingError::InvalidQuorumRate(self.default_quorum_rate));
        }
        Ok(())
    }
}

fn valid_quorum(rate: u32) -> bool {
    rate > 0 && rate <= PERMILLE_SCALE
}

/// Time-derived stage of the current proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VotingStage {
    /// Not enabled by the notary yet
    Disabled,
    PendingVoting,
    AcceptingVotes,
    /// Window closed, result not calculated
    PendingResult,
    /// Liquidation approved; terminal
    VotePassed,
    /// Every scheduled proposal failed
    Concluded,
}

/// Tally of one scheduled proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// Per mille of the votes cast required to pass
    pub quorum_rate: u32,
    /// Opening time; weights are read at this instant
    pub blocktime: Timestamp,
    pub count_no_votes: Decimal,
    pub count_yes_votes: Decimal,
}

/// Liquidation voting engine.
pub struct VotingEngine {
    notary: Address,
    enabled: bool,
    passed: bool,
    voting_period: i64,
    proposals: Vec<Proposal>,
    current_proposal: ProposalIndex,
    voters: OnceRegistry<(ProposalIndex, Address)>,
    /// Last time recorded by `ping`, `vote` or `calc_proposal_result`
    current_time_stamp: Timestamp,
    token: Arc<dyn TokenLedger>,
    hooks: VotingHooks,
    clock: Arc<dyn Clock>,
    /// Emitted events log (append-only)
    events: Vec<ContractEvent>,
}

impl std::fmt::Debug for VotingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VotingEngine")
            .field("notary", &self.notary)
            .field("enabled", &self.enabled)
            .field("passed", &self.passed)
            .field("current_proposal", &self.current_proposal)
            .field("proposals", &self.proposals.len())
            .finish()
    }
}

impl VotingEngine {
    pub fn new(
        config: VotingConfig,
        token: Arc<dyn TokenLedger>,
        hooks: VotingHooks,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, VotingError> {
        config.validate()?;
        let proposals = config
            .schedule
            .iter()
            .map(|&blocktime| Proposal {
                quorum_rate: config.default_quorum_rate,
                blocktime,
                count_no_votes: Decimal::ZERO,
                count_yes_votes: Decimal::ZERO,
            })
            .collect::<Vec<_>>();

        info!(
            notary = %config.notary,
            proposals = proposals.len(),
            token = %token.address(),
            "Voting engine deployed"
        );

        Ok(Self {
            notary: config.notary,
            enabled: false,
            passed: false,
            voting_period: config.voting_period,
            proposals,
            current_proposal: 0,
            voters: OnceRegistry::new(),
            current_time_stamp: 0,
            token,
            hooks,
            clock,
            events: Vec::new(),
        })
    }

    // ───────────────────────── Notary ─────────────────────────

    /// Switch voting on. Notary-only, once.
    pub fn enable_voting(&mut self, caller: &Address) -> Result<ContractEvent, VotingError> {
        self.check_notary(caller)?;
        if self.enabled {
            return Err(VotingError::AlreadyEnabled);
        }
        let now = self.clock.now();
        self.enabled = true;
        info!(enabled_at = now, "Voting enabled");
        Ok(self.emit(ContractEvent::VotingEnabled(VotingEnabled { enabled_at: now })))
    }

    /// Set the quorum of the current proposal before its window opens.
    pub fn change_quorum_rate(&mut self, caller: &Address, quorum_rate: u32) -> Result<ContractEvent, VotingError> {
        self.check_notary(caller)?;
        if !valid_quorum(quorum_rate) {
            return Err(VotingError::InvalidQuorumRate(quorum_rate));
        }
        self.check_stage("change_quorum_rate", VotingStage::PendingVoting)?;

        let proposal = self.current_proposal;
        self.proposals[proposal].quorum_rate = quorum_rate;
        info!(proposal, quorum_rate, "Quorum rate changed");
        Ok(self.emit(ContractEvent::QuorumRateChanged(QuorumRateChanged {
            proposal,
            quorum_rate,
        })))
    }

    // ───────────────────────── Voting ─────────────────────────

    /// Record the current time and report the stage.
    pub fn ping(&mut self) -> VotingStage {
        let now = self.clock.now();
        self.current_time_stamp = now;
        self.stage_at(now)
    }

    /// Cast the caller's weighted vote on the current proposal.
    pub fn vote(&mut self, caller: &Address, is_yes: bool) -> Result<ContractEvent, VotingError> {
        let now = self.clock.now();
        let stage = self.stage_at(now);
        if stage != VotingStage::AcceptingVotes {
            return Err(VotingError::InvalidStage {
                operation: "vote",
                stage,
            });
        }

        let proposal = self.current_proposal;
        if self.voters.is_used(&(proposal, *caller)) {
            warn!(proposal, voter = %caller, "Repeated vote rejected");
            return Err(VotingError::AlreadyVoted(*caller));
        }
        let votes = self
            .token
            .balance_of_at(caller, self.proposals[proposal].blocktime);
        if !is_positive(votes) {
            return Err(VotingError::NoVotingPower(*caller));
        }

        let tally = &self.proposals[proposal];
        let (yes, no) = if is_yes {
            (
                tally.count_yes_votes.checked_add(votes).ok_or(VotingError::Overflow)?,
                tally.count_no_votes,
            )
        } else {
            (
                tally.count_yes_votes,
                tally.count_no_votes.checked_add(votes).ok_or(VotingError::Overflow)?,
            )
        };

        let tally = &mut self.proposals[proposal];
        tally.count_yes_votes = yes;
        tally.count_no_votes = no;
        self.voters.mark((proposal, *caller));
        self.current_time_stamp = now;
        debug!(proposal, voter = %caller, %votes, is_yes, "Vote cast");

        Ok(self.emit(ContractEvent::ProposalVoted(ProposalVoted {
            proposal,
            voter: *caller,
            votes,
            is_yes,
        })))
    }

    /// Close the current proposal once its window is over.
    ///
    /// A pass triggers the payout engine first; if that fails nothing changes.
    pub fn calc_proposal_result(&mut self) -> Result<ContractEvent, VotingError> {
        let now = self.clock.now();
        let stage = self.stage_at(now);
        if stage != VotingStage::PendingResult {
            return Err(VotingError::InvalidStage {
                operation: "calc_proposal_result",
                stage,
            });
        }

        let proposal = self.current_proposal;
        let tally = &self.proposals[proposal];
        let total = tally
            .count_yes_votes
            .checked_add(tally.count_no_votes)
            .ok_or(VotingError::Overflow)?;
        let q_result = permille(tally.count_yes_votes, total);
        let did_pass = total > Decimal::ZERO && q_result >= tally.quorum_rate;

        if did_pass {
            self.hooks.liquidator.trigger_liquidation()?;
            self.hooks.crowdsale.disable_sale();
            self.passed = true;
        } else {
            self.current_proposal += 1;
        }
        self.current_time_stamp = now;
        info!(proposal, did_pass, q_result, "Proposal result calculated");

        Ok(self.emit(ContractEvent::LiquidationResult(LiquidationResult {
            proposal,
            did_pass,
            q_result,
        })))
    }

    // ───────────────────────── Queries ─────────────────────────

    pub fn current_stage(&self) -> VotingStage {
        self.stage_at(self.clock.now())
    }

    pub fn stage_at(&self, now: Timestamp) -> VotingStage {
        if !self.enabled {
            return VotingStage::Disabled;
        }
        if self.passed {
            return VotingStage::VotePassed;
        }
        let Some(proposal) = self.proposals.get(self.current_proposal) else {
            return VotingStage::Concluded;
        };
        if now < proposal.blocktime {
            VotingStage::PendingVoting
        } else if now < proposal.blocktime.saturating_add(self.voting_period) {
            VotingStage::AcceptingVotes
        } else {
            VotingStage::PendingResult
        }
    }

    pub fn proposal(&self, index: ProposalIndex) -> Option<&Proposal> {
        self.proposals.get(index)
    }

    pub fn proposals(&self) -> &[Proposal] {
        &self.proposals
    }

    /// Opening time of every scheduled proposal.
    pub fn start_time_stamps(&self) -> Vec<Timestamp> {
        self.proposals.iter().map(|p| p.blocktime).collect()
    }

    /// Quorum of the current proposal; `None` once the schedule is exhausted.
    pub fn current_rate(&self) -> Option<u32> {
        self.proposals
            .get(self.current_proposal)
            .map(|p| p.quorum_rate)
    }

    pub fn current_time_stamp(&self) -> Timestamp {
        self.current_time_stamp
    }

    pub fn current_proposal_index(&self) -> ProposalIndex {
        self.current_proposal
    }

    pub fn has_voted(&self, proposal: ProposalIndex, voter: &Address) -> bool {
        self.voters.is_used(&(proposal, *voter))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn notary(&self) -> Address {
        self.notary
    }

    pub fn voting_period(&self) -> i64 {
        self.voting_period
    }

    /// Get all emitted events.
    pub fn events(&self) -> &[ContractEvent] {
        &self.events
    }

    /// Drain all events (consume and clear).
    pub fn drain_events(&mut self) -> Vec<ContractEvent> {
        std::mem::take(&mut self.events)
    }

    fn emit(&mut self, event: ContractEvent) -> ContractEvent {
        self.events.push(event.clone());
        event
    }

    fn check_notary(&self, caller: &Address) -> Result<(), VotingError> {
        if *caller != self.notary {
            return Err(VotingError::NotNotary);
        }
        Ok(())
    }

    fn check_stage(&self, operation: &'static str, expected: VotingStage) -> Result<(), VotingError> {
        let stage = self.current_stage();
        if stage != expected {
            return Err(VotingError::InvalidStage { operation, stage });
        }
        Ok(())
    }
}
