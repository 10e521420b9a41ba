//! Invariant Tests — property-based checks over random scenarios
//!
//! - Investment ids are sequential with no gaps
//! - Escrowed value is conserved through settlement and finalization
//! - Vote tallies equal the snapshot weights of the voters
//! - Unsorted settlement batches never mutate state
//! - A settlement batch failing part-way leaves every balance as it was

use std::sync::Arc;

use realcoin_contracts::bank::{AssetTransfer, InMemoryBank};
use realcoin_contracts::crowdsale::{CrowdsaleConfig, CrowdsaleEngine, DEFAULT_CONFIRMATION_PERIOD};
use realcoin_contracts::errors::{CrowdsaleError, LiquidationError};
use realcoin_contracts::events::ContractEvent;
use realcoin_contracts::hooks::{LiquidationTrigger, SaleDisabler, VotingHooks};
use realcoin_contracts::ledger::{InMemoryLedger, TokenLedger};
use realcoin_contracts::voting::{VotingConfig, VotingEngine, VOTING_PERIOD};
use realcoin_types::ids::{Address, InvestmentId};
use realcoin_types::time::{ManualClock, DAY};
use rust_decimal::Decimal;

const OPENING: i64 = 1_700_000_000;
const CLOSING: i64 = OPENING + 14 * DAY;
const FUNDING: i64 = 1_000_000;

// ═══════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════

struct Sale {
    clock: Arc<ManualClock>,
    token: Arc<InMemoryLedger>,
    bank: Arc<InMemoryBank>,
    engine: CrowdsaleEngine,
    manager: Address,
    wallet: Address,
}

fn investor(index: usize) -> Address {
    Address::from_label(&format!("investor-{index}"))
}

fn setup_sale(investors: usize) -> Sale {
    let clock = Arc::new(ManualClock::new(OPENING));
    let token = Arc::new(InMemoryLedger::new(Address::from_label("RLC"), clock.clone()));
    let bank = Arc::new(InMemoryBank::new());
    let owner = Address::from_label("owner");
    let manager = Address::from_label("manager");
    let wallet = Address::from_label("company-wallet");
    for i in 0..investors {
        bank.fund(investor(i), Decimal::from(FUNDING)).unwrap();
    }

    let config = CrowdsaleConfig::new(owner, wallet, OPENING, CLOSING, Decimal::from(10));
    let mut engine = CrowdsaleEngine::new(config, token.clone(), bank.clone(), clock.clone()).unwrap();
    engine.set_manager(&owner, manager, true).unwrap();

    Sale {
        clock,
        token,
        bank,
        engine,
        manager,
        wallet,
    }
}

struct NoopTrigger;

impl LiquidationTrigger for NoopTrigger {
    fn trigger_liquidation(&self) -> Result<(), LiquidationError> {
        Ok(())
    }
}

struct NoopDisabler;

impl SaleDisabler for NoopDisabler {
    fn disable_sale(&self) {}
}

mod fuzz {
    use super::*;
    use proptest::prelude::*;

    /// (investor index, paid value)
    fn purchase() -> impl Strategy<Value = (usize, u64)> {
        (0usize..4, 1u64..1_000)
    }

    fn purchases() -> impl Strategy<Value = Vec<(usize, u64)>> {
        prop::collection::vec(purchase(), 1..12)
    }

    fn vote_weight() -> impl Strategy<Value = u64> {
        1u64..1_000_000
    }

    proptest! {
        /// Invariant: every purchase kind takes the next id.
        #[test]
        fn fuzz_sequential_investment_ids(
            kinds in prop::collection::vec(any::<bool>(), 1..20),
        ) {
            let mut sale = setup_sale(1);
            let manager = sale.manager;
            let buyer = investor(0);

            for (expected, native) in kinds.iter().enumerate() {
                let event = if *native {
                    sale.engine.buy_tokens(&buyer, buyer, Decimal::ONE).unwrap()
                } else {
                    sale.engine.non_eth_purchase(&manager, 1, buyer, Decimal::from(5)).unwrap()
                };
                let id = match event {
                    ContractEvent::TokenPurchase(e) => e.investment_id,
                    ContractEvent::NonEthTokenPurchase(e) => e.investment_id,
                    other => panic!("unexpected event {other:?}"),
                };
                prop_assert_eq!(id, expected as InvestmentId);
            }
            prop_assert_eq!(sale.engine.investments_len(), kinds.len());
        }

        /// Invariant: escrowed value ends either with the wallet or back with
        /// the investor; nothing is created or lost.
        #[test]
        fn fuzz_vault_conservation(
            buys in purchases(),
            confirm_mask in prop::collection::vec(any::<bool>(), 12),
        ) {
            let mut sale = setup_sale(4);
            let manager = sale.manager;
            let vault_address = sale.engine.vault().address();

            let mut escrowed = Decimal::ZERO;
            for (who, value) in &buys {
                let buyer = investor(*who);
                sale.engine.buy_tokens(&buyer, buyer, Decimal::from(*value)).unwrap();
                escrowed += Decimal::from(*value);
            }
            prop_assert_eq!(sale.bank.balance(&vault_address), escrowed);

            sale.clock.advance_to(CLOSING + 1);
            let confirmed: Vec<InvestmentId> = (0..buys.len())
                .filter(|i| confirm_mask[*i])
                .map(|i| i as InvestmentId)
                .collect();
            if !confirmed.is_empty() {
                sale.engine.batch_confirm_payments(&manager, &confirmed).unwrap();
            }

            sale.clock.advance_to(CLOSING + DEFAULT_CONFIRMATION_PERIOD + 1);
            let ids: Vec<InvestmentId> = (0..buys.len() as InvestmentId).collect();
            sale.engine.batch_settle_investments(&ids).unwrap();
            sale.engine.finalize().unwrap();

            let kept: Decimal = buys
                .iter()
                .enumerate()
                .filter(|(i, _)| confirm_mask[*i])
                .map(|(_, (_, value))| Decimal::from(*value))
                .sum();
            prop_assert_eq!(sale.bank.balance(&vault_address), Decimal::ZERO);
            prop_assert_eq!(sale.bank.balance(&sale.wallet), kept);

            let investors_total: Decimal = (0..4).map(|i| sale.bank.balance(&investor(i))).sum();
            prop_assert_eq!(investors_total + kept, Decimal::from(4 * FUNDING));
            prop_assert_eq!(sale.token.total_supply(), kept * Decimal::from(10));
        }

        /// Invariant: an unsorted batch is rejected and nothing is settled.
        #[test]
        fn fuzz_unsorted_batch_rejected(
            count in 2usize..8,
            swap in 0usize..7,
        ) {
            let mut sale = setup_sale(1);
            let buyer = investor(0);
            for _ in 0..count {
                sale.engine.buy_tokens(&buyer, buyer, Decimal::ONE).unwrap();
            }
            sale.clock.advance_to(CLOSING + DEFAULT_CONFIRMATION_PERIOD + 1);

            let mut ids: Vec<InvestmentId> = (0..count as InvestmentId).collect();
            let at = swap % (count - 1);
            ids.swap(at, at + 1);

            let result = sale.engine.batch_settle_investments(&ids);
            prop_assert!(matches!(result, Err(CrowdsaleError::SettlementOutOfOrder(_))));
            prop_assert!(sale.engine.investments().iter().all(|inv| !inv.attempted_settlement));
            prop_assert_eq!(sale.engine.vault().balance(), Decimal::from(count as u64));
        }

        /// Invariant: a refund rejected mid-batch reverts the whole batch.
        #[test]
        fn fuzz_failed_batch_leaves_state(
            buys in purchases(),
            confirm_mask in prop::collection::vec(any::<bool>(), 12),
            pick in any::<prop::sample::Index>(),
        ) {
            let mut sale = setup_sale(4);
            let manager = sale.manager;
            for (who, value) in &buys {
                let buyer = investor(*who);
                sale.engine.buy_tokens(&buyer, buyer, Decimal::from(*value)).unwrap();
            }

            let refunded: Vec<usize> = buys
                .iter()
                .enumerate()
                .filter(|(i, _)| !confirm_mask[*i])
                .map(|(_, (who, _))| *who)
                .collect();
            prop_assume!(!refunded.is_empty());
            let rejecting = investor(*pick.get(&refunded));

            sale.clock.advance_to(CLOSING + 1);
            let confirmed: Vec<InvestmentId> = (0..buys.len())
                .filter(|i| confirm_mask[*i])
                .map(|i| i as InvestmentId)
                .collect();
            if !confirmed.is_empty() {
                sale.engine.batch_confirm_payments(&manager, &confirmed).unwrap();
            }
            sale.clock.advance_to(CLOSING + DEFAULT_CONFIRMATION_PERIOD + 1);
            sale.bank.reject_payments(rejecting);

            let investments = sale.engine.investments().to_vec();
            let tokens_to_mint = sale.engine.tokens_to_mint();
            let vault_balance = sale.engine.vault().balance();
            let token_balances: Vec<Decimal> = (0..4).map(|i| sale.token.balance_of(&investor(i))).collect();
            let bank_balances: Vec<Decimal> = (0..4).map(|i| sale.bank.balance(&investor(i))).collect();
            let deposits: Vec<Decimal> = (0..4).map(|i| sale.engine.vault().deposited_of(&investor(i))).collect();

            let ids: Vec<InvestmentId> = (0..buys.len() as InvestmentId).collect();
            prop_assert!(sale.engine.batch_settle_investments(&ids).is_err());

            prop_assert_eq!(sale.engine.investments(), investments.as_slice());
            prop_assert_eq!(sale.engine.tokens_to_mint(), tokens_to_mint);
            prop_assert_eq!(sale.engine.tokens_minted(), Decimal::ZERO);
            prop_assert_eq!(sale.engine.vault().balance(), vault_balance);
            prop_assert_eq!(sale.token.total_supply(), Decimal::ZERO);
            let token_after: Vec<Decimal> = (0..4).map(|i| sale.token.balance_of(&investor(i))).collect();
            let bank_after: Vec<Decimal> = (0..4).map(|i| sale.bank.balance(&investor(i))).collect();
            let deposits_after: Vec<Decimal> = (0..4).map(|i| sale.engine.vault().deposited_of(&investor(i))).collect();
            prop_assert_eq!(token_after, token_balances);
            prop_assert_eq!(bank_after, bank_balances);
            prop_assert_eq!(deposits_after, deposits);
        }

        /// Invariant: tallies equal the voters' weights and the result is
        /// the floored per-mille share of yes votes.
        #[test]
        fn fuzz_vote_tally(
            ballots in prop::collection::vec((vote_weight(), any::<bool>()), 1..10),
        ) {
            let schedule = VotingConfig::default().schedule;
            let clock = Arc::new(ManualClock::new(schedule[0] - DAY));
            let token = Arc::new(InMemoryLedger::new(Address::from_label("RLC"), clock.clone()));
            let notary = Address::from_label("notary");
            let hooks = VotingHooks::new(Arc::new(NoopTrigger), Arc::new(NoopDisabler));
            let mut voting = VotingEngine::new(VotingConfig::new(notary), token.clone(), hooks, clock.clone()).unwrap();
            voting.enable_voting(&notary).unwrap();

            let mut yes = 0u64;
            let mut no = 0u64;
            for (i, (weight, _)) in ballots.iter().enumerate() {
                token.mint(&investor(i), Decimal::from(*weight)).unwrap();
            }
            clock.advance_to(schedule[0]);
            for (i, (weight, is_yes)) in ballots.iter().enumerate() {
                voting.vote(&investor(i), *is_yes).unwrap();
                if *is_yes { yes += weight } else { no += weight }
            }

            let proposal = voting.proposal(0).unwrap();
            prop_assert_eq!(proposal.count_yes_votes, Decimal::from(yes));
            prop_assert_eq!(proposal.count_no_votes, Decimal::from(no));

            clock.advance_to(schedule[0] + VOTING_PERIOD);
            let expected = (yes * 1_000 / (yes + no)) as u32;
            match voting.calc_proposal_result().unwrap() {
                ContractEvent::LiquidationResult(result) => {
                    prop_assert_eq!(result.q_result, expected);
                    prop_assert_eq!(result.did_pass, expected >= 600);
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
    }
}
