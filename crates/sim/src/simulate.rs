//! Sequential application of operations to a state.
//!
//! A run is a strict left fold: each operation sees the state produced by the
//! previous one, and the first failure stops the run. Slippage bounds are
//! resolved against a quote state, which by default is the state the run starts
//! from.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::OperationError;
use crate::handlers::{self, Context, Outcome};
use crate::operation::Operation;
use crate::state::SimulationState;

/// One step of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedOperation {
    pub index: usize,
    pub operation: Operation,
    pub outcome: Outcome,
}

/// A run that applied every operation.
#[derive(Debug, Clone)]
pub struct SimulationRun {
    pub final_state: SimulationState,
    pub steps: Vec<AppliedOperation>,
}

/// A run stopped by its first failing operation.
#[derive(Debug, Clone, Error)]
#[error("operation {index} failed: {error}")]
pub struct SimulationFailure {
    pub index: usize,
    #[source]
    pub error: OperationError,
    /// State before the failing operation
    pub state: Box<SimulationState>,
    /// Operations applied before the failure
    pub steps: Vec<AppliedOperation>,
}

/// Applies `operation` to a copy of `state`, quoting slippage against `state`.
pub fn apply_operation(
    state: &SimulationState,
    operation: &Operation,
) -> Result<SimulationState, OperationError> {
    apply_operation_with_quote(state, operation, state).map(|(state, _)| state)
}

/// Applies `operation` to a copy of `state`, quoting slippage against `quote`.
///
/// `state` is left untouched when the operation fails.
pub fn apply_operation_with_quote(
    state: &SimulationState,
    operation: &Operation,
    quote: &SimulationState,
) -> Result<(SimulationState, Outcome), OperationError> {
    let mut next = state.clone();
    let ctx = Context { quote };
    let outcome = handlers::apply(&mut next, operation, &ctx)
        .map_err(|source| OperationError::new(operation, source))?;
    Ok((next, outcome))
}

/// Applies `operations` in order starting from `state`.
pub fn simulate(
    state: &SimulationState,
    operations: &[Operation],
) -> Result<SimulationRun, SimulationFailure> {
    simulate_with_quote(state, operations, state)
}

/// Applies `operations` in order, quoting every slippage bound against `quote`.
pub fn simulate_with_quote(
    state: &SimulationState,
    operations: &[Operation],
    quote: &SimulationState,
) -> Result<SimulationRun, SimulationFailure> {
    let mut current = state.clone();
    let mut steps = Vec::with_capacity(operations.len());

    for (index, operation) in operations.iter().enumerate() {
        match apply_operation_with_quote(&current, operation, quote) {
            Ok((next, outcome)) => {
                debug!(index, %operation, ?outcome, "applied operation");
                current = next;
                steps.push(AppliedOperation {
                    index,
                    operation: operation.clone(),
                    outcome,
                });
            }
            Err(error) => {
                debug!(index, %operation, %error, "operation failed");
                return Err(SimulationFailure {
                    index,
                    error,
                    state: Box::new(current),
                    steps,
                });
            }
        }
    }

    Ok(SimulationRun {
        final_state: current,
        steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimError;
    use crate::operation::{Amount, AssetsOrShares, OperationKind};
    use crate::test_fixtures::{
        self, advance, market_b_id, market_id, usdc, usdc_shares, OTHER, USDC, USER, VAULT,
        VAULT_V2,
    };
    use alloy_primitives::U256;
    use proptest::prelude::*;

    fn supply(amount: u64) -> Operation {
        Operation::new(
            USER,
            OperationKind::BlueSupply {
                id: market_id(),
                amount: AssetsOrShares::assets(usdc(amount)),
                on_behalf: USER,
                slippage: None,
            },
        )
    }

    #[test]
    fn test_supply_scenario() {
        let state = test_fixtures::state();
        let next = apply_operation(&state, &supply(1_000)).unwrap();

        let before = state.market(market_id()).unwrap();
        let after = next.market(market_id()).unwrap();
        assert_eq!(after.total_supply_assets, usdc(11_750));
        assert_eq!(
            after.total_supply_shares - before.total_supply_shares,
            usdc_shares(1_000)
        );
    }

    #[test]
    fn test_failed_operation_leaves_state() {
        let state = test_fixtures::state();
        let error = apply_operation(&state, &supply(20_000)).unwrap_err();

        assert!(matches!(error.source, SimError::InsufficientBalance { .. }));
        assert_eq!(error.operation.name(), "Blue_Supply");
        assert_eq!(state.balance_of(USER, USDC), usdc(10_000));
    }

    #[test]
    fn test_run_stops_at_first_failure() {
        let state = test_fixtures::state();
        let operations = [supply(6_000), supply(6_000), supply(1)];

        let failure = simulate(&state, &operations).unwrap_err();
        assert_eq!(failure.index, 1);
        assert_eq!(failure.steps.len(), 1);
        assert_eq!(failure.state.balance_of(USER, USDC), usdc(4_000));
        assert!(failure.to_string().starts_with("operation 1 failed"));
    }

    #[test]
    fn test_accrual_is_idempotent() {
        let state = advance(test_fixtures::vault_state(), 7 * 86_400);
        let accrue = Operation::new(
            USER,
            OperationKind::MetaMorphoAccrueInterest { vault: VAULT },
        );

        let once = apply_operation(&state, &accrue).unwrap();
        let twice = apply_operation(&once, &accrue).unwrap();
        assert_eq!(once, twice);
        assert!(once.market(market_id()).unwrap().last_update == once.timestamp());
    }

    #[test]
    fn test_donation_breaks_deposit_slippage() {
        let state = test_fixtures::vault_state();
        let donation = Operation::new(
            USER,
            OperationKind::BlueSupply {
                id: market_b_id(),
                amount: AssetsOrShares::assets(usdc(500)),
                on_behalf: VAULT,
                slippage: None,
            },
        );
        let deposit = Operation::new(
            USER,
            OperationKind::MetaMorphoDeposit {
                vault: VAULT,
                amount: AssetsOrShares::assets(usdc(100)),
                receiver: USER,
                slippage: Some(U256::from(300_000_000_000_000u64)),
            },
        );

        assert!(simulate(&state, &[deposit.clone()]).is_ok());
        let failure = simulate(&state, &[donation, deposit]).unwrap_err();
        assert_eq!(failure.index, 1);
        assert!(matches!(failure.error.source, SimError::SlippageExceeded { .. }));
    }

    #[test]
    fn test_vault_v2_round_trip() {
        let state = test_fixtures::vault_v2_state();
        let operations = [
            Operation::new(
                USER,
                OperationKind::VaultV2Deposit {
                    vault: VAULT_V2,
                    amount: AssetsOrShares::assets(usdc(250)),
                    receiver: USER,
                    slippage: Some(U256::ZERO),
                },
            ),
            Operation::new(
                USER,
                OperationKind::VaultV2Withdraw {
                    vault: VAULT_V2,
                    amount: AssetsOrShares::Shares(Amount::All),
                    receiver: USER,
                    owner: USER,
                    slippage: None,
                },
            ),
        ];

        let run = simulate(&state, &operations).unwrap();
        assert_eq!(run.steps.len(), 2);
        assert_eq!(run.steps[1].outcome.assets, Some(usdc(250)));
        assert_eq!(run.final_state.balance_of(USER, USDC), usdc(10_000));
        assert_eq!(run.final_state.balance_of(USER, VAULT_V2), U256::ZERO);
    }

    proptest! {
        #[test]
        fn prop_transfers_conserve_balances(amounts in prop::collection::vec(0u64..4_000, 1..8)) {
            let state = test_fixtures::state();
            let operations: Vec<Operation> = amounts
                .iter()
                .enumerate()
                .map(|(i, amount)| {
                    let (from, to) = if i % 2 == 0 { (USER, OTHER) } else { (OTHER, USER) };
                    Operation::new(
                        from,
                        OperationKind::Erc20Transfer {
                            token: USDC,
                            from,
                            to,
                            amount: Amount::exact(usdc(*amount)),
                        },
                    )
                })
                .collect();

            let final_state = match simulate(&state, &operations) {
                Ok(run) => run.final_state,
                Err(failure) => *failure.state,
            };
            let total = final_state.balance_of(USER, USDC) + final_state.balance_of(OTHER, USDC);
            prop_assert_eq!(total, usdc(10_000));
        }
    }
}
