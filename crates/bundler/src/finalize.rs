//! Turns populated operations into the final bundle order.
//!
//! Grants are merged per owner, token and spender and hoisted to the front,
//! then the adapter's leftovers are unwrapped and skimmed back to the user.

use std::collections::BTreeSet;

use alloy_primitives::{Address, U256};
use morpho_rs_sim::math::min;
use morpho_rs_sim::{
    apply_operation_with_quote, AppliedOperation, Amount, Operation, OperationKind,
    SimulationFailure, SimulationState, Spender, MAX_UINT_160,
};
use tracing::debug;

use crate::error::BundlerError;
use crate::options::BundlerOptions;

/// A left fold that keeps the state before every operation.
#[derive(Debug, Clone)]
pub(crate) struct Trace {
    pub(crate) pre_states: Vec<SimulationState>,
    pub(crate) steps: Vec<AppliedOperation>,
    pub(crate) final_state: SimulationState,
}

pub(crate) fn trace(
    start: &SimulationState,
    operations: &[Operation],
) -> Result<Trace, SimulationFailure> {
    let mut current = start.clone();
    let mut pre_states = Vec::with_capacity(operations.len());
    let mut steps = Vec::with_capacity(operations.len());

    for (index, operation) in operations.iter().enumerate() {
        match apply_operation_with_quote(&current, operation, start) {
            Ok((next, outcome)) => {
                pre_states.push(std::mem::replace(&mut current, next));
                steps.push(AppliedOperation {
                    index,
                    operation: operation.clone(),
                    outcome,
                });
            }
            Err(error) => {
                return Err(SimulationFailure {
                    index,
                    error,
                    state: Box::new(current),
                    steps,
                });
            }
        }
    }

    Ok(Trace {
        pre_states,
        steps,
        final_state: current,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum GrantKey {
    Approve {
        owner: Address,
        token: Address,
        spender: Address,
    },
    Permit {
        owner: Address,
        token: Address,
        spender: Address,
    },
    Permit2 {
        owner: Address,
        token: Address,
    },
    Authorization {
        owner: Address,
        authorized: Address,
    },
}

fn grant_key(operation: &Operation) -> Option<GrantKey> {
    let owner = operation.sender;
    Some(match &operation.kind {
        OperationKind::Erc20Approve { token, spender, .. } => GrantKey::Approve {
            owner,
            token: *token,
            spender: *spender,
        },
        OperationKind::Erc20Permit { token, spender, .. } => GrantKey::Permit {
            owner,
            token: *token,
            spender: *spender,
        },
        OperationKind::Erc20Permit2 { token, .. } => GrantKey::Permit2 {
            owner,
            token: *token,
        },
        OperationKind::BlueSetAuthorization {
            owner, authorized, ..
        } => GrantKey::Authorization {
            owner: *owner,
            authorized: *authorized,
        },
        _ => return None,
    })
}

/// Allowance of `key` in `state`, the value grants overwrite.
fn granted(state: &SimulationState, key: GrantKey) -> U256 {
    match key {
        GrantKey::Approve {
            owner,
            token,
            spender,
        }
        | GrantKey::Permit {
            owner,
            token,
            spender,
        } => Spender::resolve(spender, &state.addresses).map_or(U256::ZERO, |spender| {
            state.holding_or_empty(owner, token).allowances.get(spender)
        }),
        GrantKey::Permit2 { owner, token } => {
            state.holding_or_empty(owner, token).permit2_allowance.amount
        }
        GrantKey::Authorization { .. } => U256::ZERO,
    }
}

/// Folds `next` into the merged grant `merged`.
fn merge(merged: &mut OperationKind, next: &OperationKind) {
    match (merged, next) {
        (
            OperationKind::Erc20Approve { amount, .. },
            OperationKind::Erc20Approve { amount: more, .. },
        )
        | (
            OperationKind::Erc20Permit { amount, .. },
            OperationKind::Erc20Permit { amount: more, .. },
        ) => *amount = amount.saturating_add(*more),
        (
            OperationKind::Erc20Permit2 {
                amount, expiration, ..
            },
            OperationKind::Erc20Permit2 {
                amount: more,
                expiration: later,
                ..
            },
        ) => {
            *amount = min(amount.saturating_add(*more), MAX_UINT_160);
            *expiration = (*expiration).max(*later);
        }
        _ => {}
    }
}

/// Adds to a merged grant what the owner spent before its first occurrence.
fn top_up(kind: &mut OperationKind, consumed: U256) {
    match kind {
        OperationKind::Erc20Approve { amount, .. } | OperationKind::Erc20Permit { amount, .. } => {
            *amount = amount.saturating_add(consumed);
        }
        OperationKind::Erc20Permit2 { amount, .. } => {
            *amount = min(amount.saturating_add(consumed), MAX_UINT_160);
        }
        _ => {}
    }
}

/// Merges the grants of `operations` per key and moves them to the front.
///
/// Grants overwrite allowances, so a hoisted grant also covers what was spent
/// from the previous allowance before the grant it replaces.
pub(crate) fn merge_grants(
    start: &SimulationState,
    operations: &[Operation],
) -> Result<Vec<Operation>, BundlerError> {
    let populated = trace(start, operations)?;

    let mut grants: Vec<(GrantKey, Operation)> = Vec::new();
    let mut rest = Vec::with_capacity(operations.len());
    for (operation, before) in operations.iter().zip(&populated.pre_states) {
        let Some(key) = grant_key(operation) else {
            rest.push(operation.clone());
            continue;
        };
        if let Some((_, merged)) = grants.iter_mut().find(|(existing, _)| *existing == key) {
            merge(&mut merged.kind, &operation.kind);
            continue;
        }
        let mut merged = operation.clone();
        top_up(
            &mut merged.kind,
            granted(start, key).saturating_sub(granted(before, key)),
        );
        grants.push((key, merged));
    }

    debug!(grants = grants.len(), operations = rest.len(), "merged grants");
    Ok(grants
        .into_iter()
        .map(|(_, grant)| grant)
        .chain(rest)
        .collect())
}

/// Unwraps every `unwrap_tokens` balance the adapter ends with, straight to the user.
fn unwraps(state: &SimulationState, options: &BundlerOptions, user: Address) -> Vec<Operation> {
    let adapter = state.addresses.general_adapter1;
    options
        .unwrap_tokens
        .iter()
        .filter(|token| !state.balance_of(adapter, **token).is_zero())
        .filter(|token| state.token(**token).is_ok_and(|metadata| metadata.wrapper.is_some()))
        .map(|token| {
            Operation::new(
                adapter,
                OperationKind::Erc20Unwrap {
                    token: *token,
                    receiver: user,
                    amount: Amount::All,
                },
            )
        })
        .collect()
}

/// Tokens a wrap or unwrap in `trace` may leave in the adapter.
fn wrapped_pairs(trace: &Trace) -> impl Iterator<Item = Address> + '_ {
    trace.steps.iter().flat_map(|step| {
        let token = match &step.operation.kind {
            OperationKind::Erc20Wrap { token, .. } | OperationKind::Erc20Unwrap { token, .. } => {
                *token
            }
            _ => return Vec::new(),
        };
        let underlying = trace
            .final_state
            .token(token)
            .ok()
            .and_then(|metadata| metadata.wrapper.as_ref())
            .map(|wrapper| wrapper.underlying);
        std::iter::once(token).chain(underlying).collect()
    })
}

/// Sends back every token the adapter received or wrapped.
///
/// Skims run even when the simulated balance is zero: wrapper rates can move
/// before the bundle lands, and skimming an empty balance does nothing.
fn skims(trace: &Trace, user: Address) -> Vec<Operation> {
    let adapter = trace.final_state.addresses.general_adapter1;
    let mut received: BTreeSet<Address> = wrapped_pairs(trace).collect();
    let after = trace.pre_states.iter().skip(1).chain(Some(&trace.final_state));
    for (before, after) in trace.pre_states.iter().zip(after) {
        for holding in after.holdings_of(adapter) {
            if holding.balance > before.balance_of(adapter, holding.token) {
                received.insert(holding.token);
            }
        }
    }

    received
        .into_iter()
        .map(|token| {
            Operation::new(
                adapter,
                OperationKind::Erc20Transfer {
                    token,
                    from: adapter,
                    to: user,
                    amount: Amount::All,
                },
            )
        })
        .collect()
}

/// Final operations of the bundle, traced from `start`.
pub(crate) fn finalize(
    start: &SimulationState,
    options: &BundlerOptions,
    user: Address,
    operations: &[Operation],
) -> Result<Trace, BundlerError> {
    let mut operations = merge_grants(start, operations)?;

    let merged = trace(start, &operations)?;
    operations.extend(unwraps(&merged.final_state, options, user));

    let unwrapped = trace(start, &operations)?;
    operations.extend(skims(&unwrapped, user));

    Ok(trace(start, &operations)?)
}
