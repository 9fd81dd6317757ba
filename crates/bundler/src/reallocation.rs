//! Public allocator reallocations ahead of liquidity-hungry operations.
//!
//! Vaults that list the target market with flow caps are drained greedily, the
//! vault able to bring the most liquidity first. Each vault contributes one
//! `PublicReallocate` whose withdrawals come from its other enabled markets.

use alloy_primitives::{Address, U256};
use morpho_rs_sim::math::{max, min, zero_floor_sub};
use morpho_rs_sim::{
    apply_operation, Amount, AssetsOrShares, MarketId, Operation, OperationKind,
    ReallocationWithdrawal, RoundingDirection, SimError, SimulationState, NATIVE_ADDRESS,
};
use tracing::{debug, info, warn};

use crate::options::BundlerOptions;

/// How an operation takes liquidity out of a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outflow {
    Borrow,
    Withdraw,
}

/// Assets `amount` takes out of market `id` for `on_behalf`.
pub(crate) fn required_assets(
    state: &SimulationState,
    outflow: Outflow,
    id: MarketId,
    amount: AssetsOrShares,
    on_behalf: Address,
) -> Result<U256, SimError> {
    let position = state.accrual_position(on_behalf, id)?;
    let market = &position.market;
    Ok(match (outflow, amount) {
        (_, AssetsOrShares::Assets(Amount::Exact(assets))) => assets,
        (Outflow::Borrow, AssetsOrShares::Shares(Amount::Exact(shares))) => {
            market.to_borrow_assets(shares, RoundingDirection::Up)
        }
        (Outflow::Withdraw, AssetsOrShares::Shares(Amount::Exact(shares))) => {
            market.to_supply_assets(shares, RoundingDirection::Down)
        }
        (Outflow::Borrow, _) => position.max_borrowable_assets().unwrap_or_default(),
        (Outflow::Withdraw, _) => position.supply_assets(),
    })
}

struct Candidate {
    vault: Address,
    /// Assets the vault may still bring into the target market
    credit: U256,
    available: U256,
}

/// Withdrawals `vault` can make from its other markets, up to `wanted`.
fn donor_withdrawals(
    state: &SimulationState,
    options: &BundlerOptions,
    vault: Address,
    target: MarketId,
    wanted: U256,
) -> Result<Vec<ReallocationWithdrawal>, SimError> {
    let timestamp = state.timestamp();
    let mut remaining = wanted;
    let mut withdrawals = Vec::new();

    for id in &state.vault(vault)?.withdraw_queue {
        if remaining.is_zero() {
            break;
        }
        if *id == target {
            continue;
        }
        let config = state.vault_market_config(vault, *id)?;
        let max_out = config.flow_caps.map_or(U256::ZERO, |caps| caps.max_out);
        if !config.enabled || max_out.is_zero() {
            continue;
        }

        let position = state.accrual_position(vault, *id)?;
        let market = state.market(*id)?.accrue_interest(timestamp)?;
        let mut withdrawable = min(position.supply_assets(), market.liquidity());
        if let Some(utilization) = options.public_allocator.max_withdrawal_utilization {
            withdrawable = min(withdrawable, market.get_withdraw_to_utilization(utilization));
        }

        let assets = min(min(remaining, max_out), withdrawable);
        if assets.is_zero() {
            continue;
        }
        withdrawals.push(ReallocationWithdrawal { id: *id, assets });
        remaining -= assets;
    }

    withdrawals.sort_by_key(|withdrawal| withdrawal.id);
    Ok(withdrawals)
}

fn candidates(
    state: &SimulationState,
    options: &BundlerOptions,
    target: MarketId,
) -> Result<Vec<Candidate>, SimError> {
    let mut candidates = Vec::new();
    for config in state.vault_configs_for_market(target) {
        let max_in = config.flow_caps.map_or(U256::ZERO, |caps| caps.max_in);
        if !config.enabled || max_in.is_zero() || !options.public_allocator.allows(config.vault) {
            continue;
        }
        if state.vault(config.vault)?.public_allocator_config.is_none() {
            continue;
        }

        let supplied = state.accrual_position(config.vault, target)?.supply_assets();
        let credit = min(max_in, config.cap_room(supplied));
        let available = donor_withdrawals(state, options, config.vault, target, credit)?
            .iter()
            .fold(U256::ZERO, |total, withdrawal| total.saturating_add(withdrawal.assets));
        if !available.is_zero() {
            candidates.push(Candidate {
                vault: config.vault,
                credit,
                available,
            });
        }
    }

    candidates.sort_by(|a, b| b.available.cmp(&a.available).then(a.vault.cmp(&b.vault)));
    Ok(candidates)
}

/// Reallocations bringing enough liquidity into market `id` for `outflow` to take
/// `required` assets out of it.
///
/// Fails with [`SimError::ReallocationExhausted`] when the vaults cannot cover the
/// missing liquidity.
pub(crate) fn reallocations(
    state: &SimulationState,
    options: &BundlerOptions,
    user: Address,
    id: MarketId,
    outflow: Outflow,
    required: U256,
) -> Result<Vec<Operation>, SimError> {
    let market = state.market(id)?.accrue_interest(state.timestamp())?;
    let shortfall = zero_floor_sub(required, market.liquidity());

    let mut goal = shortfall;
    if let Some(target) = options.public_allocator.supply_target_utilization {
        let mut after = market.clone();
        match outflow {
            Outflow::Borrow => after.total_borrow_assets += required,
            Outflow::Withdraw => {
                after.total_supply_assets = zero_floor_sub(after.total_supply_assets, required);
            }
        }
        goal = max(goal, after.get_supply_to_utilization(target));
    }

    let enabled = options.public_allocator.enabled && state.addresses.public_allocator.is_some();
    if goal.is_zero() || !enabled {
        return if shortfall.is_zero() {
            Ok(Vec::new())
        } else {
            Err(SimError::ReallocationExhausted {
                market_id: id,
                shortfall,
            })
        };
    }

    let adapter = state.addresses.general_adapter1;
    let mut branch = state.clone();
    let mut remaining = goal;
    let mut operations = Vec::new();

    for candidate in candidates(state, options, id)? {
        if remaining.is_zero() {
            break;
        }
        let wanted = min(remaining, candidate.credit);
        let withdrawals = donor_withdrawals(&branch, options, candidate.vault, id, wanted)?;
        if withdrawals.is_empty() {
            continue;
        }
        let total = withdrawals
            .iter()
            .fold(U256::ZERO, |total, withdrawal| total + withdrawal.assets);

        let fee = branch.vault(candidate.vault)?.public_allocator_fee()?;
        let mut steps = Vec::with_capacity(2);
        if !fee.is_zero() {
            steps.push(Operation::new(
                user,
                OperationKind::Erc20Transfer {
                    token: NATIVE_ADDRESS,
                    from: user,
                    to: adapter,
                    amount: Amount::Exact(fee),
                },
            ));
        }
        steps.push(Operation::new(
            adapter,
            OperationKind::MetaMorphoPublicReallocate {
                vault: candidate.vault,
                withdrawals,
                supply_market: id,
            },
        ));

        let simulated = steps
            .iter()
            .try_fold(branch.clone(), |current, step| apply_operation(&current, step));
        match simulated {
            Ok(next) => {
                info!(vault = %candidate.vault, market = %id, %total, %fee, "reallocating liquidity");
                branch = next;
                remaining = zero_floor_sub(remaining, total);
                operations.extend(steps);
            }
            Err(error) => {
                warn!(vault = %candidate.vault, market = %id, %error, "skipping reallocation");
            }
        }
    }

    let covered = goal - remaining;
    if covered < shortfall {
        let shortfall = shortfall - covered;
        warn!(market = %id, %shortfall, "reallocation exhausted");
        return Err(SimError::ReallocationExhausted {
            market_id: id,
            shortfall,
        });
    }

    debug!(market = %id, reallocations = operations.len(), %covered, "reallocation planned");
    Ok(operations)
}
