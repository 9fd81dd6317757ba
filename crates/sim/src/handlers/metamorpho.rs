//! MetaMorpho vault operations and the public allocator.

use alloy_primitives::{Address, U256};
use tracing::trace;

use crate::error::{MarketId, ShareSource, SimError};
use crate::handlers::{blue, check_counterpart, erc20, quoted, Context, Erc4626, Flow, Outcome};
use crate::holding::Spender;
use crate::market::Quantity;
use crate::math::{self, zero_floor_sub, RoundingDirection};
use crate::operation::{AssetsOrShares, ReallocationWithdrawal};
use crate::state::SimulationState;
use crate::token::NATIVE_ADDRESS;
use crate::vault::Vault;

/// Accounts of an ERC-4626 withdrawal.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WithdrawParties {
    pub sender: Address,
    pub owner: Address,
    pub receiver: Address,
}

impl WithdrawParties {
    /// `address` withdraws its own shares to itself.
    pub(crate) fn own(address: Address) -> Self {
        Self {
            sender: address,
            owner: address,
            receiver: address,
        }
    }
}

/// Spends the share allowance of a third-party sender and burns the owner's shares.
pub(crate) fn burn_shares(
    state: &mut SimulationState,
    vault: Address,
    parties: WithdrawParties,
    shares: U256,
) -> Result<(), SimError> {
    let WithdrawParties { sender, owner, .. } = parties;
    if sender != owner {
        let spender = Spender::resolve(sender, &state.addresses)?;
        state.update_holding(owner, vault, |holding| {
            holding.spend_allowance(spender, sender, shares)
        })?;
    }

    state.update_holding(owner, vault, |holding| {
        holding.balance = holding
            .balance
            .checked_sub(shares)
            .ok_or(SimError::InsufficientShares {
                owner,
                location: ShareSource::Vault(vault),
            })?;
        Ok(())
    })
}

fn credit_shares(
    state: &mut SimulationState,
    vault: Address,
    receiver: Address,
    shares: U256,
) -> Result<(), SimError> {
    state.update_holding(receiver, vault, |holding| {
        holding.credit(shares);
        Ok(())
    })
}

fn supply_assets(state: &SimulationState, vault: &Vault) -> Result<U256, SimError> {
    vault.withdraw_queue.iter().try_fold(U256::ZERO, |total, id| {
        Ok(total.saturating_add(blue::expected_supply_assets(state, *id, vault.address)?))
    })
}

/// The vault as it would read after accruing, without touching the state.
pub(crate) fn accrued_view(state: &SimulationState, address: Address) -> Result<Vault, SimError> {
    let vault = state.vault(address)?;
    let total_assets = supply_assets(state, vault)?;
    Ok(vault.accrue_fee(total_assets).0)
}

/// Accrues every market of the withdraw queue, then the vault's performance fee.
pub(crate) fn accrue(state: &mut SimulationState, address: Address) -> Result<(), SimError> {
    let queue = state.vault(address)?.withdraw_queue.clone();
    for id in queue {
        blue::accrue(state, id)?;
    }

    let vault = state.vault(address)?;
    let total_assets = supply_assets(state, vault)?;
    let (vault, fee_shares) = vault.accrue_fee(total_assets);

    if !fee_shares.is_zero() {
        trace!(vault = %address, %total_assets, %fee_shares, "accrued vault fee");
        credit_shares(state, address, vault.fee_recipient, fee_shares)?;
    }
    state.set_vault(vault);
    Ok(())
}

/// Supplies `assets` down the supply queue, within each market's cap.
fn supply_to_queue(state: &mut SimulationState, vault: &Vault, assets: U256) -> Result<(), SimError> {
    let mut remaining = assets;
    for id in &vault.supply_queue {
        if remaining.is_zero() {
            break;
        }
        let config = state.vault_market_config(vault.address, *id)?;
        if !config.enabled {
            continue;
        }
        let room = config.cap_room(blue::expected_supply_assets(state, *id, vault.address)?);
        let supplied = math::min(room, remaining);
        if supplied.is_zero() {
            continue;
        }

        blue::supply(state, *id, Quantity::Assets(supplied), vault.address, vault.address)?;
        remaining -= supplied;
    }

    if remaining.is_zero() {
        Ok(())
    } else {
        Err(SimError::AllCapsReached {
            vault: vault.address,
            remaining,
        })
    }
}

/// Withdraws `assets` up the withdraw queue, bounded by each market's liquidity.
fn withdraw_from_queue(
    state: &mut SimulationState,
    vault: &Vault,
    assets: U256,
) -> Result<(), SimError> {
    let mut remaining = assets;
    for id in &vault.withdraw_queue {
        if remaining.is_zero() {
            break;
        }
        let liquidity = state.market(*id)?.liquidity();
        let supplied = blue::expected_supply_assets(state, *id, vault.address)?;
        let withdrawn = math::min(math::min(supplied, liquidity), remaining);
        if withdrawn.is_zero() {
            continue;
        }

        blue::withdraw(
            state,
            *id,
            Quantity::Assets(withdrawn),
            vault.address,
            vault.address,
            vault.address,
        )?;
        remaining -= withdrawn;
    }

    if remaining.is_zero() {
        Ok(())
    } else {
        Err(SimError::InsufficientVaultLiquidity {
            vault: vault.address,
            remaining,
        })
    }
}

/// Deposits (`Assets`) or mints (`Shares`) into the vault, pulling from `payer`.
///
/// Returns `(assets, shares)`.
pub(crate) fn deposit(
    state: &mut SimulationState,
    address: Address,
    quantity: Quantity,
    receiver: Address,
    payer: Address,
) -> Result<(U256, U256), SimError> {
    accrue(state, address)?;
    let mut vault = state.vault(address)?.clone();
    let (assets, shares) = vault.preview_deposit(quantity);

    erc20::move_tokens(state, vault.asset, payer, address, assets)?;
    supply_to_queue(state, &vault, assets)?;

    vault.total_assets += assets;
    vault.last_total_assets = vault.total_assets;
    vault.total_supply += shares;
    state.set_vault(vault);
    credit_shares(state, address, receiver, shares)?;

    Ok((assets, shares))
}

/// Withdraws (`Assets`) or redeems (`Shares`) from the vault.
pub(crate) fn withdraw(
    state: &mut SimulationState,
    address: Address,
    quantity: Quantity,
    parties: WithdrawParties,
) -> Result<(U256, U256), SimError> {
    accrue(state, address)?;
    let mut vault = state.vault(address)?.clone();
    let (assets, shares) = vault.preview_withdraw(quantity);

    burn_shares(state, address, parties, shares)?;
    withdraw_from_queue(state, &vault, assets)?;
    erc20::move_tokens(state, vault.asset, address, parties.receiver, assets)?;

    vault.total_assets = zero_floor_sub(vault.total_assets, assets);
    vault.last_total_assets = vault.total_assets;
    vault.total_supply = zero_floor_sub(vault.total_supply, shares);
    state.set_vault(vault);

    Ok((assets, shares))
}

pub(crate) fn handle_deposit(
    state: &mut SimulationState,
    ctx: &Context<'_>,
    sender: Address,
    address: Address,
    amount: AssetsOrShares,
    receiver: Address,
    slippage: Option<U256>,
) -> Result<Outcome, SimError> {
    accrue(state, address)?;
    let vault = state.vault(address)?;
    let balance = state.balance_of(sender, vault.asset);
    let quantity = amount.resolve(
        || balance,
        || vault.to_shares(balance, RoundingDirection::Down),
    );

    let expected = quoted(slippage, || {
        accrued_view(ctx.quote, address).map(|vault| vault.preview_deposit(quantity))
    })?;
    let resolved = deposit(state, address, quantity, receiver, sender)?;
    check_counterpart(slippage, quantity, expected, resolved, Flow::In)?;

    Ok(Outcome::both(resolved.0, resolved.1))
}

pub(crate) fn handle_withdraw(
    state: &mut SimulationState,
    ctx: &Context<'_>,
    address: Address,
    amount: AssetsOrShares,
    parties: WithdrawParties,
    slippage: Option<U256>,
) -> Result<Outcome, SimError> {
    accrue(state, address)?;
    let vault = state.vault(address)?;
    let owned = state.balance_of(parties.owner, address);
    let quantity = amount.resolve(
        || vault.to_assets(owned, RoundingDirection::Down),
        || owned,
    );

    let expected = quoted(slippage, || {
        accrued_view(ctx.quote, address).map(|vault| vault.preview_withdraw(quantity))
    })?;
    let resolved = withdraw(state, address, quantity, parties)?;
    check_counterpart(slippage, quantity, expected, resolved, Flow::Out)?;

    Ok(Outcome::both(resolved.0, resolved.1))
}

/// `PublicAllocator.reallocateTo`: moves liquidity from the withdrawal markets to
/// `supply_market` within flow caps, charging the vault's native fee to `sender`.
///
/// Returns the fee paid.
pub(crate) fn public_reallocate(
    state: &mut SimulationState,
    sender: Address,
    address: Address,
    withdrawals: &[ReallocationWithdrawal],
    supply_market: MarketId,
) -> Result<U256, SimError> {
    let mut vault = state.vault(address)?.clone();
    let fee = vault.public_allocator_fee()?;
    if withdrawals.is_empty() {
        return Err(SimError::EmptyWithdrawals { vault: address });
    }

    state.update_holding(sender, NATIVE_ADDRESS, |holding| holding.debit(fee))?;
    if let Some(config) = vault.public_allocator_config.as_mut() {
        config.accrued_fee += fee;
    }
    state.set_vault(vault);

    let mut total = U256::ZERO;
    let mut previous: Option<MarketId> = None;
    for withdrawal in withdrawals {
        let id = withdrawal.id;
        if previous.is_some_and(|previous| id <= previous) {
            return Err(SimError::WithdrawalsNotSorted { vault: address });
        }
        if id == supply_market {
            return Err(SimError::DepositMarketInWithdrawals {
                vault: address,
                market_id: id,
            });
        }
        previous = Some(id);

        let mut config = state.vault_market_config(address, id)?.clone();
        if !config.enabled {
            return Err(SimError::MarketNotEnabled {
                vault: address,
                market_id: id,
            });
        }
        config.record_outflow(withdrawal.assets)?;

        blue::accrue(state, id)?;
        if blue::expected_supply_assets(state, id, address)? < withdrawal.assets {
            return Err(SimError::NotEnoughSupply {
                vault: address,
                market_id: id,
                required: withdrawal.assets,
            });
        }
        blue::withdraw(state, id, Quantity::Assets(withdrawal.assets), address, address, address)?;
        state.set_vault_market_config(config);
        total += withdrawal.assets;
    }

    let mut config = state.vault_market_config(address, supply_market)?.clone();
    if !config.enabled {
        return Err(SimError::MarketNotEnabled {
            vault: address,
            market_id: supply_market,
        });
    }
    config.record_inflow(total)?;

    blue::accrue(state, supply_market)?;
    let supplied = blue::expected_supply_assets(state, supply_market, address)?;
    if supplied.saturating_add(total) > config.cap {
        return Err(SimError::SupplyCapExceeded {
            vault: address,
            market_id: supply_market,
            cap: config.cap,
        });
    }
    blue::supply(state, supply_market, Quantity::Assets(total), address, address)?;
    state.set_vault_market_config(config);

    trace!(vault = %address, %supply_market, %total, "publicly reallocated");
    Ok(fee)
}
