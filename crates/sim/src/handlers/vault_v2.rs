//! Vault V2 operations.

use alloy_primitives::{Address, U256};
use tracing::trace;

use crate::error::SimError;
use crate::handlers::metamorpho::{burn_shares, WithdrawParties};
use crate::handlers::{check_counterpart, erc20, quoted, Context, Erc4626, Flow, Outcome};
use crate::market::Quantity;
use crate::math::{zero_floor_sub, RoundingDirection};
use crate::operation::AssetsOrShares;
use crate::state::SimulationState;
use crate::vault_v2::{Adapter, VaultV2Accrual};

/// Idle balance plus every adapter's real assets.
fn real_assets(state: &SimulationState, address: Address) -> Result<U256, SimError> {
    let vault = state.vault_v2(address)?;
    vault
        .adapters
        .iter()
        .try_fold(state.balance_of(address, vault.asset), |total, adapter| {
            let assets = state.vault_v2_adapter(*adapter)?.real_assets(state)?;
            Ok(total.saturating_add(assets))
        })
}

fn accrual(state: &SimulationState, address: Address) -> Result<VaultV2Accrual, SimError> {
    let real_assets = real_assets(state, address)?;
    state
        .vault_v2(address)?
        .accrue(real_assets, state.timestamp())
}

fn credit_shares(
    state: &mut SimulationState,
    vault: Address,
    receiver: Address,
    shares: U256,
) -> Result<(), SimError> {
    if shares.is_zero() {
        return Ok(());
    }
    state.update_holding(receiver, vault, |holding| {
        holding.credit(shares);
        Ok(())
    })
}

/// Accrues interest and mints the performance and management fee shares.
pub(crate) fn accrue(state: &mut SimulationState, address: Address) -> Result<(), SimError> {
    let VaultV2Accrual {
        vault,
        performance_fee_shares,
        management_fee_shares,
    } = accrual(state, address)?;

    trace!(
        vault = %address,
        total_assets = %vault.total_assets,
        %performance_fee_shares,
        %management_fee_shares,
        "accrued vault v2"
    );
    credit_shares(state, address, vault.performance_fee_recipient, performance_fee_shares)?;
    credit_shares(state, address, vault.management_fee_recipient, management_fee_shares)?;
    state.set_vault_v2(vault);
    Ok(())
}

/// Deposits (`Assets`) or mints (`Shares`), then allocates to the liquidity adapter.
pub(crate) fn deposit(
    state: &mut SimulationState,
    address: Address,
    quantity: Quantity,
    receiver: Address,
    payer: Address,
) -> Result<(U256, U256), SimError> {
    accrue(state, address)?;
    let mut vault = state.vault_v2(address)?.clone();
    let (assets, shares) = vault.preview_deposit(quantity);

    erc20::move_tokens(state, vault.asset, payer, address, assets)?;
    vault.total_assets += assets;
    vault.total_supply += shares;
    let liquidity_adapter = vault.liquidity_adapter;
    let liquidity_market = vault.liquidity_market;
    state.set_vault_v2(vault);
    credit_shares(state, address, receiver, shares)?;

    if let Some(adapter) = liquidity_adapter {
        let adapter = state.vault_v2_adapter(adapter)?.clone();
        adapter.allocate(state, assets, liquidity_market)?;
    }

    Ok((assets, shares))
}

/// Withdraws (`Assets`) or redeems (`Shares`), deallocating the idle shortfall
/// from the liquidity adapter.
pub(crate) fn withdraw(
    state: &mut SimulationState,
    address: Address,
    quantity: Quantity,
    parties: WithdrawParties,
) -> Result<(U256, U256), SimError> {
    accrue(state, address)?;
    let mut vault = state.vault_v2(address)?.clone();
    let (assets, shares) = vault.preview_withdraw(quantity);

    burn_shares(state, address, parties, shares)?;

    let idle = state.balance_of(address, vault.asset);
    if idle < assets {
        if let Some(adapter) = vault.liquidity_adapter {
            let adapter = state.vault_v2_adapter(adapter)?.clone();
            adapter.deallocate(state, assets - idle, vault.liquidity_market)?;
        }
    }

    let idle = state.balance_of(address, vault.asset);
    if idle < assets {
        return Err(SimError::InsufficientVaultLiquidity {
            vault: address,
            remaining: assets - idle,
        });
    }
    erc20::move_tokens(state, vault.asset, address, parties.receiver, assets)?;

    vault.total_assets = zero_floor_sub(vault.total_assets, assets);
    vault.total_supply = zero_floor_sub(vault.total_supply, shares);
    state.set_vault_v2(vault);

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
    let vault = state.vault_v2(address)?;
    let balance = state.balance_of(sender, vault.asset);
    let quantity = amount.resolve(
        || balance,
        || vault.to_shares(balance, RoundingDirection::Down),
    );

    let expected = quoted(slippage, || {
        accrual(ctx.quote, address).map(|accrued| accrued.vault.preview_deposit(quantity))
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
    let vault = state.vault_v2(address)?;
    let owned = state.balance_of(parties.owner, address);
    let quantity = amount.resolve(
        || vault.to_assets(owned, RoundingDirection::Down),
        || owned,
    );

    let expected = quoted(slippage, || {
        accrual(ctx.quote, address).map(|accrued| accrued.vault.preview_withdraw(quantity))
    })?;
    let resolved = withdraw(state, address, quantity, parties)?;
    check_counterpart(slippage, quantity, expected, resolved, Flow::Out)?;

    Ok(Outcome::both(resolved.0, resolved.1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::blue;
    use crate::operation::Amount;
    use crate::test_fixtures::{
        self, advance, ether, market_id, usdc, usdc_shares, USDC, USER, VAULT_V2, VAULT_V2_ADAPTER,
    };

    fn ctx(state: &SimulationState) -> Context<'_> {
        Context { quote: state }
    }

    #[test]
    fn test_deposit_allocates_to_liquidity_adapter() {
        let start = test_fixtures::vault_v2_state();
        let mut state = start.clone();

        let outcome = handle_deposit(
            &mut state,
            &ctx(&start),
            USER,
            VAULT_V2,
            AssetsOrShares::assets(usdc(1_000)),
            USER,
            Some(U256::ZERO),
        )
        .unwrap();

        assert_eq!(outcome.shares, Some(ether(1_000)));
        assert_eq!(state.balance_of(USER, VAULT_V2), ether(1_000));
        assert_eq!(state.balance_of(VAULT_V2, USDC), U256::ZERO);
        assert_eq!(
            state.position(VAULT_V2_ADAPTER, market_id()).unwrap().supply_shares,
            usdc_shares(1_000)
        );
        assert_eq!(state.market(market_id()).unwrap().total_supply_assets, usdc(11_750));
        assert_eq!(state.vault_v2(VAULT_V2).unwrap().total_assets, usdc(1_000));
    }

    #[test]
    fn test_withdraw_deallocates_shortfall() {
        let start = test_fixtures::vault_v2_state();
        let mut state = start.clone();
        handle_deposit(&mut state, &ctx(&start), USER, VAULT_V2, AssetsOrShares::assets(usdc(1_000)), USER, None)
            .unwrap();

        let outcome = handle_withdraw(
            &mut state,
            &ctx(&start),
            VAULT_V2,
            AssetsOrShares::assets(usdc(400)),
            WithdrawParties::own(USER),
            None,
        )
        .unwrap();

        assert_eq!(outcome.assets, Some(usdc(400)));
        assert_eq!(state.balance_of(USER, USDC), usdc(9_400));
        assert_eq!(
            blue::expected_supply_assets(&state, market_id(), VAULT_V2_ADAPTER).unwrap(),
            usdc(600)
        );
        assert_eq!(state.vault_v2(VAULT_V2).unwrap().total_assets, usdc(600));
    }

    #[test]
    fn test_accrue_caps_growth_and_mints_fees() {
        let start = test_fixtures::vault_v2_state();
        let mut state = start.clone();
        handle_deposit(&mut state, &ctx(&start), USER, VAULT_V2, AssetsOrShares::assets(usdc(1_000)), USER, None)
            .unwrap();

        let mut vault = state.vault_v2(VAULT_V2).unwrap().clone();
        vault.performance_fee = U256::from(100_000_000_000_000_000u64);
        vault.performance_fee_recipient = test_fixtures::FEE_RECIPIENT;
        state.set_vault_v2(vault);
        let mut state = advance(state, 30 * 86_400);

        let real = real_assets(&state, VAULT_V2).unwrap();
        accrue(&mut state, VAULT_V2).unwrap();

        let vault = state.vault_v2(VAULT_V2).unwrap();
        assert!(vault.total_assets > usdc(1_000));
        assert!(vault.total_assets <= real);
        assert_eq!(vault.last_update, state.timestamp());
        let fee_shares = state.balance_of(test_fixtures::FEE_RECIPIENT, VAULT_V2);
        assert_eq!(vault.total_supply, ether(1_000) + fee_shares);
    }

    #[test]
    fn test_redeem_more_than_owned() {
        let start = test_fixtures::vault_v2_state();
        let mut state = start.clone();
        let result = handle_withdraw(
            &mut state,
            &ctx(&start),
            VAULT_V2,
            AssetsOrShares::Shares(Amount::exact(U256::from(1))),
            WithdrawParties::own(USER),
            None,
        );
        assert!(matches!(result, Err(SimError::InsufficientShares { .. })));
    }
}
