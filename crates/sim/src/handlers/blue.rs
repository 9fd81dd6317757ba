//! Morpho Blue market operations.

use alloy_primitives::{Address, U256};
use tracing::trace;

use crate::error::{MarketId, SimError};
use crate::handlers::{check_counterpart, erc20, quoted, Context, Flow, Outcome};
use crate::market::{Market, Quantity};
use crate::math::RoundingDirection;
use crate::operation::{Amount, AssetsOrShares};
use crate::state::SimulationState;

/// Accounts touched by an outgoing Blue operation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Parties {
    pub on_behalf: Address,
    pub receiver: Address,
}

/// Accrues the market to the state's timestamp and mints the fee shares to the
/// Morpho fee recipient.
pub(crate) fn accrue(state: &mut SimulationState, id: MarketId) -> Result<(), SimError> {
    let market = state.market(id)?;
    let accrued = market.accrue_interest(state.timestamp())?;
    let fee_shares = accrued
        .total_supply_shares
        .saturating_sub(market.total_supply_shares);

    if !fee_shares.is_zero() {
        let recipient = state.morpho_fee_recipient;
        trace!(market = %id, %recipient, %fee_shares, "minted market fee shares");
        let mut position = state.position_or_empty(recipient, id);
        position.supply_shares += fee_shares;
        state.set_position(position);
    }

    state.set_market(accrued);
    Ok(())
}

/// Supply assets of `user` in market `id`, accrued to the state's timestamp.
pub(crate) fn expected_supply_assets(
    state: &SimulationState,
    id: MarketId,
    user: Address,
) -> Result<U256, SimError> {
    Ok(state.accrual_position(user, id)?.supply_assets())
}

fn ensure_authorized(state: &SimulationState, sender: Address, owner: Address) -> Result<(), SimError> {
    let authorized =
        sender == owner || state.user(owner).is_some_and(|user| user.is_authorized(sender));
    if authorized {
        Ok(())
    } else {
        Err(SimError::Unauthorized { owner, sender })
    }
}

/// Side of the market totals an operation moves.
#[derive(Debug, Clone, Copy)]
enum Side {
    Supply,
    Borrow,
}

/// `(assets, shares)` of `quantity` on the quote state's market, accrued to
/// `timestamp`. Liquidity is only checked on the live state.
fn quote(
    ctx: &Context<'_>,
    id: MarketId,
    timestamp: u64,
    quantity: Quantity,
    side: Side,
    flow: Flow,
) -> Result<(U256, U256), SimError> {
    let market = ctx.quote.market(id)?.accrue_interest(timestamp)?;
    let (to_shares, to_assets) = match flow {
        Flow::In => (RoundingDirection::Down, RoundingDirection::Up),
        Flow::Out => (RoundingDirection::Up, RoundingDirection::Down),
    };
    Ok(match (quantity, side) {
        (Quantity::Assets(assets), Side::Supply) => {
            (assets, market.to_supply_shares(assets, to_shares))
        }
        (Quantity::Shares(shares), Side::Supply) => {
            (market.to_supply_assets(shares, to_assets), shares)
        }
        (Quantity::Assets(assets), Side::Borrow) => {
            (assets, market.to_borrow_shares(assets, to_shares))
        }
        (Quantity::Shares(shares), Side::Borrow) => {
            (market.to_borrow_assets(shares, to_assets), shares)
        }
    })
}

// ==================== Primitives ====================

/// Supplies on behalf of `on_behalf`, pulling the loan token from `payer`.
///
/// Returns `(assets, shares)`.
pub(crate) fn supply(
    state: &mut SimulationState,
    id: MarketId,
    quantity: Quantity,
    on_behalf: Address,
    payer: Address,
) -> Result<(U256, U256), SimError> {
    accrue(state, id)?;
    let market = state.market(id)?;
    let loan_token = market.params.loan_token;
    let (position, market, assets, shares) =
        state
            .position_or_empty(on_behalf, id)
            .supply(market, quantity, state.timestamp())?;

    erc20::pull_to_morpho(state, loan_token, payer, assets)?;
    state.set_market(market);
    state.set_position(position);
    Ok((assets, shares))
}

/// Withdraws supply of `on_behalf` to `receiver`.
pub(crate) fn withdraw(
    state: &mut SimulationState,
    id: MarketId,
    quantity: Quantity,
    on_behalf: Address,
    receiver: Address,
    sender: Address,
) -> Result<(U256, U256), SimError> {
    ensure_authorized(state, sender, on_behalf)?;
    accrue(state, id)?;
    let market = state.market(id)?;
    let loan_token = market.params.loan_token;
    let (position, market, assets, shares) =
        state
            .position_or_empty(on_behalf, id)
            .withdraw(market, quantity, state.timestamp())?;

    state.set_market(market);
    state.set_position(position);
    let morpho = state.addresses.morpho;
    erc20::move_tokens(state, loan_token, morpho, receiver, assets)?;
    Ok((assets, shares))
}

pub(crate) fn borrow(
    state: &mut SimulationState,
    id: MarketId,
    quantity: Quantity,
    on_behalf: Address,
    receiver: Address,
    sender: Address,
) -> Result<(U256, U256), SimError> {
    ensure_authorized(state, sender, on_behalf)?;
    accrue(state, id)?;
    let market = state.market(id)?;
    let loan_token = market.params.loan_token;
    let (position, market, assets, shares) =
        state
            .position_or_empty(on_behalf, id)
            .borrow(market, quantity, state.timestamp())?;

    state.set_market(market);
    state.set_position(position);
    let morpho = state.addresses.morpho;
    erc20::move_tokens(state, loan_token, morpho, receiver, assets)?;
    Ok((assets, shares))
}

pub(crate) fn repay(
    state: &mut SimulationState,
    id: MarketId,
    quantity: Quantity,
    on_behalf: Address,
    payer: Address,
) -> Result<(U256, U256), SimError> {
    accrue(state, id)?;
    let market = state.market(id)?;
    let loan_token = market.params.loan_token;
    let (position, market, assets, shares) =
        state
            .position_or_empty(on_behalf, id)
            .repay(market, quantity, state.timestamp())?;

    erc20::pull_to_morpho(state, loan_token, payer, assets)?;
    state.set_market(market);
    state.set_position(position);
    Ok((assets, shares))
}

// ==================== Handlers ====================

pub(crate) fn handle_supply(
    state: &mut SimulationState,
    ctx: &Context<'_>,
    sender: Address,
    id: MarketId,
    amount: AssetsOrShares,
    on_behalf: Address,
    slippage: Option<U256>,
) -> Result<Outcome, SimError> {
    accrue(state, id)?;
    let market = state.market(id)?;
    let balance = state.balance_of(sender, market.params.loan_token);
    let quantity = amount.resolve(
        || balance,
        || market.to_supply_shares(balance, RoundingDirection::Down),
    );

    let timestamp = state.timestamp();
    let expected = quoted(slippage, || {
        quote(ctx, id, timestamp, quantity, Side::Supply, Flow::In)
    })?;
    let (assets, shares) = supply(state, id, quantity, on_behalf, sender)?;
    check_counterpart(slippage, quantity, expected, (assets, shares), Flow::In)?;

    Ok(Outcome::both(assets, shares))
}

pub(crate) fn handle_withdraw(
    state: &mut SimulationState,
    ctx: &Context<'_>,
    sender: Address,
    id: MarketId,
    amount: AssetsOrShares,
    parties: Parties,
    slippage: Option<U256>,
) -> Result<Outcome, SimError> {
    accrue(state, id)?;
    let position = state.accrual_position(parties.on_behalf, id)?;
    let quantity = amount.resolve(
        || position.supply_assets(),
        || position.position.supply_shares,
    );

    let timestamp = state.timestamp();
    let expected = quoted(slippage, || {
        quote(ctx, id, timestamp, quantity, Side::Supply, Flow::Out)
    })?;
    let (assets, shares) = withdraw(state, id, quantity, parties.on_behalf, parties.receiver, sender)?;
    check_counterpart(slippage, quantity, expected, (assets, shares), Flow::Out)?;

    Ok(Outcome::both(assets, shares))
}

pub(crate) fn handle_borrow(
    state: &mut SimulationState,
    ctx: &Context<'_>,
    sender: Address,
    id: MarketId,
    amount: AssetsOrShares,
    parties: Parties,
    slippage: Option<U256>,
) -> Result<Outcome, SimError> {
    accrue(state, id)?;
    let position = state.accrual_position(parties.on_behalf, id)?;
    let borrowable = position.max_borrowable_assets().unwrap_or_default();
    let quantity = amount.resolve(
        || borrowable,
        || position.market.to_borrow_shares(borrowable, RoundingDirection::Down),
    );

    let timestamp = state.timestamp();
    let expected = quoted(slippage, || {
        quote(ctx, id, timestamp, quantity, Side::Borrow, Flow::Out)
    })?;
    let (assets, shares) = borrow(state, id, quantity, parties.on_behalf, parties.receiver, sender)?;
    check_counterpart(slippage, quantity, expected, (assets, shares), Flow::Out)?;

    Ok(Outcome::both(assets, shares))
}

pub(crate) fn handle_repay(
    state: &mut SimulationState,
    ctx: &Context<'_>,
    sender: Address,
    id: MarketId,
    amount: AssetsOrShares,
    on_behalf: Address,
    slippage: Option<U256>,
) -> Result<Outcome, SimError> {
    accrue(state, id)?;
    let position = state.accrual_position(on_behalf, id)?;
    let quantity = amount.resolve(
        || position.borrow_assets(),
        || position.position.borrow_shares,
    );

    let timestamp = state.timestamp();
    let expected = quoted(slippage, || {
        quote(ctx, id, timestamp, quantity, Side::Borrow, Flow::In)
    })?;
    let (assets, shares) = repay(state, id, quantity, on_behalf, sender)?;
    check_counterpart(slippage, quantity, expected, (assets, shares), Flow::In)?;

    Ok(Outcome::both(assets, shares))
}

pub(crate) fn handle_supply_collateral(
    state: &mut SimulationState,
    sender: Address,
    id: MarketId,
    amount: Amount,
    on_behalf: Address,
) -> Result<Outcome, SimError> {
    let collateral_token = state.market(id)?.params.collateral_token;
    let assets = amount.resolve(|| state.balance_of(sender, collateral_token));

    erc20::pull_to_morpho(state, collateral_token, sender, assets)?;
    let position = state.position_or_empty(on_behalf, id).supply_collateral(assets);
    state.set_position(position);

    Ok(Outcome::assets(assets))
}

pub(crate) fn handle_withdraw_collateral(
    state: &mut SimulationState,
    sender: Address,
    id: MarketId,
    amount: Amount,
    parties: Parties,
) -> Result<Outcome, SimError> {
    ensure_authorized(state, sender, parties.on_behalf)?;
    accrue(state, id)?;

    let market = state.market(id)?;
    let collateral_token = market.params.collateral_token;
    let position = state.position_or_empty(parties.on_behalf, id);
    let assets = amount.resolve(|| position.collateral);
    let (position, market) = position.withdraw_collateral(market, assets, state.timestamp())?;

    state.set_market(market);
    state.set_position(position);
    let morpho = state.addresses.morpho;
    erc20::move_tokens(state, collateral_token, morpho, parties.receiver, assets)?;

    Ok(Outcome::assets(assets))
}

/// `setAuthorization` by the owner, or `setAuthorizationWithSig` relayed by anyone.
pub(crate) fn set_authorization(
    state: &mut SimulationState,
    sender: Address,
    owner: Address,
    authorized: Address,
    is_authorized: bool,
    signed: bool,
) -> Result<(), SimError> {
    if !signed && sender != owner {
        return Err(SimError::Unauthorized { owner, sender });
    }

    let mut user = state.user_or_new(owner);
    if signed {
        user.morpho_nonce += U256::from(1);
    }
    user.set_authorization(authorized, is_authorized);
    state.set_user(user);
    Ok(())
}
