//! Token transfers, approvals, permits and wrappers.

use alloy_primitives::{Address, U256};

use crate::error::{Entity, SimError};
use crate::handlers::Outcome;
use crate::holding::{Spender, MAX_UINT_160};
use crate::math::RoundingDirection;
use crate::operation::Amount;
use crate::state::SimulationState;

/// Moves `amount` of `token` between holdings.
///
/// Morpho's custody is ledgered by market totals, so only the counterparty's
/// holding moves when Morpho is on either side.
pub(crate) fn move_tokens(
    state: &mut SimulationState,
    token: Address,
    from: Address,
    to: Address,
    amount: U256,
) -> Result<(), SimError> {
    if amount.is_zero() || from == to {
        return Ok(());
    }

    let morpho = state.addresses.morpho;
    if from != morpho {
        state.update_holding(from, token, |holding| holding.debit(amount))?;
    }
    if to != morpho {
        state.update_holding(to, token, |holding| {
            holding.credit(amount);
            Ok(())
        })?;
    }
    Ok(())
}

/// Morpho pulls `amount` of `token` from `payer` via `transferFrom`.
///
/// Protocol contracts approve Morpho themselves before pulling.
pub(crate) fn pull_to_morpho(
    state: &mut SimulationState,
    token: Address,
    payer: Address,
    amount: U256,
) -> Result<(), SimError> {
    let morpho = state.addresses.morpho;
    if !state.is_protocol_contract(payer) {
        state.update_holding(payer, token, |holding| {
            holding.spend_allowance(Spender::Morpho, morpho, amount)
        })?;
    }
    move_tokens(state, token, payer, morpho, amount)
}

/// `transfer` when `sender == from`, otherwise `transferFrom` by a canonical spender.
pub(crate) fn transfer(
    state: &mut SimulationState,
    sender: Address,
    token: Address,
    from: Address,
    to: Address,
    amount: Amount,
) -> Result<U256, SimError> {
    state.ensure_token(token)?;
    let amount = amount.resolve(|| state.balance_of(from, token));

    if sender != from {
        let spender = Spender::resolve(sender, &state.addresses)?;
        state.update_holding(from, token, |holding| {
            holding.spend_allowance(spender, sender, amount)
        })?;
    }

    move_tokens(state, token, from, to, amount)?;
    Ok(amount)
}

/// Permit2 `transferFrom` on behalf of GeneralAdapter1.
pub(crate) fn transfer2(
    state: &mut SimulationState,
    sender: Address,
    token: Address,
    from: Address,
    to: Address,
    amount: Amount,
) -> Result<U256, SimError> {
    state.ensure_token(token)?;
    let permit2 = permit2_address(state)?;
    let amount = amount.resolve(|| state.balance_of(from, token));
    let timestamp = state.timestamp();
    let adapter = state.addresses.general_adapter1;

    state.update_holding(from, token, |holding| {
        let record = &mut holding.permit2_allowance;
        if sender != adapter || amount > record.amount {
            return Err(SimError::InsufficientAllowance {
                owner: from,
                token,
                spender: sender,
                allowance: if sender == adapter { record.amount } else { U256::ZERO },
                required: amount,
            });
        }
        if record.expiration < timestamp {
            return Err(SimError::ExpiredPermit2 {
                owner: from,
                token,
                expiration: record.expiration,
                timestamp,
            });
        }
        if record.amount != MAX_UINT_160 {
            record.amount -= amount;
        }
        holding.spend_allowance(Spender::Permit2, permit2, amount)
    })?;

    move_tokens(state, token, from, to, amount)?;
    Ok(amount)
}

pub(crate) fn approve(
    state: &mut SimulationState,
    sender: Address,
    token: Address,
    spender: Address,
    amount: U256,
) -> Result<(), SimError> {
    state.ensure_token(token)?;
    let spender = Spender::resolve(spender, &state.addresses)?;
    state.update_holding(sender, token, |holding| {
        *holding.allowances.get_mut(spender) = amount;
        Ok(())
    })
}

/// EIP-2612 permit signed by `sender`; the nonce must match and is consumed.
pub(crate) fn permit(
    state: &mut SimulationState,
    sender: Address,
    token: Address,
    spender: Address,
    amount: U256,
    nonce: U256,
) -> Result<(), SimError> {
    let supports_permit = state.is_vault(token)
        || state.token(token).is_ok_and(|metadata| metadata.supports_permit());
    if !supports_permit {
        state.ensure_token(token)?;
        return Err(SimError::PermitUnsupported { token });
    }

    let spender = Spender::resolve(spender, &state.addresses)?;
    state.update_holding(sender, token, |holding| {
        let expected = holding.erc2612_nonce.unwrap_or_default();
        if expected != nonce {
            return Err(SimError::InvalidNonce {
                owner: sender,
                expected,
                provided: nonce,
            });
        }
        holding.erc2612_nonce = Some(expected + U256::from(1));
        *holding.allowances.get_mut(spender) = amount;
        Ok(())
    })
}

/// Permit2 `permit` granting GeneralAdapter1 an allowance on `token`.
pub(crate) fn permit2(
    state: &mut SimulationState,
    sender: Address,
    token: Address,
    amount: U256,
    expiration: u64,
    nonce: u64,
) -> Result<(), SimError> {
    state.ensure_token(token)?;
    permit2_address(state)?;

    state.update_holding(sender, token, |holding| {
        let record = &mut holding.permit2_allowance;
        if record.nonce != nonce {
            return Err(SimError::InvalidNonce {
                owner: sender,
                expected: U256::from(record.nonce),
                provided: U256::from(nonce),
            });
        }
        record.amount = amount;
        record.expiration = expiration;
        record.nonce += 1;
        Ok(())
    })
}

/// Wraps `amount` of the underlying held by `sender` into `token` for `owner`.
///
/// Wrapper contracts custody the underlying outside the ledger: the underlying is
/// burnt from the sender and the wrapped token minted to the owner.
pub(crate) fn wrap(
    state: &mut SimulationState,
    sender: Address,
    token: Address,
    owner: Address,
    amount: Amount,
) -> Result<Outcome, SimError> {
    let metadata = state.token(token)?.clone();
    let wrapper = metadata
        .wrapper
        .as_ref()
        .ok_or(SimError::NotWrapper { token })?;

    let underlying = amount.resolve(|| state.balance_of(sender, wrapper.underlying));
    let wrapped = metadata
        .to_wrapped(underlying, RoundingDirection::Down)
        .ok_or(SimError::NotWrapper { token })?;

    state.update_holding(sender, wrapper.underlying, |holding| holding.debit(underlying))?;
    state.update_holding(owner, token, |holding| {
        holding.credit(wrapped);
        Ok(())
    })?;

    Ok(Outcome::both(underlying, wrapped))
}

/// Unwraps `amount` of `token` held by `sender`, sending the underlying to `receiver`.
pub(crate) fn unwrap(
    state: &mut SimulationState,
    sender: Address,
    token: Address,
    receiver: Address,
    amount: Amount,
) -> Result<Outcome, SimError> {
    let metadata = state.token(token)?.clone();
    let wrapper = metadata
        .wrapper
        .as_ref()
        .ok_or(SimError::NotWrapper { token })?;

    let wrapped = amount.resolve(|| state.balance_of(sender, token));
    let underlying = metadata
        .to_unwrapped(wrapped, RoundingDirection::Down)
        .ok_or(SimError::NotWrapper { token })?;

    state.update_holding(sender, token, |holding| holding.debit(wrapped))?;
    state.update_holding(receiver, wrapper.underlying, |holding| {
        holding.credit(underlying);
        Ok(())
    })?;

    Ok(Outcome::both(underlying, wrapped))
}

fn permit2_address(state: &SimulationState) -> Result<Address, SimError> {
    state
        .addresses
        .permit2
        .ok_or(SimError::UnknownEntity(Entity::Spender {
            address: Address::ZERO,
        }))
}
