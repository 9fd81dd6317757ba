//! Per-protocol operation handlers.
//!
//! Handlers mutate a working copy of the state in place; [`crate::simulate`]
//! discards the copy when a handler fails.

pub(crate) mod blue;
pub(crate) mod erc20;
pub(crate) mod metamorpho;
pub(crate) mod vault_v2;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::market::Quantity;
use crate::math::{w_mul_down, w_mul_up, RoundingDirection, WAD};
use crate::operation::{Operation, OperationKind};
use crate::state::SimulationState;
use crate::vault::Vault;
use crate::vault_v2::VaultV2;

/// Amounts resolved while applying an operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shares: Option<U256>,
}

impl Outcome {
    pub(crate) fn none() -> Self {
        Self::default()
    }

    pub(crate) fn assets(assets: U256) -> Self {
        Self {
            assets: Some(assets),
            shares: None,
        }
    }

    pub(crate) fn both(assets: U256, shares: U256) -> Self {
        Self {
            assets: Some(assets),
            shares: Some(shares),
        }
    }
}

/// Read-only inputs shared by every operation of a run.
pub(crate) struct Context<'a> {
    /// State the run started from, used as the slippage reference
    pub quote: &'a SimulationState,
}

/// Which side of the expected value the resolved one may not cross.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Tolerance {
    /// `actual >= expected * (1 - slippage)`
    AtLeast,
    /// `actual <= expected * (1 + slippage)`
    AtMost,
}

pub(crate) fn check_slippage(
    expected: U256,
    actual: U256,
    slippage: U256,
    tolerance: Tolerance,
) -> Result<(), SimError> {
    let within = match tolerance {
        Tolerance::AtLeast => actual >= w_mul_down(expected, WAD.saturating_sub(slippage)),
        Tolerance::AtMost => actual <= w_mul_up(expected, WAD.saturating_add(slippage)),
    };
    if within {
        Ok(())
    } else {
        Err(SimError::SlippageExceeded {
            expected,
            actual,
            slippage,
        })
    }
}

/// Direction of the assets of an operation relative to the protocol.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Flow {
    /// Supply, repay, deposit, mint
    In,
    /// Withdraw, borrow, redeem
    Out,
}

/// Runs `quote` when a slippage bound is set.
pub(crate) fn quoted<T>(
    slippage: Option<U256>,
    quote: impl FnOnce() -> Result<T, SimError>,
) -> Result<Option<T>, SimError> {
    slippage.map(|_| quote()).transpose()
}

/// Compares the counterpart of the side `quantity` fixes against its quoted value.
///
/// Incoming assets may not buy fewer shares (or cost more assets) than quoted,
/// outgoing ones may not burn more shares (or yield fewer assets).
pub(crate) fn check_counterpart(
    slippage: Option<U256>,
    quantity: Quantity,
    expected: Option<(U256, U256)>,
    actual: (U256, U256),
    flow: Flow,
) -> Result<(), SimError> {
    let (Some(slippage), Some((expected_assets, expected_shares))) = (slippage, expected) else {
        return Ok(());
    };
    let (assets, shares) = actual;
    match (quantity, flow) {
        (Quantity::Assets(_), Flow::In) => {
            check_slippage(expected_shares, shares, slippage, Tolerance::AtLeast)
        }
        (Quantity::Shares(_), Flow::In) => {
            check_slippage(expected_assets, assets, slippage, Tolerance::AtMost)
        }
        (Quantity::Assets(_), Flow::Out) => {
            check_slippage(expected_shares, shares, slippage, Tolerance::AtMost)
        }
        (Quantity::Shares(_), Flow::Out) => {
            check_slippage(expected_assets, assets, slippage, Tolerance::AtLeast)
        }
    }
}

/// ERC-4626 share accounting shared by MetaMorpho and Vault V2.
pub(crate) trait Erc4626 {
    fn convert_to_assets(&self, shares: U256, rounding: RoundingDirection) -> U256;

    fn convert_to_shares(&self, assets: U256, rounding: RoundingDirection) -> U256;

    /// `(assets, shares)` of a deposit (`Assets`) or a mint (`Shares`).
    fn preview_deposit(&self, quantity: Quantity) -> (U256, U256) {
        match quantity {
            Quantity::Assets(assets) => (assets, self.convert_to_shares(assets, RoundingDirection::Down)),
            Quantity::Shares(shares) => (self.convert_to_assets(shares, RoundingDirection::Up), shares),
        }
    }

    /// `(assets, shares)` of a withdraw (`Assets`) or a redeem (`Shares`).
    fn preview_withdraw(&self, quantity: Quantity) -> (U256, U256) {
        match quantity {
            Quantity::Assets(assets) => (assets, self.convert_to_shares(assets, RoundingDirection::Up)),
            Quantity::Shares(shares) => (self.convert_to_assets(shares, RoundingDirection::Down), shares),
        }
    }
}

impl Erc4626 for Vault {
    fn convert_to_assets(&self, shares: U256, rounding: RoundingDirection) -> U256 {
        self.to_assets(shares, rounding)
    }

    fn convert_to_shares(&self, assets: U256, rounding: RoundingDirection) -> U256 {
        self.to_shares(assets, rounding)
    }
}

impl Erc4626 for VaultV2 {
    fn convert_to_assets(&self, shares: U256, rounding: RoundingDirection) -> U256 {
        self.to_assets(shares, rounding)
    }

    fn convert_to_shares(&self, assets: U256, rounding: RoundingDirection) -> U256 {
        self.to_shares(assets, rounding)
    }
}

pub(crate) fn apply(
    state: &mut SimulationState,
    operation: &Operation,
    ctx: &Context<'_>,
) -> Result<Outcome, SimError> {
    let sender = operation.sender;
    match &operation.kind {
        OperationKind::BlueAccrueInterest { id } => {
            blue::accrue(state, *id)?;
            Ok(Outcome::none())
        }
        OperationKind::BlueSupply {
            id,
            amount,
            on_behalf,
            slippage,
        } => blue::handle_supply(state, ctx, sender, *id, *amount, *on_behalf, *slippage),
        OperationKind::BlueWithdraw {
            id,
            amount,
            on_behalf,
            receiver,
            slippage,
        } => blue::handle_withdraw(
            state,
            ctx,
            sender,
            *id,
            *amount,
            blue::Parties {
                on_behalf: *on_behalf,
                receiver: *receiver,
            },
            *slippage,
        ),
        OperationKind::BlueBorrow {
            id,
            amount,
            on_behalf,
            receiver,
            slippage,
        } => blue::handle_borrow(
            state,
            ctx,
            sender,
            *id,
            *amount,
            blue::Parties {
                on_behalf: *on_behalf,
                receiver: *receiver,
            },
            *slippage,
        ),
        OperationKind::BlueRepay {
            id,
            amount,
            on_behalf,
            slippage,
        } => blue::handle_repay(state, ctx, sender, *id, *amount, *on_behalf, *slippage),
        OperationKind::BlueSupplyCollateral {
            id,
            assets,
            on_behalf,
        } => blue::handle_supply_collateral(state, sender, *id, *assets, *on_behalf),
        OperationKind::BlueWithdrawCollateral {
            id,
            assets,
            on_behalf,
            receiver,
        } => blue::handle_withdraw_collateral(
            state,
            sender,
            *id,
            *assets,
            blue::Parties {
                on_behalf: *on_behalf,
                receiver: *receiver,
            },
        ),
        OperationKind::BlueSetAuthorization {
            owner,
            authorized,
            is_authorized,
            signed,
        } => {
            blue::set_authorization(state, sender, *owner, *authorized, *is_authorized, *signed)?;
            Ok(Outcome::none())
        }
        OperationKind::MetaMorphoAccrueInterest { vault } => {
            metamorpho::accrue(state, *vault)?;
            Ok(Outcome::none())
        }
        OperationKind::MetaMorphoDeposit {
            vault,
            amount,
            receiver,
            slippage,
        } => metamorpho::handle_deposit(state, ctx, sender, *vault, *amount, *receiver, *slippage),
        OperationKind::MetaMorphoWithdraw {
            vault,
            amount,
            receiver,
            owner,
            slippage,
        } => metamorpho::handle_withdraw(
            state,
            ctx,
            *vault,
            *amount,
            metamorpho::WithdrawParties {
                sender,
                owner: *owner,
                receiver: *receiver,
            },
            *slippage,
        ),
        OperationKind::MetaMorphoPublicReallocate {
            vault,
            withdrawals,
            supply_market,
        } => {
            let fee = metamorpho::public_reallocate(state, sender, *vault, withdrawals, *supply_market)?;
            Ok(Outcome::assets(fee))
        }
        OperationKind::VaultV2AccrueInterest { vault } => {
            vault_v2::accrue(state, *vault)?;
            Ok(Outcome::none())
        }
        OperationKind::VaultV2Deposit {
            vault,
            amount,
            receiver,
            slippage,
        } => vault_v2::handle_deposit(state, ctx, sender, *vault, *amount, *receiver, *slippage),
        OperationKind::VaultV2Withdraw {
            vault,
            amount,
            receiver,
            owner,
            slippage,
        } => vault_v2::handle_withdraw(
            state,
            ctx,
            *vault,
            *amount,
            metamorpho::WithdrawParties {
                sender,
                owner: *owner,
                receiver: *receiver,
            },
            *slippage,
        ),
        OperationKind::Erc20Transfer {
            token,
            from,
            to,
            amount,
        } => erc20::transfer(state, sender, *token, *from, *to, *amount).map(Outcome::assets),
        OperationKind::Erc20Transfer2 {
            token,
            from,
            to,
            amount,
        } => erc20::transfer2(state, sender, *token, *from, *to, *amount).map(Outcome::assets),
        OperationKind::Erc20Approve {
            token,
            spender,
            amount,
        } => {
            erc20::approve(state, sender, *token, *spender, *amount)?;
            Ok(Outcome::none())
        }
        OperationKind::Erc20Permit {
            token,
            spender,
            amount,
            nonce,
        } => {
            erc20::permit(state, sender, *token, *spender, *amount, *nonce)?;
            Ok(Outcome::none())
        }
        OperationKind::Erc20Permit2 {
            token,
            amount,
            expiration,
            nonce,
        } => {
            erc20::permit2(state, sender, *token, *amount, *expiration, *nonce)?;
            Ok(Outcome::none())
        }
        OperationKind::Erc20Wrap {
            token,
            owner,
            amount,
        } => erc20::wrap(state, sender, *token, *owner, *amount),
        OperationKind::Erc20Unwrap {
            token,
            receiver,
            amount,
        } => erc20::unwrap(state, sender, *token, *receiver, *amount),
    }
}
