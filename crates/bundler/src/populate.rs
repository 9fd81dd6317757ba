//! Rewrites user inputs into operations the adapter can execute.
//!
//! Each input is simulated on a running state as soon as it is rewritten, so
//! later inputs see the balances, allowances and nonces left by earlier ones.

use alloy_primitives::{Address, U256};
use morpho_rs_sim::math::min;
use morpho_rs_sim::{
    apply_operation_with_quote, Amount, AssetsOrShares, MarketId, Operation, OperationError,
    OperationKind, Outcome, RoundingDirection, SimError, SimulationState, Spender,
};
use tracing::debug;

use crate::allowance::{adapter_grant, input_transfer};
use crate::error::BundlerError;
use crate::options::BundlerOptions;
use crate::reallocation::{reallocations, required_assets, Outflow};

/// Balance credited to the adapter when measuring what an operation consumes.
const PROBE_BALANCE: U256 = U256::from_limbs([u64::MAX, u64::MAX, 0, 0]);

struct Builder<'a> {
    start: &'a SimulationState,
    options: &'a BundlerOptions,
    user: Address,
    adapter: Address,
    state: SimulationState,
    operations: Vec<Operation>,
    index: usize,
    input: Operation,
    /// State and log length before the current input
    checkpoint: (SimulationState, usize),
}

impl Builder<'_> {
    fn fail(&self, source: OperationError) -> BundlerError {
        let (state, logged) = &self.checkpoint;
        BundlerError::Input {
            index: self.index,
            source,
            state: Box::new(state.clone()),
            operations: self.operations[..*logged].to_vec(),
        }
    }

    fn error(&self, source: SimError) -> BundlerError {
        self.fail(OperationError::new(&self.input, source))
    }

    fn push(&mut self, operation: Operation) -> Result<Outcome, BundlerError> {
        let (next, outcome) = apply_operation_with_quote(&self.state, &operation, self.start)
            .map_err(|source| self.fail(source))?;
        debug!(input = self.index, %operation, "populated operation");
        self.state = next;
        self.operations.push(operation);
        Ok(outcome)
    }

    fn push_all(&mut self, operations: Vec<Operation>) -> Result<(), BundlerError> {
        for operation in operations {
            self.push(operation)?;
        }
        Ok(())
    }

    /// `kind` executed by the adapter.
    fn as_adapter(&self, kind: OperationKind) -> Operation {
        Operation::new(self.adapter, kind)
    }

    /// Amount of `token` the adapter spends running `operation`.
    fn probe_consumption(&self, token: Address, operation: &Operation) -> Result<U256, BundlerError> {
        let mut probe = self.state.clone();
        let mut holding = probe.holding_or_empty(self.adapter, token);
        holding.balance = holding.balance.saturating_add(PROBE_BALANCE);
        let funded = holding.balance;
        probe.set_holding(holding);

        let (after, _) = apply_operation_with_quote(&probe, operation, self.start)
            .map_err(|source| self.fail(source))?;
        Ok(funded.saturating_sub(after.balance_of(self.adapter, token)))
    }

    /// Shares of `vault` the adapter burns from the user running `operation`.
    fn probe_shares(&self, vault: Address, operation: &Operation) -> Result<U256, BundlerError> {
        let mut probe = self.state.clone();
        let holding = probe
            .holding_or_empty(self.user, vault)
            .with_allowance(Spender::GeneralAdapter1, U256::MAX);
        let owned = holding.balance;
        probe.set_holding(holding);

        let (after, _) = apply_operation_with_quote(&probe, operation, self.start)
            .map_err(|source| self.fail(source))?;
        Ok(owned.saturating_sub(after.balance_of(self.user, vault)))
    }

    /// Brings the adapter's balance of `token` up to `needed`, from the user's
    /// balance first, then by wrapping the underlying.
    fn pull(&mut self, token: Address, needed: U256) -> Result<(), BundlerError> {
        let held = self.state.balance_of(self.adapter, token);
        let mut missing = needed.saturating_sub(held);
        if missing.is_zero() {
            return Ok(());
        }

        let direct = min(missing, self.state.balance_of(self.user, token));
        if !direct.is_zero() {
            let transfer = input_transfer(
                &self.state,
                self.options,
                self.user,
                token,
                direct,
                self.adapter,
            );
            self.push_all(transfer)?;
            missing -= direct;
        }
        if missing.is_zero() {
            return Ok(());
        }

        let Some(metadata) = self.state.token(token).ok().cloned() else {
            return Ok(());
        };
        let Some(wrapper) = metadata.wrapper.clone() else {
            return Ok(());
        };
        let underlying = metadata
            .to_unwrapped(missing, RoundingDirection::Up)
            .ok_or_else(|| self.error(SimError::NotWrapper { token }))?;

        debug!(%token, %missing, %underlying, "wrapping shortfall");
        self.pull(wrapper.underlying, underlying)?;
        let wrap = self.as_adapter(OperationKind::Erc20Wrap {
            token,
            owner: self.adapter,
            amount: Amount::Exact(underlying),
        });
        self.push(wrap)?;
        Ok(())
    }

    /// Pulls what `operation` consumes of `token`, or the user's whole balance
    /// when `all` spends the payer's balance.
    fn fund(&mut self, token: Address, operation: &Operation, all: bool) -> Result<(), BundlerError> {
        let needed = if all {
            self.state
                .balance_of(self.user, token)
                .saturating_add(self.state.balance_of(self.adapter, token))
        } else {
            self.probe_consumption(token, operation)?
        };
        self.pull(token, needed)
    }

    fn ensure_authorized(&mut self) -> Result<(), BundlerError> {
        if self.state.user_or_new(self.user).is_authorized(self.adapter) {
            return Ok(());
        }
        let authorize = Operation::new(
            self.user,
            OperationKind::BlueSetAuthorization {
                owner: self.user,
                authorized: self.adapter,
                is_authorized: true,
                signed: self.options.supports_signature,
            },
        );
        self.push(authorize).map(|_| ())
    }

    /// Keeps `token` in the adapter when it is to be unwrapped for the user.
    fn receiver(&self, receiver: Address, token: Address) -> Address {
        if receiver == self.user && self.options.unwrap_tokens.contains(&token) {
            self.adapter
        } else {
            receiver
        }
    }

    fn reallocate(
        &mut self,
        outflow: Outflow,
        id: MarketId,
        amount: AssetsOrShares,
        on_behalf: Address,
    ) -> Result<(), BundlerError> {
        let required = required_assets(&self.state, outflow, id, amount, on_behalf)
            .map_err(|source| self.error(source))?;
        let steps = reallocations(&self.state, self.options, self.user, id, outflow, required)
            .map_err(|source| self.error(source))?;
        self.push_all(steps)
    }

    fn populate(&mut self) -> Result<(), BundlerError> {
        let kind = self.input.kind.clone();
        match kind {
            OperationKind::BlueAccrueInterest { .. }
            | OperationKind::MetaMorphoAccrueInterest { .. }
            | OperationKind::VaultV2AccrueInterest { .. } => {
                let operation = self.input.clone();
                self.push(operation)?;
            }
            OperationKind::BlueSupply { id, amount, .. } | OperationKind::BlueRepay { id, amount, .. } => {
                let token = self.state.market(id).map_err(|e| self.error(e))?.params.loan_token;
                let operation = self.as_adapter(kind.clone());
                let all = matches!(kind, OperationKind::BlueSupply { .. }) && amount.amount().is_all();
                self.fund(token, &operation, all)?;
                self.push(operation)?;
            }
            OperationKind::BlueSupplyCollateral { id, assets, .. } => {
                let token = self
                    .state
                    .market(id)
                    .map_err(|e| self.error(e))?
                    .params
                    .collateral_token;
                let operation = self.as_adapter(kind);
                self.fund(token, &operation, assets.is_all())?;
                self.push(operation)?;
            }
            OperationKind::MetaMorphoDeposit { vault, amount, .. } => {
                let token = self.state.vault(vault).map_err(|e| self.error(e))?.asset;
                let operation = self.as_adapter(kind);
                self.fund(token, &operation, amount.amount().is_all())?;
                self.push(operation)?;
            }
            OperationKind::VaultV2Deposit { vault, amount, .. } => {
                let token = self.state.vault_v2(vault).map_err(|e| self.error(e))?.asset;
                let operation = self.as_adapter(kind);
                self.fund(token, &operation, amount.amount().is_all())?;
                self.push(operation)?;
            }
            OperationKind::BlueBorrow {
                id,
                amount,
                on_behalf,
                receiver,
                slippage,
            } => {
                let token = self.state.market(id).map_err(|e| self.error(e))?.params.loan_token;
                if on_behalf == self.user {
                    self.ensure_authorized()?;
                }
                self.reallocate(Outflow::Borrow, id, amount, on_behalf)?;
                let receiver = self.receiver(receiver, token);
                let operation = self.as_adapter(OperationKind::BlueBorrow {
                    id,
                    amount,
                    on_behalf,
                    receiver,
                    slippage,
                });
                self.push(operation)?;
            }
            OperationKind::BlueWithdraw {
                id,
                amount,
                on_behalf,
                receiver,
                slippage,
            } => {
                let token = self.state.market(id).map_err(|e| self.error(e))?.params.loan_token;
                if on_behalf == self.user {
                    self.ensure_authorized()?;
                }
                self.reallocate(Outflow::Withdraw, id, amount, on_behalf)?;
                let receiver = self.receiver(receiver, token);
                let operation = self.as_adapter(OperationKind::BlueWithdraw {
                    id,
                    amount,
                    on_behalf,
                    receiver,
                    slippage,
                });
                self.push(operation)?;
            }
            OperationKind::BlueWithdrawCollateral {
                id,
                assets,
                on_behalf,
                receiver,
            } => {
                let token = self
                    .state
                    .market(id)
                    .map_err(|e| self.error(e))?
                    .params
                    .collateral_token;
                if on_behalf == self.user {
                    self.ensure_authorized()?;
                }
                let receiver = self.receiver(receiver, token);
                let operation = self.as_adapter(OperationKind::BlueWithdrawCollateral {
                    id,
                    assets,
                    on_behalf,
                    receiver,
                });
                self.push(operation)?;
            }
            OperationKind::MetaMorphoWithdraw {
                vault,
                amount,
                receiver,
                owner,
                slippage,
            } => {
                let token = self.state.vault(vault).map_err(|e| self.error(e))?.asset;
                let operation = self.as_adapter(OperationKind::MetaMorphoWithdraw {
                    vault,
                    amount,
                    receiver: self.receiver(receiver, token),
                    owner,
                    slippage,
                });
                self.withdraw_shares(vault, owner, operation)?;
            }
            OperationKind::VaultV2Withdraw {
                vault,
                amount,
                receiver,
                owner,
                slippage,
            } => {
                let token = self.state.vault_v2(vault).map_err(|e| self.error(e))?.asset;
                let operation = self.as_adapter(OperationKind::VaultV2Withdraw {
                    vault,
                    amount,
                    receiver: self.receiver(receiver, token),
                    owner,
                    slippage,
                });
                self.withdraw_shares(vault, owner, operation)?;
            }
            OperationKind::Erc20Transfer {
                token,
                from,
                to,
                amount,
            } => {
                if from == self.user {
                    let amount = amount.resolve(|| self.state.balance_of(self.user, token));
                    let transfer =
                        input_transfer(&self.state, self.options, self.user, token, amount, to);
                    self.push_all(transfer)?;
                } else if from == self.adapter {
                    let operation = self.as_adapter(kind);
                    self.push(operation)?;
                } else {
                    return Err(BundlerError::UnsupportedInput {
                        index: self.index,
                        operation: self.input.name(),
                    });
                }
            }
            OperationKind::Erc20Wrap { token, owner, amount } => {
                let underlying = self
                    .state
                    .token(token)
                    .map_err(|e| self.error(e))?
                    .wrapper
                    .as_ref()
                    .map(|wrapper| wrapper.underlying)
                    .ok_or_else(|| self.error(SimError::NotWrapper { token }))?;
                let amount = amount.resolve(|| self.state.balance_of(self.user, underlying));
                self.pull(underlying, amount)?;
                let operation = self.as_adapter(OperationKind::Erc20Wrap {
                    token,
                    owner,
                    amount: Amount::Exact(amount),
                });
                self.push(operation)?;
            }
            OperationKind::Erc20Unwrap {
                token,
                receiver,
                amount,
            } => {
                let amount = amount.resolve(|| self.state.balance_of(self.user, token));
                self.pull(token, amount)?;
                let operation = self.as_adapter(OperationKind::Erc20Unwrap {
                    token,
                    receiver,
                    amount: Amount::Exact(amount),
                });
                self.push(operation)?;
            }
            OperationKind::BlueSetAuthorization { .. }
            | OperationKind::MetaMorphoPublicReallocate { .. }
            | OperationKind::Erc20Transfer2 { .. }
            | OperationKind::Erc20Approve { .. }
            | OperationKind::Erc20Permit { .. }
            | OperationKind::Erc20Permit2 { .. } => {
                return Err(BundlerError::UnsupportedInput {
                    index: self.index,
                    operation: self.input.name(),
                });
            }
        }
        Ok(())
    }

    /// Grants the adapter the user's shares burnt by `operation`, then runs it.
    fn withdraw_shares(
        &mut self,
        vault: Address,
        owner: Address,
        operation: Operation,
    ) -> Result<(), BundlerError> {
        if owner == self.user {
            let shares = self.probe_shares(vault, &operation)?;
            let grant = adapter_grant(&self.state, self.options, self.user, vault, shares);
            self.push_all(grant)?;
        }
        self.push(operation).map(|_| ())
    }
}

/// Rewrites `inputs`, all sent by one user, into adapter-level operations.
pub(crate) fn populate(
    inputs: &[Operation],
    start: &SimulationState,
    options: &BundlerOptions,
) -> Result<Vec<Operation>, BundlerError> {
    let Some(first) = inputs.first() else {
        return Ok(Vec::new());
    };
    let user = first.sender;
    if let Some(other) = inputs.iter().find(|input| input.sender != user) {
        return Err(BundlerError::MixedSenders {
            expected: user,
            found: other.sender,
        });
    }

    let mut builder = Builder {
        start,
        options,
        user,
        adapter: start.addresses.general_adapter1,
        state: start.clone(),
        operations: Vec::with_capacity(inputs.len() * 2),
        index: 0,
        input: first.clone(),
        checkpoint: (start.clone(), 0),
    };

    for (index, input) in inputs.iter().enumerate() {
        if let Some(hook) = &options.on_bundle_tx {
            builder.state = hook(&builder.state);
        }
        builder.index = index;
        builder.input = input.clone();
        builder.checkpoint = (builder.state.clone(), builder.operations.len());
        builder.populate()?;
    }

    Ok(builder.operations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{
        self, adapter, ether, market_id, usdc, OTHER, USDC, USER, VAULT, WETH,
    };
    use morpho_rs_sim::NATIVE_ADDRESS;

    fn names(operations: &[Operation]) -> Vec<&'static str> {
        operations.iter().map(Operation::name).collect()
    }

    fn supply(amount: U256) -> Operation {
        Operation::new(
            USER,
            OperationKind::BlueSupply {
                id: market_id(),
                amount: AssetsOrShares::assets(amount),
                on_behalf: USER,
                slippage: None,
            },
        )
    }

    #[test]
    fn test_supply_is_pulled_with_permit() {
        let state = test_fixtures::state();
        let operations = populate(&[supply(usdc(1_000))], &state, &BundlerOptions::new()).unwrap();

        assert_eq!(
            names(&operations),
            ["Erc20_Permit", "Erc20_Transfer", "Blue_Supply"]
        );
        assert!(operations[1..].iter().all(|operation| operation.sender == adapter()));
    }

    #[test]
    fn test_second_permit_sees_next_nonce() {
        let state = test_fixtures::state();
        let operations = populate(
            &[supply(usdc(1_000)), supply(usdc(500))],
            &state,
            &BundlerOptions::new(),
        )
        .unwrap();

        let nonces: Vec<U256> = operations
            .iter()
            .filter_map(|operation| match operation.kind {
                OperationKind::Erc20Permit { nonce, .. } => Some(nonce),
                _ => None,
            })
            .collect();
        assert_eq!(nonces, [U256::from(3), U256::from(4)]);
    }

    #[test]
    fn test_borrow_authorizes_adapter_once() {
        let state = test_fixtures::borrower_state();
        let borrow = |amount| {
            Operation::new(
                USER,
                OperationKind::BlueBorrow {
                    id: market_id(),
                    amount: AssetsOrShares::assets(usdc(amount)),
                    on_behalf: USER,
                    receiver: USER,
                    slippage: None,
                },
            )
        };
        let operations =
            populate(&[borrow(100), borrow(200)], &state, &BundlerOptions::new()).unwrap();

        assert_eq!(
            names(&operations),
            ["Blue_SetAuthorization", "Blue_Borrow", "Blue_Borrow"]
        );
        let OperationKind::BlueSetAuthorization { signed, .. } = operations[0].kind else {
            panic!("expected an authorization");
        };
        assert!(signed);
    }

    #[test]
    fn test_wrap_shortfall_from_native() {
        let state = test_fixtures::vault_state()
            .with_holding(morpho_rs_sim::Holding::new(USER, WETH, ether(1)));
        let collateral = Operation::new(
            USER,
            OperationKind::BlueSupplyCollateral {
                id: market_id(),
                assets: Amount::exact(ether(1) + U256::from(500_000_000_000_000_000u64)),
                on_behalf: USER,
            },
        );
        let operations = populate(&[collateral], &state, &BundlerOptions::new()).unwrap();

        assert_eq!(
            names(&operations),
            [
                "Erc20_Approve",
                "Erc20_Permit2",
                "Erc20_Transfer2",
                "Erc20_Transfer",
                "Erc20_Wrap",
                "Blue_SupplyCollateral"
            ]
        );
        let OperationKind::Erc20Transfer { token, amount, .. } = operations[3].kind else {
            panic!("expected a native transfer");
        };
        assert_eq!(token, NATIVE_ADDRESS);
        assert_eq!(amount, Amount::exact(U256::from(500_000_000_000_000_000u64)));
    }

    #[test]
    fn test_unwrap_tokens_stay_in_adapter() {
        let state = test_fixtures::state()
            .with_position(morpho_rs_sim::Position::new(USER, market_id(), U256::ZERO, U256::ZERO, ether(2)));
        let withdraw = Operation::new(
            USER,
            OperationKind::BlueWithdrawCollateral {
                id: market_id(),
                assets: Amount::exact(ether(1)),
                on_behalf: USER,
                receiver: USER,
            },
        );
        let options = BundlerOptions::new().with_unwrap_token(WETH);
        let operations = populate(&[withdraw], &state, &options).unwrap();

        let OperationKind::BlueWithdrawCollateral { receiver, .. } = operations[1].kind else {
            panic!("expected a collateral withdrawal");
        };
        assert_eq!(receiver, adapter());
    }

    #[test]
    fn test_vault_withdraw_grants_shares() {
        let state = test_fixtures::vault_state();
        let withdraw = Operation::new(
            USER,
            OperationKind::MetaMorphoWithdraw {
                vault: VAULT,
                amount: AssetsOrShares::Shares(Amount::All),
                receiver: USER,
                owner: USER,
                slippage: None,
            },
        );
        let operations = populate(&[withdraw], &state, &BundlerOptions::new()).unwrap();

        assert_eq!(names(&operations), ["Erc20_Permit", "MetaMorpho_Withdraw"]);
        let OperationKind::Erc20Permit { token, amount, .. } = operations[0].kind else {
            panic!("expected a permit");
        };
        assert_eq!(token, VAULT);
        assert_eq!(amount, ether(100));
    }

    #[test]
    fn test_rejections() {
        let state = test_fixtures::state();
        let approve = Operation::new(
            USER,
            OperationKind::Erc20Approve {
                token: USDC,
                spender: adapter(),
                amount: U256::MAX,
            },
        );
        assert!(matches!(
            populate(&[approve], &state, &BundlerOptions::new()),
            Err(BundlerError::UnsupportedInput { index: 0, .. })
        ));

        let other = Operation::new(
            OTHER,
            OperationKind::BlueAccrueInterest { id: market_id() },
        );
        assert!(matches!(
            populate(&[supply(usdc(1)), other], &state, &BundlerOptions::new()),
            Err(BundlerError::MixedSenders { .. })
        ));
        assert!(populate(&[], &state, &BundlerOptions::new()).unwrap().is_empty());
    }

    #[test]
    fn test_hook_replaces_running_state() {
        let state = test_fixtures::state();
        let options = BundlerOptions::new().with_on_bundle_tx(|state: &SimulationState| {
            state.clone().with_holding(morpho_rs_sim::Holding::new(USER, USDC, U256::ZERO))
        });
        let error = populate(&[supply(usdc(1))], &state, &options).unwrap_err();
        assert!(matches!(error, BundlerError::Input { index: 0, .. }));
    }

    #[test]
    fn test_failed_input_keeps_earlier_expansion() {
        let state = test_fixtures::state();
        let error = populate(
            &[supply(usdc(1_000)), supply(usdc(20_000))],
            &state,
            &BundlerOptions::new(),
        )
        .unwrap_err();

        let BundlerError::Input {
            index,
            source,
            state: partial,
            operations,
        } = error
        else {
            panic!("expected an input error, got {error}");
        };
        assert_eq!(index, 1);
        assert!(matches!(source.source, SimError::InsufficientBalance { .. }));
        assert_eq!(
            names(&operations),
            ["Erc20_Permit", "Erc20_Transfer", "Blue_Supply"]
        );
        assert_eq!(partial.balance_of(USER, USDC), usdc(9_000));
        assert_eq!(partial.balance_of(adapter(), USDC), U256::ZERO);
    }
}
