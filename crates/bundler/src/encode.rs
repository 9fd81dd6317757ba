//! Encodes traced operations as Bundler3 actions and requirements.

use alloy_primitives::{Address, U256};
use morpho_rs_sim::math::{mul_div_down, mul_div_up, WAD};
use morpho_rs_sim::{
    AppliedOperation, AssetsOrShares, MarketId, MarketParams, OperationKind, Outcome,
    SimulationState, NATIVE_ADDRESS,
};

use crate::action::{BundlerAction, ReallocationStep};
use crate::allowance::permit_domain;
use crate::bundle::ActionBundle;
use crate::error::BundlerError;
use crate::finalize::Trace;
use crate::options::BundlerOptions;
use crate::requirements::{
    AuthorizationMessage, PermitMessage, PermitSingleMessage, Requirements,
    SignatureRequirement, SigningDomain, TransactionRequirement, TypedMessage,
};

/// WAD to E27 share price scale
const E9: U256 = U256::from_limbs([1_000_000_000, 0, 0, 0]);

/// Highest share price accepted when paying `assets` for `shares`.
pub(crate) fn max_share_price_e27(outcome: &Outcome, slippage: U256) -> U256 {
    match (outcome.assets, outcome.shares) {
        (Some(assets), Some(shares)) if !shares.is_zero() => {
            mul_div_up(assets, WAD.saturating_add(slippage) * E9, shares)
        }
        _ => U256::MAX,
    }
}

/// Lowest share price accepted when receiving `assets` for `shares`.
pub(crate) fn min_share_price_e27(outcome: &Outcome, slippage: U256) -> U256 {
    match (outcome.assets, outcome.shares) {
        (Some(assets), Some(shares)) if !shares.is_zero() => {
            mul_div_down(assets, WAD.saturating_sub(slippage) * E9, shares)
        }
        _ => U256::ZERO,
    }
}

struct Encoder<'a> {
    options: &'a BundlerOptions,
    user: Address,
    adapter: Address,
    actions: Vec<BundlerAction>,
    requirements: Requirements,
}

impl Encoder<'_> {
    fn market(state: &SimulationState, id: MarketId) -> Result<MarketParams, BundlerError> {
        Ok(state.market(id)?.params)
    }

    fn sign(&mut self, action: BundlerAction, domain: SigningDomain, message: TypedMessage) {
        self.requirements.signatures.push(SignatureRequirement {
            action: self.actions.len(),
            domain,
            message,
        });
        self.actions.push(action);
    }

    fn encode(
        &mut self,
        pre: &SimulationState,
        step: &AppliedOperation,
        next: Option<&AppliedOperation>,
    ) -> Result<(), BundlerError> {
        let AppliedOperation {
            index,
            operation,
            outcome,
        } = step;
        let index = *index;
        let sender = operation.sender;
        let unencodable = || BundlerError::Unencodable {
            index,
            operation: operation.name(),
        };
        let slippage = self.options.slippage;
        let chain_id = pre.chain_id;
        let deadline = self.options.deadline(pre);

        if matches!(
            operation.kind,
            OperationKind::BlueAccrueInterest { .. }
                | OperationKind::MetaMorphoAccrueInterest { .. }
                | OperationKind::VaultV2AccrueInterest { .. }
        ) {
            return Ok(());
        }

        if sender == self.user {
            match &operation.kind {
                OperationKind::Erc20Transfer {
                    token, from, to, ..
                } if *token == NATIVE_ADDRESS && *from == self.user => {
                    let funds_reallocation = *to == self.adapter
                        && next.is_some_and(|next| {
                            next.operation.sender == self.adapter
                                && matches!(
                                    next.operation.kind,
                                    OperationKind::MetaMorphoPublicReallocate { .. }
                                )
                        });
                    if !funds_reallocation {
                        self.actions.push(BundlerAction::SendNative {
                            receiver: *to,
                            amount: outcome.assets.unwrap_or_default(),
                        });
                    }
                }
                OperationKind::Erc20Approve {
                    token,
                    spender,
                    amount,
                } => self
                    .requirements
                    .txs
                    .push(TransactionRequirement::erc20_approve(*token, *spender, *amount)),
                OperationKind::Erc20Permit {
                    token,
                    spender,
                    amount,
                    nonce,
                } => {
                    let (name, version) = permit_domain(pre, *token).ok_or_else(unencodable)?;
                    let message = PermitMessage {
                        owner: sender,
                        spender: *spender,
                        value: *amount,
                        nonce: *nonce,
                        deadline,
                    };
                    self.sign(
                        BundlerAction::Permit {
                            token: *token,
                            message: message.clone(),
                            signature: None,
                        },
                        SigningDomain::Erc2612 {
                            name,
                            version,
                            chain_id,
                            verifying_contract: *token,
                        },
                        TypedMessage::Permit(message),
                    );
                }
                OperationKind::Erc20Permit2 {
                    token,
                    amount,
                    expiration,
                    nonce,
                } => {
                    let permit2 = pre.addresses.permit2.ok_or(BundlerError::MissingContract {
                        contract: "Permit2",
                    })?;
                    let message = PermitSingleMessage {
                        owner: sender,
                        token: *token,
                        amount: *amount,
                        expiration: *expiration,
                        nonce: *nonce,
                        spender: self.adapter,
                        sig_deadline: deadline,
                    };
                    self.sign(
                        BundlerAction::ApprovePermit2 {
                            message: message.clone(),
                            signature: None,
                        },
                        SigningDomain::Permit2 {
                            chain_id,
                            verifying_contract: permit2,
                        },
                        TypedMessage::PermitSingle(message),
                    );
                }
                OperationKind::BlueSetAuthorization {
                    owner,
                    authorized,
                    is_authorized,
                    signed,
                } if *owner == self.user => {
                    let morpho = pre.addresses.morpho;
                    if *signed {
                        let message = AuthorizationMessage {
                            authorizer: *owner,
                            authorized: *authorized,
                            is_authorized: *is_authorized,
                            nonce: pre.user_or_new(*owner).morpho_nonce,
                            deadline,
                        };
                        self.sign(
                            BundlerAction::MorphoSetAuthorizationWithSig {
                                message: message.clone(),
                                signature: None,
                            },
                            SigningDomain::Morpho {
                                chain_id,
                                verifying_contract: morpho,
                            },
                            TypedMessage::Authorization(message),
                        );
                    } else {
                        self.requirements.txs.push(
                            TransactionRequirement::morpho_set_authorization(
                                morpho,
                                *authorized,
                                *is_authorized,
                            ),
                        );
                    }
                }
                _ => return Err(unencodable()),
            }
            return Ok(());
        }

        if sender != self.adapter {
            return Err(unencodable());
        }

        let action = match &operation.kind {
            OperationKind::Erc20Transfer {
                token,
                from,
                to,
                amount,
            } => {
                if *from == self.adapter && *token == NATIVE_ADDRESS {
                    BundlerAction::NativeTransfer {
                        receiver: *to,
                        amount: *amount,
                    }
                } else if *from == self.adapter {
                    BundlerAction::Erc20Transfer {
                        token: *token,
                        receiver: *to,
                        amount: *amount,
                    }
                } else if *from == self.user {
                    BundlerAction::Erc20TransferFrom {
                        token: *token,
                        receiver: *to,
                        amount: *amount,
                    }
                } else {
                    return Err(unencodable());
                }
            }
            OperationKind::Erc20Transfer2 {
                token,
                from,
                to,
                amount,
            } if *from == self.user => BundlerAction::Permit2TransferFrom {
                token: *token,
                receiver: *to,
                amount: *amount,
            },
            OperationKind::Erc20Wrap {
                token,
                owner,
                amount,
            } => {
                if pre.token(*token)?.wraps_native() {
                    BundlerAction::WrapNative {
                        amount: *amount,
                        receiver: *owner,
                    }
                } else {
                    BundlerAction::Erc20WrapperDepositFor {
                        wrapper: *token,
                        receiver: *owner,
                        amount: *amount,
                    }
                }
            }
            OperationKind::Erc20Unwrap {
                token,
                receiver,
                amount,
            } => {
                if pre.token(*token)?.wraps_native() {
                    BundlerAction::UnwrapNative {
                        amount: *amount,
                        receiver: *receiver,
                    }
                } else {
                    BundlerAction::Erc20WrapperWithdrawTo {
                        wrapper: *token,
                        receiver: *receiver,
                        amount: *amount,
                    }
                }
            }
            OperationKind::BlueSupply {
                id,
                amount,
                on_behalf,
                ..
            } => BundlerAction::MorphoSupply {
                market: Self::market(pre, *id)?,
                amount: *amount,
                max_share_price_e27: max_share_price_e27(outcome, slippage),
                on_behalf: *on_behalf,
            },
            OperationKind::BlueRepay {
                id,
                amount,
                on_behalf,
                ..
            } => BundlerAction::MorphoRepay {
                market: Self::market(pre, *id)?,
                amount: *amount,
                max_share_price_e27: max_share_price_e27(outcome, slippage),
                on_behalf: *on_behalf,
            },
            OperationKind::BlueSupplyCollateral {
                id,
                assets,
                on_behalf,
            } => BundlerAction::MorphoSupplyCollateral {
                market: Self::market(pre, *id)?,
                assets: *assets,
                on_behalf: *on_behalf,
            },
            OperationKind::BlueBorrow {
                id,
                amount,
                on_behalf,
                receiver,
                ..
            } if *on_behalf == self.user => BundlerAction::MorphoBorrow {
                market: Self::market(pre, *id)?,
                amount: *amount,
                min_share_price_e27: min_share_price_e27(outcome, slippage),
                receiver: *receiver,
            },
            OperationKind::BlueWithdraw {
                id,
                amount,
                on_behalf,
                receiver,
                ..
            } if *on_behalf == self.user => BundlerAction::MorphoWithdraw {
                market: Self::market(pre, *id)?,
                amount: *amount,
                min_share_price_e27: min_share_price_e27(outcome, slippage),
                receiver: *receiver,
            },
            OperationKind::BlueWithdrawCollateral {
                id,
                assets,
                on_behalf,
                receiver,
            } if *on_behalf == self.user => BundlerAction::MorphoWithdrawCollateral {
                market: Self::market(pre, *id)?,
                assets: *assets,
                receiver: *receiver,
            },
            OperationKind::MetaMorphoDeposit {
                vault,
                amount,
                receiver,
                ..
            }
            | OperationKind::VaultV2Deposit {
                vault,
                amount,
                receiver,
                ..
            } => {
                let max_share_price_e27 = max_share_price_e27(outcome, slippage);
                match *amount {
                    AssetsOrShares::Assets(assets) => BundlerAction::Erc4626Deposit {
                        vault: *vault,
                        assets,
                        max_share_price_e27,
                        receiver: *receiver,
                    },
                    AssetsOrShares::Shares(shares) => BundlerAction::Erc4626Mint {
                        vault: *vault,
                        shares,
                        max_share_price_e27,
                        receiver: *receiver,
                    },
                }
            }
            OperationKind::MetaMorphoWithdraw {
                vault,
                amount,
                receiver,
                owner,
                ..
            }
            | OperationKind::VaultV2Withdraw {
                vault,
                amount,
                receiver,
                owner,
                ..
            } => {
                let min_share_price_e27 = min_share_price_e27(outcome, slippage);
                match *amount {
                    AssetsOrShares::Assets(assets) => BundlerAction::Erc4626Withdraw {
                        vault: *vault,
                        assets,
                        min_share_price_e27,
                        receiver: *receiver,
                        owner: *owner,
                    },
                    AssetsOrShares::Shares(shares) => BundlerAction::Erc4626Redeem {
                        vault: *vault,
                        shares,
                        min_share_price_e27,
                        receiver: *receiver,
                        owner: *owner,
                    },
                }
            }
            OperationKind::MetaMorphoPublicReallocate {
                vault,
                withdrawals,
                supply_market,
            } => BundlerAction::ReallocateTo {
                vault: *vault,
                fee: pre.vault(*vault)?.public_allocator_fee()?,
                withdrawals: withdrawals
                    .iter()
                    .map(|withdrawal| {
                        Ok(ReallocationStep {
                            market: Self::market(pre, withdrawal.id)?,
                            amount: withdrawal.assets,
                        })
                    })
                    .collect::<Result<_, BundlerError>>()?,
                supply_market: Self::market(pre, *supply_market)?,
            },
            _ => return Err(unencodable()),
        };
        self.actions.push(action);
        Ok(())
    }
}

/// Encodes the finalized `trace` of `user`'s bundle.
pub(crate) fn encode(
    trace: &Trace,
    options: &BundlerOptions,
    user: Address,
) -> Result<ActionBundle, BundlerError> {
    let state = &trace.final_state;
    let mut encoder = Encoder {
        options,
        user,
        adapter: state.addresses.general_adapter1,
        actions: Vec::new(),
        requirements: Requirements::default(),
    };

    for (position, (pre, step)) in trace.pre_states.iter().zip(&trace.steps).enumerate() {
        encoder.encode(pre, step, trace.steps.get(position + 1))?;
    }

    let value = encoder
        .actions
        .iter()
        .fold(U256::ZERO, |total, action| total.saturating_add(action.value()));
    Ok(ActionBundle {
        chain_id: state.chain_id,
        addresses: state.addresses.clone(),
        actions: encoder.actions,
        requirements: encoder.requirements,
        value,
    })
}
