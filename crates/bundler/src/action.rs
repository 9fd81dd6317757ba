//! Bundler3 actions.
//!
//! Each action is one call of the multicall. Most target GeneralAdapter1; permits
//! and signed authorizations call the token, Permit2 or Morpho directly and may
//! revert without failing the bundle, since anyone can front-run them.

use alloy::sol_types::SolCall;
use alloy_primitives::{Address, Bytes, Signature, B256, U256};
use morpho_rs_contracts::bundler3::Call;
use morpho_rs_contracts::erc20::IERC20Permit;
use morpho_rs_contracts::morpho::{self, IGeneralAdapter1, IMorpho, IPublicAllocator, Withdrawal};
use morpho_rs_contracts::permit2::IAllowanceTransfer;
use morpho_rs_contracts::{eip712, ContractError, PreparedCall, RawCall};
use morpho_rs_sim::{Amount, AssetsOrShares, ChainAddresses, MarketParams};
use serde::{Deserialize, Serialize};

use crate::error::BundlerError;
use crate::requirements::{AuthorizationMessage, PermitMessage, PermitSingleMessage};

/// One withdrawal of a [`BundlerAction::ReallocateTo`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReallocationStep {
    pub market: MarketParams,
    pub amount: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "args", rename_all = "camelCase")]
pub enum BundlerAction {
    /// Pulls from the initiator with a plain allowance.
    Erc20TransferFrom {
        token: Address,
        receiver: Address,
        amount: Amount,
    },
    /// Pulls from the initiator through Permit2.
    Permit2TransferFrom {
        token: Address,
        receiver: Address,
        amount: Amount,
    },
    /// Sends tokens held by the adapter.
    Erc20Transfer {
        token: Address,
        receiver: Address,
        amount: Amount,
    },
    NativeTransfer {
        receiver: Address,
        amount: Amount,
    },
    /// Forwards part of the multicall value to `receiver` with empty calldata.
    SendNative {
        receiver: Address,
        amount: U256,
    },
    Permit {
        token: Address,
        message: PermitMessage,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<Signature>,
    },
    ApprovePermit2 {
        message: PermitSingleMessage,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<Signature>,
    },
    MorphoSetAuthorizationWithSig {
        message: AuthorizationMessage,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<Signature>,
    },
    WrapNative {
        amount: Amount,
        receiver: Address,
    },
    UnwrapNative {
        amount: Amount,
        receiver: Address,
    },
    Erc20WrapperDepositFor {
        wrapper: Address,
        receiver: Address,
        amount: Amount,
    },
    Erc20WrapperWithdrawTo {
        wrapper: Address,
        receiver: Address,
        amount: Amount,
    },
    MorphoSupply {
        market: MarketParams,
        amount: AssetsOrShares,
        max_share_price_e27: U256,
        on_behalf: Address,
    },
    MorphoSupplyCollateral {
        market: MarketParams,
        assets: Amount,
        on_behalf: Address,
    },
    MorphoBorrow {
        market: MarketParams,
        amount: AssetsOrShares,
        min_share_price_e27: U256,
        receiver: Address,
    },
    MorphoRepay {
        market: MarketParams,
        amount: AssetsOrShares,
        max_share_price_e27: U256,
        on_behalf: Address,
    },
    MorphoWithdraw {
        market: MarketParams,
        amount: AssetsOrShares,
        min_share_price_e27: U256,
        receiver: Address,
    },
    MorphoWithdrawCollateral {
        market: MarketParams,
        assets: Amount,
        receiver: Address,
    },
    Erc4626Deposit {
        vault: Address,
        assets: Amount,
        max_share_price_e27: U256,
        receiver: Address,
    },
    Erc4626Mint {
        vault: Address,
        shares: Amount,
        max_share_price_e27: U256,
        receiver: Address,
    },
    Erc4626Withdraw {
        vault: Address,
        assets: Amount,
        min_share_price_e27: U256,
        receiver: Address,
        owner: Address,
    },
    Erc4626Redeem {
        vault: Address,
        shares: Amount,
        min_share_price_e27: U256,
        receiver: Address,
        owner: Address,
    },
    ReallocateTo {
        vault: Address,
        fee: U256,
        withdrawals: Vec<ReallocationStep>,
        supply_market: MarketParams,
    },
}

fn sol_market(params: &MarketParams) -> morpho::MarketParams {
    morpho::MarketParams {
        loanToken: params.loan_token,
        collateralToken: params.collateral_token,
        oracle: params.oracle,
        irm: params.irm,
        lltv: params.lltv,
    }
}

/// `(assets, shares)` arguments of a Morpho call.
fn split(amount: AssetsOrShares) -> (U256, U256) {
    match amount {
        AssetsOrShares::Assets(assets) => (assets.to_abi(), U256::ZERO),
        AssetsOrShares::Shares(shares) => (U256::ZERO, shares.to_abi()),
    }
}

fn raw<C: SolCall>(to: Address, call: C) -> RawCall {
    PreparedCall::new(to, call, U256::ZERO).into_raw()
}

impl BundlerAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Erc20TransferFrom { .. } => "erc20TransferFrom",
            Self::Permit2TransferFrom { .. } => "permit2TransferFrom",
            Self::Erc20Transfer { .. } => "erc20Transfer",
            Self::NativeTransfer { .. } => "nativeTransfer",
            Self::SendNative { .. } => "sendNative",
            Self::Permit { .. } => "permit",
            Self::ApprovePermit2 { .. } => "approvePermit2",
            Self::MorphoSetAuthorizationWithSig { .. } => "morphoSetAuthorizationWithSig",
            Self::WrapNative { .. } => "wrapNative",
            Self::UnwrapNative { .. } => "unwrapNative",
            Self::Erc20WrapperDepositFor { .. } => "erc20WrapperDepositFor",
            Self::Erc20WrapperWithdrawTo { .. } => "erc20WrapperWithdrawTo",
            Self::MorphoSupply { .. } => "morphoSupply",
            Self::MorphoSupplyCollateral { .. } => "morphoSupplyCollateral",
            Self::MorphoBorrow { .. } => "morphoBorrow",
            Self::MorphoRepay { .. } => "morphoRepay",
            Self::MorphoWithdraw { .. } => "morphoWithdraw",
            Self::MorphoWithdrawCollateral { .. } => "morphoWithdrawCollateral",
            Self::Erc4626Deposit { .. } => "erc4626Deposit",
            Self::Erc4626Mint { .. } => "erc4626Mint",
            Self::Erc4626Withdraw { .. } => "erc4626Withdraw",
            Self::Erc4626Redeem { .. } => "erc4626Redeem",
            Self::ReallocateTo { .. } => "reallocateTo",
        }
    }

    pub fn signature(&self) -> Option<&Signature> {
        match self {
            Self::Permit { signature, .. }
            | Self::ApprovePermit2 { signature, .. }
            | Self::MorphoSetAuthorizationWithSig { signature, .. } => signature.as_ref(),
            _ => None,
        }
    }

    pub fn requires_signature(&self) -> bool {
        matches!(
            self,
            Self::Permit { .. } | Self::ApprovePermit2 { .. } | Self::MorphoSetAuthorizationWithSig { .. }
        )
    }

    /// Embeds `signature`; returns whether the action takes one.
    pub fn set_signature(&mut self, new: Signature) -> bool {
        match self {
            Self::Permit { signature, .. }
            | Self::ApprovePermit2 { signature, .. }
            | Self::MorphoSetAuthorizationWithSig { signature, .. } => {
                *signature = Some(new);
                true
            }
            _ => false,
        }
    }

    /// Native value the call forwards.
    pub fn value(&self) -> U256 {
        match self {
            Self::ReallocateTo { fee, .. } => *fee,
            Self::SendNative { amount, .. } => *amount,
            _ => U256::ZERO,
        }
    }

    /// Encodes the action as call `index` of a Bundler3 multicall.
    pub fn to_call(&self, index: usize, addresses: &ChainAddresses) -> Result<Call, BundlerError> {
        let adapter = addresses.general_adapter1;
        let unsigned = || BundlerError::MissingSignature { action: index };

        let encoded = match self {
            Self::Erc20TransferFrom {
                token,
                receiver,
                amount,
            } => raw(
                adapter,
                IGeneralAdapter1::erc20TransferFromCall {
                    token: *token,
                    receiver: *receiver,
                    amount: amount.to_abi(),
                },
            ),
            Self::Permit2TransferFrom {
                token,
                receiver,
                amount,
            } => raw(
                adapter,
                IGeneralAdapter1::permit2TransferFromCall {
                    token: *token,
                    receiver: *receiver,
                    amount: amount.to_abi(),
                },
            ),
            Self::Erc20Transfer {
                token,
                receiver,
                amount,
            } => raw(
                adapter,
                IGeneralAdapter1::erc20TransferCall {
                    token: *token,
                    receiver: *receiver,
                    amount: amount.to_abi(),
                },
            ),
            Self::NativeTransfer { receiver, amount } => raw(
                adapter,
                IGeneralAdapter1::nativeTransferCall {
                    receiver: *receiver,
                    amount: amount.to_abi(),
                },
            ),
            Self::SendNative { receiver, .. } => RawCall {
                to: *receiver,
                data: Bytes::new(),
                value: U256::ZERO,
            },
            Self::Permit {
                token,
                message,
                signature,
            } => {
                let signature = signature.as_ref().ok_or_else(unsigned)?;
                raw(
                    *token,
                    IERC20Permit::permitCall {
                        owner: message.owner,
                        spender: message.spender,
                        value: message.value,
                        deadline: U256::from(message.deadline),
                        v: eip712::recovery_byte(signature),
                        r: eip712::word(signature.r()),
                        s: eip712::word(signature.s()),
                    },
                )
            }
            Self::ApprovePermit2 { message, signature } => {
                let signature = signature.as_ref().ok_or_else(unsigned)?;
                let permit2 = addresses.permit2.ok_or(BundlerError::MissingContract {
                    contract: "Permit2",
                })?;
                raw(
                    permit2,
                    IAllowanceTransfer::permitCall {
                        owner: message.owner,
                        permitSingle: message.to_sol()?,
                        signature: eip712::packed(signature),
                    },
                )
            }
            Self::MorphoSetAuthorizationWithSig { message, signature } => {
                let signature = signature.as_ref().ok_or_else(unsigned)?;
                raw(
                    addresses.morpho,
                    IMorpho::setAuthorizationWithSigCall {
                        authorization: message.to_sol(),
                        signature: morpho::Signature::from(signature),
                    },
                )
            }
            Self::WrapNative { amount, receiver } => raw(
                adapter,
                IGeneralAdapter1::wrapNativeCall {
                    amount: amount.to_abi(),
                    receiver: *receiver,
                },
            ),
            Self::UnwrapNative { amount, receiver } => raw(
                adapter,
                IGeneralAdapter1::unwrapNativeCall {
                    amount: amount.to_abi(),
                    receiver: *receiver,
                },
            ),
            Self::Erc20WrapperDepositFor {
                wrapper,
                receiver,
                amount,
            } => raw(
                adapter,
                IGeneralAdapter1::erc20WrapperDepositForCall {
                    wrapper: *wrapper,
                    receiver: *receiver,
                    amount: amount.to_abi(),
                },
            ),
            Self::Erc20WrapperWithdrawTo {
                wrapper,
                receiver,
                amount,
            } => raw(
                adapter,
                IGeneralAdapter1::erc20WrapperWithdrawToCall {
                    wrapper: *wrapper,
                    receiver: *receiver,
                    amount: amount.to_abi(),
                },
            ),
            Self::MorphoSupply {
                market,
                amount,
                max_share_price_e27,
                on_behalf,
            } => {
                let (assets, shares) = split(*amount);
                raw(
                    adapter,
                    IGeneralAdapter1::morphoSupplyCall {
                        marketParams: sol_market(market),
                        assets,
                        shares,
                        maxSharePriceE27: *max_share_price_e27,
                        onBehalf: *on_behalf,
                        data: Bytes::new(),
                    },
                )
            }
            Self::MorphoSupplyCollateral {
                market,
                assets,
                on_behalf,
            } => raw(
                adapter,
                IGeneralAdapter1::morphoSupplyCollateralCall {
                    marketParams: sol_market(market),
                    assets: assets.to_abi(),
                    onBehalf: *on_behalf,
                    data: Bytes::new(),
                },
            ),
            Self::MorphoBorrow {
                market,
                amount,
                min_share_price_e27,
                receiver,
            } => {
                let (assets, shares) = split(*amount);
                raw(
                    adapter,
                    IGeneralAdapter1::morphoBorrowCall {
                        marketParams: sol_market(market),
                        assets,
                        shares,
                        minSharePriceE27: *min_share_price_e27,
                        receiver: *receiver,
                    },
                )
            }
            Self::MorphoRepay {
                market,
                amount,
                max_share_price_e27,
                on_behalf,
            } => {
                let (assets, shares) = split(*amount);
                raw(
                    adapter,
                    IGeneralAdapter1::morphoRepayCall {
                        marketParams: sol_market(market),
                        assets,
                        shares,
                        maxSharePriceE27: *max_share_price_e27,
                        onBehalf: *on_behalf,
                        data: Bytes::new(),
                    },
                )
            }
            Self::MorphoWithdraw {
                market,
                amount,
                min_share_price_e27,
                receiver,
            } => {
                let (assets, shares) = split(*amount);
                raw(
                    adapter,
                    IGeneralAdapter1::morphoWithdrawCall {
                        marketParams: sol_market(market),
                        assets,
                        shares,
                        minSharePriceE27: *min_share_price_e27,
                        receiver: *receiver,
                    },
                )
            }
            Self::MorphoWithdrawCollateral {
                market,
                assets,
                receiver,
            } => raw(
                adapter,
                IGeneralAdapter1::morphoWithdrawCollateralCall {
                    marketParams: sol_market(market),
                    assets: assets.to_abi(),
                    receiver: *receiver,
                },
            ),
            Self::Erc4626Deposit {
                vault,
                assets,
                max_share_price_e27,
                receiver,
            } => raw(
                adapter,
                IGeneralAdapter1::erc4626DepositCall {
                    vault: *vault,
                    assets: assets.to_abi(),
                    maxSharePriceE27: *max_share_price_e27,
                    receiver: *receiver,
                },
            ),
            Self::Erc4626Mint {
                vault,
                shares,
                max_share_price_e27,
                receiver,
            } => raw(
                adapter,
                IGeneralAdapter1::erc4626MintCall {
                    vault: *vault,
                    shares: shares.to_abi(),
                    maxSharePriceE27: *max_share_price_e27,
                    receiver: *receiver,
                },
            ),
            Self::Erc4626Withdraw {
                vault,
                assets,
                min_share_price_e27,
                receiver,
                owner,
            } => raw(
                adapter,
                IGeneralAdapter1::erc4626WithdrawCall {
                    vault: *vault,
                    assets: assets.to_abi(),
                    minSharePriceE27: *min_share_price_e27,
                    receiver: *receiver,
                    owner: *owner,
                },
            ),
            Self::Erc4626Redeem {
                vault,
                shares,
                min_share_price_e27,
                receiver,
                owner,
            } => raw(
                adapter,
                IGeneralAdapter1::erc4626RedeemCall {
                    vault: *vault,
                    shares: shares.to_abi(),
                    minSharePriceE27: *min_share_price_e27,
                    receiver: *receiver,
                    owner: *owner,
                },
            ),
            Self::ReallocateTo {
                vault,
                withdrawals,
                supply_market,
                ..
            } => {
                let public_allocator =
                    addresses
                        .public_allocator
                        .ok_or(BundlerError::MissingContract {
                            contract: "PublicAllocator",
                        })?;
                let withdrawals = withdrawals
                    .iter()
                    .map(|step| {
                        Ok(Withdrawal {
                            marketParams: sol_market(&step.market),
                            amount: u128::try_from(step.amount).map_err(|_| {
                                ContractError::AmountOverflow {
                                    field: "amount",
                                    bits: 128,
                                    value: step.amount,
                                }
                            })?,
                        })
                    })
                    .collect::<Result<Vec<_>, BundlerError>>()?;
                raw(
                    public_allocator,
                    IPublicAllocator::reallocateToCall {
                        vault: *vault,
                        withdrawals,
                        supplyMarketParams: sol_market(supply_market),
                    },
                )
            }
        };

        Ok(Call {
            to: encoded.to,
            data: encoded.data,
            value: self.value(),
            skipRevert: self.requires_signature(),
            callbackHash: B256::ZERO,
        })
    }
}
