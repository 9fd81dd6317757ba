//! Operations understood by the interpreter.
//!
//! On the wire an operation reads `{ "type": "Blue_Supply", "sender": "0x..", "args": {..} }`.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{Address, U256};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::MarketId;
use crate::market::Quantity;

/// An exact amount, or everything available to the payer at execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Amount {
    All,
    Exact(U256),
}

impl Amount {
    pub fn exact(amount: impl Into<U256>) -> Self {
        Self::Exact(amount.into())
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// The exact amount, or `available()` for [`Amount::All`].
    pub fn resolve(self, available: impl FnOnce() -> U256) -> U256 {
        match self {
            Self::All => available(),
            Self::Exact(amount) => amount,
        }
    }

    /// ABI form: [`Amount::All`] is `type(uint256).max`.
    pub fn to_abi(self) -> U256 {
        self.resolve(|| U256::MAX)
    }
}

impl From<U256> for Amount {
    fn from(amount: U256) -> Self {
        Self::Exact(amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Exact(amount) => write!(f, "{amount}"),
        }
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AmountVisitor;

        impl de::Visitor<'_> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("\"all\" or an integer amount")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Amount, E> {
                Ok(Amount::Exact(U256::from(value)))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Amount, E> {
                if value.eq_ignore_ascii_case("all") {
                    return Ok(Amount::All);
                }
                U256::from_str(value)
                    .map(Amount::Exact)
                    .map_err(|err| E::custom(format!("invalid amount {value:?}: {err}")))
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

/// Exactly one of an asset amount or a share amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetsOrShares {
    Assets(Amount),
    Shares(Amount),
}

impl AssetsOrShares {
    pub fn assets(amount: impl Into<U256>) -> Self {
        Self::Assets(Amount::exact(amount))
    }

    pub fn shares(amount: impl Into<U256>) -> Self {
        Self::Shares(Amount::exact(amount))
    }

    pub fn amount(&self) -> Amount {
        match self {
            Self::Assets(amount) | Self::Shares(amount) => *amount,
        }
    }

    /// Resolves to a [`Quantity`], using `all_assets` / `all_shares` for [`Amount::All`].
    pub fn resolve(
        self,
        all_assets: impl FnOnce() -> U256,
        all_shares: impl FnOnce() -> U256,
    ) -> Quantity {
        match self {
            Self::Assets(amount) => Quantity::Assets(amount.resolve(all_assets)),
            Self::Shares(amount) => Quantity::Shares(amount.resolve(all_shares)),
        }
    }
}

/// One withdrawal of a public reallocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReallocationWithdrawal {
    pub id: MarketId,
    pub assets: U256,
}

/// An operation applied by `sender`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub sender: Address,
    #[serde(flatten)]
    pub kind: OperationKind,
}

impl Operation {
    pub fn new(sender: Address, kind: OperationKind) -> Self {
        Self { sender, kind }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} by {}", self.name(), self.sender)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "args")]
pub enum OperationKind {
    #[serde(rename = "Blue_AccrueInterest")]
    BlueAccrueInterest { id: MarketId },
    #[serde(rename = "Blue_Supply")]
    BlueSupply {
        id: MarketId,
        amount: AssetsOrShares,
        on_behalf: Address,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slippage: Option<U256>,
    },
    #[serde(rename = "Blue_Withdraw")]
    BlueWithdraw {
        id: MarketId,
        amount: AssetsOrShares,
        on_behalf: Address,
        receiver: Address,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slippage: Option<U256>,
    },
    #[serde(rename = "Blue_Borrow")]
    BlueBorrow {
        id: MarketId,
        amount: AssetsOrShares,
        on_behalf: Address,
        receiver: Address,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slippage: Option<U256>,
    },
    #[serde(rename = "Blue_Repay")]
    BlueRepay {
        id: MarketId,
        amount: AssetsOrShares,
        on_behalf: Address,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slippage: Option<U256>,
    },
    #[serde(rename = "Blue_SupplyCollateral")]
    BlueSupplyCollateral {
        id: MarketId,
        assets: Amount,
        on_behalf: Address,
    },
    #[serde(rename = "Blue_WithdrawCollateral")]
    BlueWithdrawCollateral {
        id: MarketId,
        assets: Amount,
        on_behalf: Address,
        receiver: Address,
    },
    #[serde(rename = "Blue_SetAuthorization")]
    BlueSetAuthorization {
        owner: Address,
        authorized: Address,
        is_authorized: bool,
        #[serde(default)]
        signed: bool,
    },
    #[serde(rename = "MetaMorpho_AccrueInterest")]
    MetaMorphoAccrueInterest { vault: Address },
    #[serde(rename = "MetaMorpho_Deposit")]
    MetaMorphoDeposit {
        vault: Address,
        amount: AssetsOrShares,
        receiver: Address,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slippage: Option<U256>,
    },
    #[serde(rename = "MetaMorpho_Withdraw")]
    MetaMorphoWithdraw {
        vault: Address,
        amount: AssetsOrShares,
        receiver: Address,
        owner: Address,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slippage: Option<U256>,
    },
    #[serde(rename = "MetaMorpho_PublicReallocate")]
    MetaMorphoPublicReallocate {
        vault: Address,
        withdrawals: Vec<ReallocationWithdrawal>,
        supply_market: MarketId,
    },
    #[serde(rename = "VaultV2_AccrueInterest")]
    VaultV2AccrueInterest { vault: Address },
    #[serde(rename = "VaultV2_Deposit")]
    VaultV2Deposit {
        vault: Address,
        amount: AssetsOrShares,
        receiver: Address,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slippage: Option<U256>,
    },
    #[serde(rename = "VaultV2_Withdraw")]
    VaultV2Withdraw {
        vault: Address,
        amount: AssetsOrShares,
        receiver: Address,
        owner: Address,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slippage: Option<U256>,
    },
    #[serde(rename = "Erc20_Transfer")]
    Erc20Transfer {
        token: Address,
        from: Address,
        to: Address,
        amount: Amount,
    },
    #[serde(rename = "Erc20_Transfer2")]
    Erc20Transfer2 {
        token: Address,
        from: Address,
        to: Address,
        amount: Amount,
    },
    #[serde(rename = "Erc20_Approve")]
    Erc20Approve {
        token: Address,
        spender: Address,
        amount: U256,
    },
    #[serde(rename = "Erc20_Permit")]
    Erc20Permit {
        token: Address,
        spender: Address,
        amount: U256,
        nonce: U256,
    },
    #[serde(rename = "Erc20_Permit2")]
    Erc20Permit2 {
        token: Address,
        amount: U256,
        expiration: u64,
        nonce: u64,
    },
    #[serde(rename = "Erc20_Wrap")]
    Erc20Wrap {
        token: Address,
        owner: Address,
        amount: Amount,
    },
    #[serde(rename = "Erc20_Unwrap")]
    Erc20Unwrap {
        token: Address,
        receiver: Address,
        amount: Amount,
    },
}

impl OperationKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::BlueAccrueInterest { .. } => "Blue_AccrueInterest",
            Self::BlueSupply { .. } => "Blue_Supply",
            Self::BlueWithdraw { .. } => "Blue_Withdraw",
            Self::BlueBorrow { .. } => "Blue_Borrow",
            Self::BlueRepay { .. } => "Blue_Repay",
            Self::BlueSupplyCollateral { .. } => "Blue_SupplyCollateral",
            Self::BlueWithdrawCollateral { .. } => "Blue_WithdrawCollateral",
            Self::BlueSetAuthorization { .. } => "Blue_SetAuthorization",
            Self::MetaMorphoAccrueInterest { .. } => "MetaMorpho_AccrueInterest",
            Self::MetaMorphoDeposit { .. } => "MetaMorpho_Deposit",
            Self::MetaMorphoWithdraw { .. } => "MetaMorpho_Withdraw",
            Self::MetaMorphoPublicReallocate { .. } => "MetaMorpho_PublicReallocate",
            Self::VaultV2AccrueInterest { .. } => "VaultV2_AccrueInterest",
            Self::VaultV2Deposit { .. } => "VaultV2_Deposit",
            Self::VaultV2Withdraw { .. } => "VaultV2_Withdraw",
            Self::Erc20Transfer { .. } => "Erc20_Transfer",
            Self::Erc20Transfer2 { .. } => "Erc20_Transfer2",
            Self::Erc20Approve { .. } => "Erc20_Approve",
            Self::Erc20Permit { .. } => "Erc20_Permit",
            Self::Erc20Permit2 { .. } => "Erc20_Permit2",
            Self::Erc20Wrap { .. } => "Erc20_Wrap",
            Self::Erc20Unwrap { .. } => "Erc20_Unwrap",
        }
    }

    /// Grants an allowance or authorization rather than moving value.
    pub fn is_grant(&self) -> bool {
        matches!(
            self,
            Self::BlueSetAuthorization { .. }
                | Self::Erc20Approve { .. }
                | Self::Erc20Permit { .. }
                | Self::Erc20Permit2 { .. }
        )
    }
}
