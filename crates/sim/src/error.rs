//! Error types for the simulation library.

use std::fmt;

use alloy_primitives::{Address, FixedBytes, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::operation::Operation;

/// Type alias for a 32-byte market ID
pub type MarketId = FixedBytes<32>;

/// An entity a lookup can miss in the simulation state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    Market { id: MarketId },
    Position { user: Address, market_id: MarketId },
    Vault { address: Address },
    VaultMarketConfig { vault: Address, market_id: MarketId },
    VaultV2 { address: Address },
    VaultV2Adapter { address: Address },
    Token { address: Address },
    User { address: Address },
    Spender { address: Address },
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Market { id } => write!(f, "market {id}"),
            Self::Position { user, market_id } => write!(f, "position of {user} in market {market_id}"),
            Self::Vault { address } => write!(f, "vault {address}"),
            Self::VaultMarketConfig { vault, market_id } => {
                write!(f, "config of market {market_id} in vault {vault}")
            }
            Self::VaultV2 { address } => write!(f, "vault v2 {address}"),
            Self::VaultV2Adapter { address } => write!(f, "vault v2 adapter {address}"),
            Self::Token { address } => write!(f, "token {address}"),
            Self::User { address } => write!(f, "user {address}"),
            Self::Spender { address } => write!(f, "spender {address}"),
        }
    }
}

/// Where a share balance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareSource {
    MarketSupply(MarketId),
    MarketBorrow(MarketId),
    Vault(Address),
}

impl fmt::Display for ShareSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MarketSupply(id) => write!(f, "supply of market {id}"),
            Self::MarketBorrow(id) => write!(f, "borrow of market {id}"),
            Self::Vault(vault) => write!(f, "vault {vault}"),
        }
    }
}

/// Errors that can occur during simulation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    /// Interest accrual was attempted with a timestamp before the last update
    #[error("Invalid interest accrual: timestamp {timestamp} is before last update {last_update}")]
    InvalidInterestAccrual { timestamp: u64, last_update: u64 },

    /// The operation references an id absent from the snapshot
    #[error("Unknown {0}")]
    UnknownEntity(Entity),

    /// A debit exceeds the holding's balance
    #[error("Insufficient balance of token {token} for {user}: has {balance}, needs {required}")]
    InsufficientBalance {
        user: Address,
        token: Address,
        balance: U256,
        required: U256,
    },

    /// A transferFrom exceeds the owner's allowance to the spender
    #[error("Insufficient allowance of token {token} from {owner} to {spender}: has {allowance}, needs {required}")]
    InsufficientAllowance {
        owner: Address,
        token: Address,
        spender: Address,
        allowance: U256,
        required: U256,
    },

    /// Borrow or withdraw exceeds the market's liquidity
    #[error("Insufficient liquidity in market {market_id}: has {liquidity}, needs {required}")]
    InsufficientLiquidity {
        market_id: MarketId,
        liquidity: U256,
        required: U256,
    },

    /// The vault's withdraw queue cannot cover a withdrawal
    #[error("Not enough liquidity for vault {vault}: {remaining} assets could not be withdrawn")]
    InsufficientVaultLiquidity { vault: Address, remaining: U256 },

    /// Burn exceeds the owner's share balance
    #[error("Insufficient shares for {owner} in {location}")]
    InsufficientShares { owner: Address, location: ShareSource },

    /// Resolved amount falls outside the slippage tolerance
    #[error("Slippage exceeded: expected {expected}, got {actual} (tolerance {slippage})")]
    SlippageExceeded {
        expected: U256,
        actual: U256,
        slippage: U256,
    },

    /// The sender acts on behalf of an owner who did not authorize it
    #[error("{sender} is not authorized to manage positions of {owner}")]
    Unauthorized { owner: Address, sender: Address },

    /// Insufficient collateral for borrow
    #[error("Insufficient collateral for user {user} in market {market_id}")]
    InsufficientCollateral { user: Address, market_id: MarketId },

    /// Unknown oracle price
    #[error("Oracle price unknown for market {market_id}")]
    UnknownOraclePrice { market_id: MarketId },

    /// Signed approval nonce does not match the stored one
    #[error("Invalid nonce for {owner}: expected {expected}, got {provided}")]
    InvalidNonce {
        owner: Address,
        expected: U256,
        provided: U256,
    },

    /// Permit2 allowance record has expired
    #[error("Permit2 allowance of {owner} on token {token} expired at {expiration} (now {timestamp})")]
    ExpiredPermit2 {
        owner: Address,
        token: Address,
        expiration: u64,
        timestamp: u64,
    },

    /// Token has no EIP-2612 support
    #[error("Token {token} does not support permit")]
    PermitUnsupported { token: Address },

    /// Wrap or unwrap on a token without a wrapper law
    #[error("Token {token} is not a wrapper")]
    NotWrapper { token: Address },

    /// All market supply caps have been reached during a vault deposit
    #[error("All caps reached for vault {vault}: {remaining} assets could not be deposited")]
    AllCapsReached { vault: Address, remaining: U256 },

    /// Market not enabled in vault
    #[error("Market {market_id} not enabled in vault {vault}")]
    MarketNotEnabled { vault: Address, market_id: MarketId },

    /// Supply cap exceeded
    #[error("Supply cap exceeded for market {market_id} in vault {vault}: cap is {cap}")]
    SupplyCapExceeded {
        vault: Address,
        market_id: MarketId,
        cap: U256,
    },

    /// Public allocator not configured
    #[error("Public allocator not configured for vault {vault}")]
    PublicAllocatorNotConfigured { vault: Address },

    /// Max inflow exceeded for public allocator
    #[error("Max inflow exceeded for market {market_id} in vault {vault}")]
    MaxInflowExceeded { vault: Address, market_id: MarketId },

    /// Max outflow exceeded for public allocator
    #[error("Max outflow exceeded for market {market_id} in vault {vault}")]
    MaxOutflowExceeded { vault: Address, market_id: MarketId },

    /// Vault supplies less than the requested withdrawal
    #[error("Vault {vault} supplies less than {required} in market {market_id}")]
    NotEnoughSupply {
        vault: Address,
        market_id: MarketId,
        required: U256,
    },

    /// Empty withdrawals list for public reallocate
    #[error("Empty withdrawals list for vault {vault}")]
    EmptyWithdrawals { vault: Address },

    /// Deposit market included in withdrawals
    #[error("Deposit market {market_id} included in withdrawals for vault {vault}")]
    DepositMarketInWithdrawals { vault: Address, market_id: MarketId },

    /// Withdrawals not sorted
    #[error("Withdrawals not sorted for vault {vault}")]
    WithdrawalsNotSorted { vault: Address },

    /// No vault exposing flow caps can cover a liquidity shortfall
    #[error("Insufficient liquidity in market {market_id} after reallocation: {shortfall} assets missing")]
    ReallocationExhausted { market_id: MarketId, shortfall: U256 },
}

impl SimError {
    pub(crate) fn unknown_market(id: MarketId) -> Self {
        Self::UnknownEntity(Entity::Market { id })
    }

    pub(crate) fn unknown_vault(address: Address) -> Self {
        Self::UnknownEntity(Entity::Vault { address })
    }

    pub(crate) fn unknown_token(address: Address) -> Self {
        Self::UnknownEntity(Entity::Token { address })
    }

    /// Configuration errors indicate an incomplete snapshot.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::UnknownEntity(_))
    }
}

/// A [`SimError`] raised while applying a specific operation.
#[derive(Debug, Clone, Error)]
#[error("{operation} failed: {source}")]
pub struct OperationError {
    pub operation: Box<Operation>,
    #[source]
    pub source: SimError,
}

impl OperationError {
    pub fn new(operation: &Operation, source: SimError) -> Self {
        Self {
            operation: Box::new(operation.clone()),
            source,
        }
    }
}
