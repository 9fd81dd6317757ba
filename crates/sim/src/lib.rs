//! Morpho State Simulator
//!
//! This crate replays Morpho operations over an in-memory snapshot of the chain:
//! Morpho Blue markets and positions, MetaMorpho vaults with the public allocator,
//! Vault V2 with its adapters, and the token balances, allowances and permits of
//! every account involved.
//!
//! # Overview
//!
//! - Accrue market interest with the Adaptive Curve IRM and vault fees
//! - Apply typed [`Operation`]s with exact on-chain rounding
//! - Run a sequence of operations as a strict left fold with [`simulate`]
//! - Bound results by slippage against a quote state
//! - Load and export states as JSON [`StateSnapshot`]s
//!
//! # Example
//!
//! ```rust,ignore
//! use morpho_rs_sim::{simulate, AssetsOrShares, Operation, OperationKind};
//!
//! let supply = Operation::new(
//!     user,
//!     OperationKind::BlueSupply {
//!         id: market_id,
//!         amount: AssetsOrShares::assets(U256::from(1_000_000_000u64)),
//!         on_behalf: user,
//!         slippage: None,
//!     },
//! );
//!
//! let run = simulate(&state, &[supply])?;
//! let market = run.final_state.market(market_id)?;
//! println!("total supply: {}", market.total_supply_assets);
//! ```

pub mod addresses;
pub mod config;
pub mod error;
mod handlers;
pub mod holding;
pub mod irm;
pub mod market;
pub mod math;
pub mod operation;
pub mod position;
pub mod simulate;
pub mod snapshot;
pub mod source;
pub mod state;
pub mod token;
pub mod user;
pub mod vault;
pub mod vault_v2;

#[cfg(test)]
mod test_fixtures;

// Re-export commonly used types
pub use addresses::ChainAddresses;
pub use config::StateConfig;
pub use error::{Entity, MarketId, OperationError, ShareSource, SimError};
pub use handlers::Outcome;
pub use holding::{Allowances, Holding, Permit2Allowance, Spender, MAX_UINT_160, MAX_UINT_48};
pub use operation::{Amount, AssetsOrShares, Operation, OperationKind, ReallocationWithdrawal};
pub use simulate::{
    apply_operation, apply_operation_with_quote, simulate, simulate_with_quote, AppliedOperation,
    SimulationFailure, SimulationRun,
};
pub use snapshot::{SnapshotError, StateSnapshot};
pub use source::{SnapshotSource, SourceError, StateSource};
pub use state::{BlockInfo, SimulationState};
pub use token::{PermitDomain, Token, WrapLaw, Wrapper, NATIVE_ADDRESS};
pub use user::User;

// Market exports
pub use market::{
    get_liquidation_incentive_factor, get_utilization, Market, MarketParams, Quantity,
    LIQUIDATION_CURSOR, MAX_LIQUIDATION_INCENTIVE_FACTOR, ORACLE_PRICE_SCALE,
};

// Math exports
pub use math::{RoundingDirection, SECONDS_PER_YEAR, WAD};

// Position exports
pub use position::{
    AccrualPosition, CapacityLimit, CapacityLimitReason, Position, PositionCapacities,
};

// Vault exports
pub use vault::{FlowCaps, PendingValue, PublicAllocatorConfig, Vault, VaultMarketConfig};
pub use vault_v2::{
    Adapter, MetaMorphoV1Adapter, MorphoMarketV1Adapter, VaultV2, VaultV2Accrual, VaultV2Adapter,
};

// IRM exports
pub use irm::{
    get_borrow_rate, w_exp, BorrowRateResult, ADJUSTMENT_SPEED, CURVE_STEEPNESS,
    INITIAL_RATE_AT_TARGET, MAX_RATE_AT_TARGET, MIN_RATE_AT_TARGET, TARGET_UTILIZATION,
};
