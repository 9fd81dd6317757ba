//! Morpho Bundle Planner
//!
//! This crate turns user-level Morpho operations into one Bundler3 `multicall`
//! routed through GeneralAdapter1, together with the approvals and EIP-712
//! signatures the user must provide first.
//!
//! # Overview
//!
//! Planning runs in three passes over a [`SimulationState`](morpho_rs_sim::SimulationState):
//!
//! 1. Populate: pull input tokens through the cheapest allowance path, wrap
//!    shortfalls, authorize the adapter, and reallocate vault liquidity through
//!    the public allocator when a market lacks it
//! 2. Finalize: merge and hoist grants, then unwrap and skim the adapter's
//!    leftovers back to the user
//! 3. Encode: map every operation to a [`BundlerAction`] with share price bounds
//!
//! # Example
//!
//! ```rust,ignore
//! use morpho_rs_bundler::{plan_and_sign, BundlerOptions};
//!
//! let planned = plan_and_sign(&inputs, &state, &BundlerOptions::new(), &signer).await?;
//! let tx = planned.bundle.tx()?;
//! println!("multicall to {} with {} wei", tx.to, tx.value);
//! ```

pub mod action;
mod allowance;
pub mod bundle;
mod encode;
pub mod error;
mod finalize;
pub mod options;
pub mod planner;
mod populate;
mod reallocation;
pub mod requirements;

#[cfg(test)]
mod test_fixtures;

pub use action::{BundlerAction, ReallocationStep};
pub use bundle::ActionBundle;
pub use error::BundlerError;
pub use options::{BundlerOptions, PublicAllocatorOptions, DEFAULT_SLIPPAGE};
pub use planner::{plan, plan_and_sign, PlannedBundle};
pub use requirements::{
    AuthorizationMessage, PermitMessage, PermitSingleMessage, Requirements,
    SignatureRequirement, SigningDomain, TransactionKind, TransactionRequirement, TypedMessage,
};
