//! Command implementations.

pub mod addresses;
pub mod plan;
pub mod simulate;

pub use addresses::run_addresses;
pub use plan::run_plan;
pub use simulate::run_simulate;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use morpho_rs_sim::{
    Operation, SimulationState, SnapshotSource, StateConfig, StateSnapshot, StateSource,
};
use serde::de::DeserializeOwned;

use crate::cli::StateArgs;

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} file {}", what, path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse {} file {}", what, path.display()))
}

/// Loads the state snapshot, checking the requested block.
pub async fn load_state(args: &StateArgs) -> Result<SimulationState> {
    let snapshot: StateSnapshot = read_json(&args.state, "state")?;
    let source = SnapshotSource::new(snapshot, StateConfig::new());
    source
        .fetch(args.block)
        .await
        .with_context(|| format!("Invalid state snapshot {}", args.state.display()))
}

pub fn load_operations(path: &Path) -> Result<Vec<Operation>> {
    read_json(path, "operations")
}
