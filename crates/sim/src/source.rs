//! Where simulation states come from.
//!
//! Fetching is the only asynchronous step of a simulation: sources may query an
//! indexer or a node, then hand back a [`SimulationState`] that the synchronous
//! core works on.

use std::future::Future;

use thiserror::Error;

use crate::config::StateConfig;
use crate::snapshot::{SnapshotError, StateSnapshot};
use crate::state::SimulationState;

/// Produces the state of a chain at a block.
pub trait StateSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetches the state at `block`, or at the latest block the source knows.
    fn fetch(
        &self,
        block: Option<u64>,
    ) -> impl Future<Output = Result<SimulationState, Self::Error>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("Block {requested} unavailable, source holds block {available}")]
    BlockUnavailable { requested: u64, available: u64 },

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Serves a single in-memory snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    snapshot: StateSnapshot,
    config: StateConfig,
}

impl SnapshotSource {
    pub fn new(snapshot: StateSnapshot, config: StateConfig) -> Self {
        Self { snapshot, config }
    }

    pub fn block_number(&self) -> u64 {
        self.snapshot.block.number
    }
}

impl StateSource for SnapshotSource {
    type Error = SourceError;

    async fn fetch(&self, block: Option<u64>) -> Result<SimulationState, SourceError> {
        let available = self.block_number();
        if let Some(requested) = block.filter(|requested| *requested != available) {
            return Err(SourceError::BlockUnavailable {
                requested,
                available,
            });
        }
        Ok(SimulationState::from_snapshot(
            self.snapshot.clone(),
            &self.config,
        )?)
    }
}
