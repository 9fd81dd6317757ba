//! Error types for bundle planning.

use alloy_primitives::Address;
use morpho_rs_contracts::ContractError;
use morpho_rs_sim::{Operation, OperationError, SimError, SimulationFailure, SimulationState};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BundlerError {
    /// Populating input `index` failed on the running state.
    ///
    /// `state` and `operations` are what the inputs before `index` built.
    #[error("Input {index} failed: {source}")]
    Input {
        index: usize,
        #[source]
        source: OperationError,
        state: Box<SimulationState>,
        operations: Vec<Operation>,
    },

    /// The finalized operations do not simulate from the start state.
    #[error("Bundle simulation failed: {0}")]
    Simulation(#[from] SimulationFailure),

    #[error(transparent)]
    Sim(#[from] SimError),

    #[error("Inputs must share one sender: expected {expected}, found {found}")]
    MixedSenders { expected: Address, found: Address },

    #[error("{operation} is inserted by the planner and cannot be an input (input {index})")]
    UnsupportedInput {
        index: usize,
        operation: &'static str,
    },

    #[error("Operation {index} ({operation}) has no Bundler3 encoding")]
    Unencodable {
        index: usize,
        operation: &'static str,
    },

    #[error("No {contract} deployment on this chain")]
    MissingContract { contract: &'static str },

    #[error("Action {action} is not signed")]
    MissingSignature { action: usize },

    #[error("Signature requirement for {expected} cannot be signed by {found}")]
    SignerMismatch { expected: Address, found: Address },

    #[error(transparent)]
    Contract(#[from] ContractError),
}
