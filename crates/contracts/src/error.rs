//! Error types for the contracts crate.

use alloy_primitives::U256;
use thiserror::Error;

/// Errors that can occur when building, decoding or signing calls.
#[derive(Debug, Error)]
pub enum ContractError {
    /// A value exceeds the width of its Solidity field.
    #[error("{field} does not fit in uint{bits}: {value}")]
    AmountOverflow {
        field: &'static str,
        bits: usize,
        value: U256,
    },

    /// Calldata does not decode as the expected call.
    #[error("Invalid calldata: {0}")]
    Decode(#[from] alloy::sol_types::Error),

    /// The signer failed to produce a signature.
    #[error("Signing failed: {0}")]
    Signer(#[from] alloy::signers::Error),
}

/// Result type alias for contract operations.
pub type Result<T> = std::result::Result<T, ContractError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_amount_overflow() {
        let error = ContractError::AmountOverflow {
            field: "amount",
            bits: 160,
            value: U256::MAX,
        };
        assert_eq!(
            error.to_string(),
            format!("amount does not fit in uint160: {}", U256::MAX)
        );
    }

    #[test]
    fn test_error_display_signer() {
        let error = ContractError::from(alloy::signers::Error::other("locked"));
        assert!(error.to_string().starts_with("Signing failed"));
    }
}
