//! Token metadata and wrapper conversion laws.

use alloy_primitives::{address, Address, U256};
use serde::{Deserialize, Serialize};

use crate::math::{mul_div, RoundingDirection, WAD};

/// Pseudo address of the chain's native asset.
pub const NATIVE_ADDRESS: Address = address!("EeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE");

/// EIP-712 domain fields of an EIP-2612 token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitDomain {
    pub name: String,
    pub version: String,
}

/// How a wrapped amount converts to its underlying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WrapLaw {
    /// One wrapped unit per underlying unit after decimal scaling
    Constant,
    /// `rate` underlying units (WAD-scaled) per wrapped unit
    ExchangeRate { rate: U256 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wrapper {
    pub underlying: Address,
    pub underlying_decimals: u8,
    pub law: WrapLaw,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub address: Address,
    pub decimals: u8,
    pub symbol: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Set when the token accepts EIP-2612 permits
    #[serde(default)]
    pub permit: Option<PermitDomain>,
    #[serde(default)]
    pub wrapper: Option<Wrapper>,
}

impl Token {
    pub fn new(address: Address, decimals: u8, symbol: impl Into<String>) -> Self {
        Self {
            address,
            decimals,
            symbol: symbol.into(),
            name: None,
            permit: None,
            wrapper: None,
        }
    }

    /// The native asset pseudo token.
    pub fn native(symbol: impl Into<String>) -> Self {
        Self::new(NATIVE_ADDRESS, 18, symbol)
    }

    pub fn with_permit(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.permit = Some(PermitDomain {
            name: name.into(),
            version: version.into(),
        });
        self
    }

    pub fn with_wrapper(mut self, wrapper: Wrapper) -> Self {
        self.wrapper = Some(wrapper);
        self
    }

    pub fn is_native(&self) -> bool {
        self.address == NATIVE_ADDRESS
    }

    /// Wrapped token of the native asset (WETH-like)
    pub fn wraps_native(&self) -> bool {
        self.wrapper
            .as_ref()
            .is_some_and(|w| w.underlying == NATIVE_ADDRESS)
    }

    pub fn supports_permit(&self) -> bool {
        self.permit.is_some()
    }

    /// Converts an underlying amount into wrapped units.
    pub fn to_wrapped(&self, underlying: U256, rounding: RoundingDirection) -> Option<U256> {
        let wrapper = self.wrapper.as_ref()?;
        let (numerator, denominator) = self.scale(wrapper);
        Some(match &wrapper.law {
            WrapLaw::Constant => mul_div(underlying, numerator, denominator, rounding),
            WrapLaw::ExchangeRate { rate } => mul_div(
                mul_div(underlying, numerator, denominator, rounding),
                WAD,
                *rate,
                rounding,
            ),
        })
    }

    /// Converts a wrapped amount into underlying units.
    pub fn to_unwrapped(&self, wrapped: U256, rounding: RoundingDirection) -> Option<U256> {
        let wrapper = self.wrapper.as_ref()?;
        let (numerator, denominator) = self.scale(wrapper);
        let underlying_scaled = match &wrapper.law {
            WrapLaw::Constant => wrapped,
            WrapLaw::ExchangeRate { rate } => mul_div(wrapped, *rate, WAD, rounding),
        };
        Some(mul_div(underlying_scaled, denominator, numerator, rounding))
    }

    /// (wrapped scale, underlying scale) as powers of ten
    fn scale(&self, wrapper: &Wrapper) -> (U256, U256) {
        let ten = U256::from(10u64);
        (
            ten.pow(U256::from(self.decimals)),
            ten.pow(U256::from(wrapper.underlying_decimals)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weth() -> Token {
        Token::new(Address::repeat_byte(0x11), 18, "WETH").with_wrapper(Wrapper {
            underlying: NATIVE_ADDRESS,
            underlying_decimals: 18,
            law: WrapLaw::Constant,
        })
    }

    #[test]
    fn test_constant_law_is_identity_with_equal_decimals() {
        let token = weth();
        let amount = U256::from(123_456u64);
        assert_eq!(token.to_wrapped(amount, RoundingDirection::Down), Some(amount));
        assert_eq!(token.to_unwrapped(amount, RoundingDirection::Down), Some(amount));
        assert!(token.wraps_native());
    }

    #[test]
    fn test_constant_law_scales_decimals() {
        let token = Token::new(Address::repeat_byte(0x22), 18, "wUSDC").with_wrapper(Wrapper {
            underlying: Address::repeat_byte(0x33),
            underlying_decimals: 6,
            law: WrapLaw::Constant,
        });
        assert_eq!(
            token.to_wrapped(U256::from(1_000_000u64), RoundingDirection::Down),
            Some(WAD)
        );
        assert_eq!(
            token.to_unwrapped(WAD, RoundingDirection::Down),
            Some(U256::from(1_000_000u64))
        );
    }

    #[test]
    fn test_exchange_rate_law() {
        // 1 wrapped = 1.2 underlying
        let rate = U256::from(1_200_000_000_000_000_000u64);
        let token = Token::new(Address::repeat_byte(0x44), 18, "wstETH").with_wrapper(Wrapper {
            underlying: Address::repeat_byte(0x55),
            underlying_decimals: 18,
            law: WrapLaw::ExchangeRate { rate },
        });

        let wrapped = token.to_wrapped(U256::from(12) * WAD, RoundingDirection::Down);
        assert_eq!(wrapped, Some(U256::from(10) * WAD));

        let unwrapped = token.to_unwrapped(U256::from(10) * WAD, RoundingDirection::Down);
        assert_eq!(unwrapped, Some(U256::from(12) * WAD));
    }

    #[test]
    fn test_plain_token_has_no_law() {
        let token = Token::new(Address::ZERO, 6, "USDC");
        assert_eq!(token.to_wrapped(U256::from(1), RoundingDirection::Down), None);
        assert!(!token.supports_permit());
        assert!(token.with_permit("USD Coin", "2").supports_permit());
    }
}
