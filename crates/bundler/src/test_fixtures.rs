//! Mainnet-like states for planner tests.

use alloy_primitives::{address, Address, U256};
use morpho_rs_sim::{
    BlockInfo, ChainAddresses, Holding, Market, MarketId, MarketParams, Position,
    PublicAllocatorConfig, SimulationState, Token, Vault, VaultMarketConfig, WrapLaw, Wrapper,
    INITIAL_RATE_AT_TARGET, NATIVE_ADDRESS,
};

pub const USER: Address = Address::repeat_byte(0xaa);
pub const OTHER: Address = Address::repeat_byte(0xbb);

pub const USDC: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
pub const WETH: Address = address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");
pub const VAULT: Address = Address::repeat_byte(0x51);

pub const TIMESTAMP: u64 = 1_700_000_000;

pub fn usdc(amount: u64) -> U256 {
    U256::from(amount) * U256::from(1_000_000u64)
}

pub fn ether(amount: u64) -> U256 {
    U256::from(amount) * U256::from(1_000_000_000_000_000_000u64)
}

fn usdc_shares(amount: u64) -> U256 {
    U256::from(amount) * U256::from(1_000_000_000_000u64)
}

pub fn addresses() -> ChainAddresses {
    ChainAddresses::for_chain(1).unwrap()
}

pub fn adapter() -> Address {
    addresses().general_adapter1
}

fn market_params(lltv: u64) -> MarketParams {
    MarketParams::new(
        USDC,
        WETH,
        Address::repeat_byte(0x0a),
        addresses().adaptive_curve_irm.unwrap(),
        U256::from(lltv),
    )
}

/// 86% LLTV: 10750 supplied, 5000 borrowed.
pub fn market_id() -> MarketId {
    market_params(860_000_000_000_000_000).id()
}

/// 94.5% LLTV: 2000 supplied, all by [`VAULT`].
pub fn market_b_id() -> MarketId {
    market_params(945_000_000_000_000_000).id()
}

fn weth_price() -> U256 {
    U256::from(3_000u64) * U256::from(10u64).pow(U256::from(24u64))
}

/// USDC with an EIP-2612 domain, WETH wrapping native, and [`USER`] holding
/// 10000 USDC (permit nonce 3), 10 WETH and 1 ETH with no allowances.
pub fn state() -> SimulationState {
    let market = Market::new(market_params(860_000_000_000_000_000), TIMESTAMP)
        .with_supply(usdc(10_750), usdc_shares(10_750))
        .with_borrow(usdc(5_000), usdc_shares(5_000))
        .with_rate_at_target(INITIAL_RATE_AT_TARGET)
        .with_price(weth_price());

    SimulationState::new(
        1,
        BlockInfo {
            number: 18_000_000,
            timestamp: TIMESTAMP,
        },
        addresses(),
    )
    .with_token(Token::native("ETH"))
    .with_token(Token::new(USDC, 6, "USDC").with_permit("USD Coin", "2"))
    .with_token(Token::new(WETH, 18, "WETH").with_wrapper(Wrapper {
        underlying: NATIVE_ADDRESS,
        underlying_decimals: 18,
        law: WrapLaw::Constant,
    }))
    .with_market(market)
    .with_holding(Holding::new(USER, USDC, usdc(10_000)).with_erc2612_nonce(U256::from(3)))
    .with_holding(Holding::new(USER, WETH, ether(10)))
    .with_holding(Holding::new(USER, NATIVE_ADDRESS, ether(1)))
}

/// [`state`] plus a public-allocator vault supplying 1000 to market A and 2000 to
/// market B, with flow caps A `(500, 500)` and B `(1000, 800)`. [`USER`] holds
/// 100 of its 3000 shares.
pub fn vault_state() -> SimulationState {
    let market_b = Market::new(market_params(945_000_000_000_000_000), TIMESTAMP)
        .with_supply(usdc(2_000), usdc_shares(2_000))
        .with_rate_at_target(INITIAL_RATE_AT_TARGET)
        .with_price(weth_price());

    let mut vault = Vault::new(VAULT, USDC, 6);
    vault.total_assets = usdc(3_000);
    vault.last_total_assets = usdc(3_000);
    vault.total_supply = ether(3_000);
    vault.supply_queue = vec![market_id(), market_b_id()];
    vault.withdraw_queue = vec![market_id(), market_b_id()];
    vault.public_allocator_config = Some(PublicAllocatorConfig {
        admin: Address::ZERO,
        fee: U256::from(1_000_000_000_000_000u64),
        accrued_fee: U256::ZERO,
    });

    state()
        .with_market(market_b)
        .with_token(Token::new(VAULT, 18, "mUSDC"))
        .with_vault(vault)
        .with_vault_market_config(
            VaultMarketConfig::new(VAULT, market_id(), usdc(2_000))
                .with_flow_caps(usdc(500), usdc(500)),
        )
        .with_vault_market_config(
            VaultMarketConfig::new(VAULT, market_b_id(), usdc(5_000))
                .with_flow_caps(usdc(1_000), usdc(800)),
        )
        .with_position(Position::new(VAULT, market_id(), usdc_shares(1_000), U256::ZERO, U256::ZERO))
        .with_position(Position::new(VAULT, market_b_id(), usdc_shares(2_000), U256::ZERO, U256::ZERO))
        .with_holding(Holding::new(OTHER, VAULT, ether(2_900)))
        .with_holding(Holding::new(USER, VAULT, ether(100)))
}

/// [`USER`] with 4 WETH of collateral on market A, worth 12000 USDC.
pub fn borrower_state() -> SimulationState {
    vault_state().with_position(Position::new(USER, market_id(), U256::ZERO, U256::ZERO, ether(4)))
}
