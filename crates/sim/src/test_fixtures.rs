//! Shared mainnet-like states for unit tests.

use alloy_primitives::{address, Address, U256};

use crate::addresses::ChainAddresses;
use crate::error::MarketId;
use crate::holding::{Holding, Spender};
use crate::irm::INITIAL_RATE_AT_TARGET;
use crate::market::{Market, MarketParams};
use crate::position::Position;
use crate::state::{BlockInfo, SimulationState};
use crate::token::{Token, WrapLaw, Wrapper, NATIVE_ADDRESS};
use crate::vault::{PublicAllocatorConfig, Vault, VaultMarketConfig};
use crate::vault_v2::{MorphoMarketV1Adapter, VaultV2, VaultV2Adapter};

pub const USER: Address = Address::repeat_byte(0xaa);
pub const OTHER: Address = Address::repeat_byte(0xbb);
pub const FEE_RECIPIENT: Address = Address::repeat_byte(0xfe);

pub const USDC: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
pub const WETH: Address = address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");
pub const ADAPTER_ADDRESS: Address = address!("4A6c312ec70E8747a587EE860a0353cd42Be0aE0");

pub const VAULT: Address = Address::repeat_byte(0x51);
pub const VAULT_V2: Address = Address::repeat_byte(0x52);
pub const VAULT_V2_ADAPTER: Address = Address::repeat_byte(0x53);

pub const TIMESTAMP: u64 = 1_700_000_000;

pub fn usdc(amount: u64) -> U256 {
    U256::from(amount) * U256::from(1_000_000u64)
}

pub fn ether(amount: u64) -> U256 {
    U256::from(amount) * U256::from(1_000_000_000_000_000_000u64)
}

/// USDC shares carry 6 more decimals than assets.
pub fn usdc_shares(amount: u64) -> U256 {
    U256::from(amount) * U256::from(1_000_000_000_000u64)
}

/// 3000 USDC per WETH at Morpho's 1e36 oracle scale
fn weth_price() -> U256 {
    U256::from(3_000u64) * U256::from(10u64).pow(U256::from(24u64))
}

pub fn market_params(lltv: u64) -> MarketParams {
    let addresses = addresses();
    MarketParams::new(
        USDC,
        WETH,
        Address::repeat_byte(0x0a),
        addresses.adaptive_curve_irm.unwrap(),
        U256::from(lltv),
    )
}

/// USDC/WETH at 86% LLTV: 10750 supplied, 5000 borrowed.
pub fn market_id() -> MarketId {
    market_params(860_000_000_000_000_000).id()
}

/// USDC/WETH at 94.5% LLTV: 2000 supplied, all by [`VAULT`].
pub fn market_b_id() -> MarketId {
    market_params(945_000_000_000_000_000).id()
}

fn addresses() -> ChainAddresses {
    ChainAddresses::for_chain(1).unwrap()
}

/// Mainnet addresses, USDC and WETH tokens, one market, funded [`USER`].
pub fn state() -> SimulationState {
    let market = Market::new(market_params(860_000_000_000_000_000), TIMESTAMP)
        .with_supply(usdc(10_750), usdc_shares(10_750))
        .with_borrow(usdc(5_000), usdc_shares(5_000))
        .with_rate_at_target(INITIAL_RATE_AT_TARGET)
        .with_price(weth_price());

    let usdc_token = Token::new(USDC, 6, "USDC").with_permit("USD Coin", "2");
    let weth_token = Token::new(WETH, 18, "WETH").with_wrapper(Wrapper {
        underlying: NATIVE_ADDRESS,
        underlying_decimals: 18,
        law: WrapLaw::Constant,
    });

    let mut state = SimulationState::new(
        1,
        BlockInfo {
            number: 18_000_000,
            timestamp: TIMESTAMP,
        },
        addresses(),
    )
    .with_token(Token::native("ETH"))
    .with_token(usdc_token)
    .with_token(weth_token)
    .with_market(market)
    .with_holding(
        Holding::new(USER, USDC, usdc(10_000))
            .with_allowance(Spender::Morpho, U256::MAX)
            .with_erc2612_nonce(U256::from(3)),
    )
    .with_holding(Holding::new(USER, WETH, ether(10)).with_allowance(Spender::Morpho, U256::MAX))
    .with_holding(Holding::new(USER, NATIVE_ADDRESS, ether(1)));
    state.morpho_fee_recipient = FEE_RECIPIENT;
    state
}

/// [`state`] plus a public-allocator-enabled MetaMorpho vault over two markets.
///
/// The vault supplies 1000 to market A and 2000 to market B and has 3000e18 shares
/// held by [`OTHER`].
pub fn vault_state() -> SimulationState {
    let market_b = Market::new(market_params(945_000_000_000_000_000), TIMESTAMP)
        .with_supply(usdc(2_000), usdc_shares(2_000))
        .with_rate_at_target(INITIAL_RATE_AT_TARGET)
        .with_price(weth_price());

    let mut vault = Vault::new(VAULT, USDC, 6);
    vault.total_assets = usdc(3_000);
    vault.last_total_assets = usdc(3_000);
    vault.total_supply = ether(3_000);
    vault.fee_recipient = FEE_RECIPIENT;
    vault.supply_queue = vec![market_id(), market_b_id()];
    vault.withdraw_queue = vec![market_id(), market_b_id()];
    vault.public_allocator_config = Some(PublicAllocatorConfig {
        admin: Address::ZERO,
        fee: U256::from(1_000_000_000_000_000u64),
        accrued_fee: U256::ZERO,
    });

    state()
        .with_market(market_b)
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
        .with_holding(Holding::new(OTHER, VAULT, ether(3_000)))
}

/// [`state`] plus an empty Vault V2 whose liquidity adapter supplies market A.
pub fn vault_v2_state() -> SimulationState {
    let mut vault = VaultV2::new(VAULT_V2, USDC, 6, TIMESTAMP);
    vault.adapters = vec![VAULT_V2_ADAPTER];
    vault.liquidity_adapter = Some(VAULT_V2_ADAPTER);
    vault.liquidity_market = Some(market_id());
    vault.max_rate = U256::from(63_419_583_967u64);

    state()
        .with_vault_v2(vault)
        .with_vault_v2_adapter(VaultV2Adapter::MorphoMarketV1(MorphoMarketV1Adapter {
            address: VAULT_V2_ADAPTER,
            parent_vault: VAULT_V2,
            market_ids: vec![market_id()],
        }))
}

/// Moves `state` forward by `seconds`.
pub fn advance(state: SimulationState, seconds: u64) -> SimulationState {
    let block = BlockInfo {
        number: state.block.number + seconds / 12,
        timestamp: state.block.timestamp + seconds,
    };
    state.at_block(block)
}
