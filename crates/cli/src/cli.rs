//! CLI argument definitions using clap.

use std::path::PathBuf;
use std::str::FromStr;

use alloy_chains::NamedChain;
use alloy_primitives::{Address, U256};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use morpho_rs_sim::ChainAddresses;

/// Morpho CLI - Simulate operations and plan Bundler3 bundles
#[derive(Parser, Debug)]
#[command(name = "morpho")]
#[command(about = "CLI tool for simulating Morpho operations and planning bundles", long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(long, global = true, env = "MORPHO_FORMAT", default_value = "table")]
    pub format: OutputFormat,

    /// Log more (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply operations to a state snapshot in order
    Simulate(SimulateArgs),
    /// Plan the Bundler3 bundle running a user's operations
    Plan(PlanArgs),
    /// Show the canonical contract addresses of a chain
    Addresses(AddressesArgs),
}

#[derive(Args, Debug)]
pub struct StateArgs {
    /// State snapshot JSON file (can also use MORPHO_STATE env var)
    #[arg(long, env = "MORPHO_STATE")]
    pub state: PathBuf,

    /// Block the snapshot must be taken at
    #[arg(long)]
    pub block: Option<u64>,
}

#[derive(Parser, Debug)]
pub struct SimulateArgs {
    /// JSON file holding an array of operations
    pub operations: PathBuf,

    #[command(flatten)]
    pub state: StateArgs,
}

#[derive(Parser, Debug)]
pub struct PlanArgs {
    /// JSON file holding an array of operations sent by one user
    pub operations: PathBuf,

    #[command(flatten)]
    pub state: StateArgs,

    /// The wallet cannot sign EIP-712 messages: use transactions only
    #[arg(long)]
    pub no_signature: bool,

    /// Token to unwrap for the user at the end of the bundle (repeatable)
    #[arg(long = "unwrap", value_name = "TOKEN")]
    pub unwrap_tokens: Vec<Address>,

    /// Share price tolerance in WAD (default 0.03%)
    #[arg(long)]
    pub slippage: Option<U256>,

    /// Seconds every signature stays valid
    #[arg(long)]
    pub signature_validity: Option<u64>,

    /// Never reallocate through the public allocator
    #[arg(long)]
    pub no_public_allocator: bool,

    /// Reallocate until the market is back under this utilization (WAD)
    #[arg(long)]
    pub supply_target_utilization: Option<U256>,

    /// Never withdraw donor markets past this utilization (WAD)
    #[arg(long)]
    pub max_withdrawal_utilization: Option<U256>,

    /// Vault allowed to donate liquidity (repeatable, default every vault)
    #[arg(long = "reallocatable-vault", value_name = "VAULT")]
    pub reallocatable_vaults: Vec<Address>,

    /// Private key signing the requirements (can also use PRIVATE_KEY env var)
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,
}

#[derive(Parser, Debug)]
pub struct AddressesArgs {
    /// Chain to show (default: ethereum)
    #[arg(long, default_value = "ethereum")]
    pub chain: ChainArg,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// A chain with a Morpho address book, parsed with aliases
#[derive(Clone, Copy, Debug)]
pub struct ChainArg(pub NamedChain);

impl FromStr for ChainArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let chain = match s.to_lowercase().as_str() {
            "ethereum" | "eth" | "mainnet" | "1" => NamedChain::Mainnet,
            "base" | "8453" => NamedChain::Base,
            _ => return Err(format!("Unknown chain: {}", s)),
        };
        if ChainAddresses::for_chain(u64::from(chain)).is_none() {
            return Err(format!("No address book for chain: {}", s));
        }
        Ok(ChainArg(chain))
    }
}

impl std::fmt::Display for ChainArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
