//! Addresses command implementation.

use anyhow::{Context, Result};
use morpho_rs_sim::ChainAddresses;

use crate::cli::{AddressesArgs, OutputFormat};
use crate::output::format_addresses_detail;

pub fn run_addresses(args: &AddressesArgs, format: OutputFormat) -> Result<()> {
    let addresses = ChainAddresses::for_chain(u64::from(args.chain.0))
        .with_context(|| format!("No address book for chain {}", args.chain))?;

    match format {
        OutputFormat::Table => {
            println!("{}", format_addresses_detail(&args.chain.to_string(), &addresses));
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&addresses)?);
        }
    }

    Ok(())
}
