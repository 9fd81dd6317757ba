//! Plan command implementation.

use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use morpho_rs_bundler::{
    plan, plan_and_sign, ActionBundle, BundlerOptions, PlannedBundle, PublicAllocatorOptions,
};
use morpho_rs_contracts::RawCall;
use morpho_rs_sim::{Operation, StateSnapshot};
use serde::Serialize;

use super::{load_operations, load_state};
use crate::cli::{OutputFormat, PlanArgs};
use crate::output::format_plan_detail;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanReport<'a> {
    operations: &'a [Operation],
    bundle: &'a ActionBundle,
    /// Present once every signature is embedded
    #[serde(skip_serializing_if = "Option::is_none")]
    tx: Option<RawCall>,
    final_state: StateSnapshot,
}

fn bundler_options(args: &PlanArgs) -> BundlerOptions {
    let mut public_allocator = if args.no_public_allocator {
        PublicAllocatorOptions::disabled()
    } else {
        PublicAllocatorOptions::default()
    };
    if let Some(utilization) = args.supply_target_utilization {
        public_allocator = public_allocator.with_supply_target_utilization(utilization);
    }
    if let Some(utilization) = args.max_withdrawal_utilization {
        public_allocator = public_allocator.with_max_withdrawal_utilization(utilization);
    }
    for vault in &args.reallocatable_vaults {
        public_allocator = public_allocator.with_reallocatable_vault(*vault);
    }

    let mut options = BundlerOptions::new()
        .with_supports_signature(!args.no_signature)
        .with_public_allocator(public_allocator);
    for token in &args.unwrap_tokens {
        options = options.with_unwrap_token(*token);
    }
    if let Some(slippage) = args.slippage {
        options = options.with_slippage(slippage);
    }
    if let Some(seconds) = args.signature_validity {
        options = options.with_signature_validity(seconds);
    }
    options
}

pub async fn run_plan(args: &PlanArgs, format: OutputFormat) -> Result<()> {
    let state = load_state(&args.state).await?;
    let inputs = load_operations(&args.operations)?;
    let options = bundler_options(args);

    let planned: PlannedBundle = match &args.private_key {
        Some(key) => {
            let signer: PrivateKeySigner = key.parse().context("Invalid private key")?;
            plan_and_sign(&inputs, &state, &options, &signer)
                .await
                .context("Failed to plan bundle")?
        }
        None => plan(&inputs, &state, &options).context("Failed to plan bundle")?,
    };

    let tx = if planned.bundle.is_signed() {
        Some(planned.bundle.tx().context("Failed to encode multicall")?)
    } else {
        None
    };

    match format {
        OutputFormat::Table => {
            println!("{}", format_plan_detail(&planned, tx.as_ref()));
        }
        OutputFormat::Json => {
            let report = PlanReport {
                operations: &planned.operations,
                bundle: &planned.bundle,
                tx,
                final_state: planned.final_state.to_snapshot(),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
