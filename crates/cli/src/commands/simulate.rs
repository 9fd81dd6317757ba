//! Simulate command implementation.

use anyhow::{Context, Result};
use morpho_rs_sim::{simulate, AppliedOperation, StateSnapshot};
use serde::Serialize;

use super::{load_operations, load_state};
use crate::cli::{OutputFormat, SimulateArgs};
use crate::output::format_steps_table;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulationReport<'a> {
    steps: &'a [AppliedOperation],
    final_state: StateSnapshot,
}

pub async fn run_simulate(args: &SimulateArgs, format: OutputFormat) -> Result<()> {
    let state = load_state(&args.state).await?;
    let operations = load_operations(&args.operations)?;

    let run = match simulate(&state, &operations) {
        Ok(run) => run,
        Err(failure) => {
            if matches!(format, OutputFormat::Table) && !failure.steps.is_empty() {
                println!("{}", format_steps_table(&failure.steps));
            }
            return Err(failure).context("Simulation failed");
        }
    };

    match format {
        OutputFormat::Table => {
            println!("{}", format_steps_table(&run.steps));
        }
        OutputFormat::Json => {
            let report = SimulationReport {
                steps: &run.steps,
                final_state: run.final_state.to_snapshot(),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
