//! Table formatting for operation runs and bundle actions.

use alloy_primitives::U256;
use morpho_rs_bundler::ActionBundle;
use morpho_rs_sim::AppliedOperation;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Tabled)]
struct StepRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Operation")]
    operation: String,
    #[tabled(rename = "Sender")]
    sender: String,
    #[tabled(rename = "Assets")]
    assets: String,
    #[tabled(rename = "Shares")]
    shares: String,
}

#[derive(Tabled)]
struct ActionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Signed")]
    signed: String,
    #[tabled(rename = "Value (wei)")]
    value: String,
}

pub(crate) fn truncate_address(addr: &str) -> String {
    if addr.len() > 10 {
        format!("{}...{}", &addr[..6], &addr[addr.len() - 4..])
    } else {
        addr.to_string()
    }
}

fn format_amount(amount: Option<U256>) -> String {
    amount.map_or_else(|| "-".to_string(), |amount| amount.to_string())
}

fn render<T: Tabled>(rows: Vec<T>) -> String {
    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::new(1..)).with(Alignment::left()));
    table.to_string()
}

pub fn format_steps_table(steps: &[AppliedOperation]) -> String {
    if steps.is_empty() {
        return "No operations.".to_string();
    }

    let rows: Vec<StepRow> = steps
        .iter()
        .map(|step| StepRow {
            index: step.index,
            operation: step.operation.name().to_string(),
            sender: truncate_address(&format!("{}", step.operation.sender)),
            assets: format_amount(step.outcome.assets),
            shares: format_amount(step.outcome.shares),
        })
        .collect();

    render(rows)
}

pub fn format_actions_table(bundle: &ActionBundle) -> String {
    if bundle.actions.is_empty() {
        return "No actions.".to_string();
    }

    let rows: Vec<ActionRow> = bundle
        .actions
        .iter()
        .enumerate()
        .map(|(index, action)| {
            let signed = match (action.requires_signature(), action.signature()) {
                (false, _) => "-",
                (true, Some(_)) => "Yes",
                (true, None) => "No",
            };
            let value = action.value();
            ActionRow {
                index,
                action: action.name().to_string(),
                signed: signed.to_string(),
                value: if value.is_zero() {
                    "-".to_string()
                } else {
                    value.to_string()
                },
            }
        })
        .collect();

    render(rows)
}
