//! Detailed output for planned bundles and address books.

use colored::Colorize;
use morpho_rs_bundler::{PlannedBundle, TransactionKind, TypedMessage};
use morpho_rs_contracts::RawCall;
use morpho_rs_sim::ChainAddresses;

use super::table::{format_actions_table, format_steps_table};

fn format_optional(addr: Option<impl std::fmt::Display>) -> String {
    addr.map_or_else(|| "-".to_string(), |addr| format!("{}", addr))
}

fn section(output: &mut String, title: &str) {
    output.push_str(&format!("{}\n", title.cyan().bold()));
}

pub fn format_addresses_detail(chain: &str, addresses: &ChainAddresses) -> String {
    let mut output = String::new();

    output.push_str(&format!("{}\n", "=".repeat(60)));
    output.push_str(&format!("{}\n", format!("Morpho on {}", chain).bold()));
    output.push_str(&format!("{}\n\n", "=".repeat(60)));

    section(&mut output, "Core");
    output.push_str(&format!("  Morpho:            {}\n", addresses.morpho));
    output.push_str(&format!("  Bundler3:          {}\n", addresses.bundler3));
    output.push_str(&format!("  GeneralAdapter1:   {}\n\n", addresses.general_adapter1));

    section(&mut output, "Periphery");
    output.push_str(&format!("  Permit2:           {}\n", format_optional(addresses.permit2)));
    output.push_str(&format!(
        "  PublicAllocator:   {}\n",
        format_optional(addresses.public_allocator)
    ));
    output.push_str(&format!(
        "  Wrapped native:    {}\n",
        format_optional(addresses.wrapped_native)
    ));
    output.push_str(&format!(
        "  AdaptiveCurveIrm:  {}\n",
        format_optional(addresses.adaptive_curve_irm)
    ));

    output
}

fn message_kind(message: &TypedMessage) -> &'static str {
    match message {
        TypedMessage::Permit(_) => "ERC-2612 Permit",
        TypedMessage::PermitSingle(_) => "Permit2 PermitSingle",
        TypedMessage::Authorization(_) => "Morpho Authorization",
    }
}

pub fn format_plan_detail(planned: &PlannedBundle, tx: Option<&RawCall>) -> String {
    let bundle = &planned.bundle;
    let requirements = &bundle.requirements;
    let mut output = String::new();

    section(&mut output, "Transactions");
    if requirements.txs.is_empty() {
        output.push_str("  None\n");
    }
    for requirement in &requirements.txs {
        let line = match &requirement.kind {
            TransactionKind::Erc20Approve {
                token,
                spender,
                amount,
            } => format!("approve {} to {} on {}", amount, spender, token),
            TransactionKind::MorphoSetAuthorization {
                authorized,
                is_authorized,
            } => format!("setAuthorization {} = {}", authorized, is_authorized),
        };
        output.push_str(&format!("  {}\n", line));
    }
    output.push('\n');

    section(&mut output, "Signatures");
    if requirements.signatures.is_empty() {
        output.push_str("  None\n");
    }
    for requirement in &requirements.signatures {
        output.push_str(&format!(
            "  action {}: {} by {}\n",
            requirement.action,
            message_kind(&requirement.message),
            requirement.message.signer()
        ));
    }
    output.push('\n');

    section(&mut output, "Operations");
    output.push_str(&format!("{}\n\n", format_steps_table(&planned.steps)));

    section(&mut output, "Actions");
    output.push_str(&format!("{}\n\n", format_actions_table(bundle)));

    section(&mut output, "Multicall");
    output.push_str(&format!("  To:        {}\n", bundle.addresses.bundler3));
    output.push_str(&format!("  Value:     {} wei\n", bundle.value));
    match tx {
        Some(tx) => output.push_str(&format!("  Calldata:  {}\n", tx.data)),
        None => output.push_str(&format!(
            "  Calldata:  {}\n",
            "unsigned, pass --private-key to sign".yellow()
        )),
    }

    output
}
