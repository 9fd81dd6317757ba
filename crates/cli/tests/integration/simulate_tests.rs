//! Integration tests for the simulate command.

use predicates::prelude::*;

use super::helpers::{amount, fixture, json_output, morpho_cmd, morpho_cmd_with_state, USER};

#[test]
fn test_simulate_table_output() {
    morpho_cmd_with_state()
        .args(["simulate", &fixture("supply")])
        .assert()
        .success()
        .stdout(predicate::str::contains("Blue_Supply"))
        .stdout(predicate::str::contains("1000000000"))
        // 1000 USDC mint 1000e12 shares at the initial share price
        .stdout(predicate::str::contains("1000000000000000"));
}

#[test]
fn test_simulate_json_output() {
    let report = json_output(morpho_cmd_with_state().args(["simulate", &fixture("supply")]));

    let steps = report["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0]["operation"]["type"], "Blue_Supply");

    let market = &report["finalState"]["markets"][0];
    assert_eq!(amount(&market["total_supply_assets"]), 11_750_000_000);

    let holding = report["finalState"]["holdings"]
        .as_array()
        .unwrap()
        .iter()
        .find(|holding| {
            holding["user"] == USER
                && holding["token"] == "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"
        })
        .unwrap();
    assert_eq!(amount(&holding["balance"]), 9_000_000_000);
}

#[test]
fn test_simulate_reports_failing_operation() {
    morpho_cmd_with_state()
        .args(["simulate", &fixture("overdraw")])
        .assert()
        .failure()
        // the first supply still shows
        .stdout(predicate::str::contains("Blue_Supply"))
        .stderr(predicate::str::contains("Simulation failed"))
        .stderr(predicate::str::contains("operation 1 failed"));
}

#[test]
fn test_simulate_state_flag_overrides_env() {
    morpho_cmd()
        .env("MORPHO_STATE", "/nonexistent/state.json")
        .args(["simulate", &fixture("supply"), "--state", &fixture("state")])
        .assert()
        .success();
}

#[test]
fn test_simulate_missing_state_file() {
    morpho_cmd()
        .args(["simulate", &fixture("supply"), "--state", "/nonexistent/state.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read state file"));
}

#[test]
fn test_simulate_wrong_block() {
    morpho_cmd_with_state()
        .args(["simulate", &fixture("supply"), "--block", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Block 1 unavailable"));
}

#[test]
fn test_simulate_invalid_operations() {
    morpho_cmd_with_state()
        .args(["simulate", &fixture("state")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse operations file"));
}
