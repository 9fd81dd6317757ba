//! Integration tests for the plan command.

use predicates::prelude::*;

use super::helpers::{fixture, json_output, morpho_cmd_with_state, USER_PRIVATE_KEY};

const BUNDLER3: &str = "0x6566194141eefa99af43bb5aa71460ca2dc90245";

fn action_types(report: &serde_json::Value) -> Vec<String> {
    report["bundle"]["actions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|action| action["type"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn test_plan_table_output() {
    morpho_cmd_with_state()
        .args(["plan", &fixture("supply")])
        .assert()
        .success()
        .stdout(predicate::str::contains("ERC-2612 Permit"))
        .stdout(predicate::str::contains("erc20TransferFrom"))
        .stdout(predicate::str::contains("morphoSupply"))
        .stdout(predicate::str::contains("unsigned"));
}

#[test]
fn test_plan_permit_token_needs_one_signature() {
    let report = json_output(morpho_cmd_with_state().args(["plan", &fixture("supply")]));

    let requirements = &report["bundle"]["requirements"];
    assert_eq!(requirements["signatures"].as_array().unwrap().len(), 1);
    assert!(requirements["txs"].as_array().unwrap().is_empty());
    assert_eq!(
        action_types(&report),
        ["permit", "erc20TransferFrom", "morphoSupply", "erc20Transfer"]
    );
    assert!(report.get("tx").is_none());
}

#[test]
fn test_plan_signed_with_private_key() {
    let report = json_output(morpho_cmd_with_state().args([
        "plan",
        &fixture("supply"),
        "--private-key",
        USER_PRIVATE_KEY,
    ]));

    assert_eq!(report["tx"]["to"], BUNDLER3);
    assert!(report["tx"]["data"].as_str().unwrap().len() > 10);
    assert!(!report["bundle"]["actions"][0]["args"]["signature"].is_null());
}

#[test]
fn test_plan_private_key_from_env() {
    morpho_cmd_with_state()
        .env("PRIVATE_KEY", USER_PRIVATE_KEY)
        .args(["plan", &fixture("supply")])
        .assert()
        .success()
        .stdout(predicate::str::contains("unsigned").not());
}

#[test]
fn test_plan_borrow_with_permit2_collateral() {
    let report = json_output(morpho_cmd_with_state().args(["plan", &fixture("borrow")]));

    let requirements = &report["bundle"]["requirements"];
    let txs = requirements["txs"].as_array().unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0]["type"], "erc20Approve");
    assert_eq!(requirements["signatures"].as_array().unwrap().len(), 2);
    assert_eq!(
        action_types(&report),
        [
            "approvePermit2",
            "morphoSetAuthorizationWithSig",
            "permit2TransferFrom",
            "morphoSupplyCollateral",
            "morphoBorrow",
            "erc20Transfer"
        ]
    );
}

#[test]
fn test_plan_without_signatures() {
    let report = json_output(morpho_cmd_with_state().args([
        "plan",
        &fixture("borrow"),
        "--no-signature",
    ]));

    let requirements = &report["bundle"]["requirements"];
    assert!(requirements["signatures"].as_array().unwrap().is_empty());
    let kinds: Vec<&str> = requirements["txs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|tx| tx["type"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, ["erc20Approve", "morphoSetAuthorization"]);
    // nothing left to sign, so the multicall is ready
    assert_eq!(report["tx"]["to"], BUNDLER3);
}

#[test]
fn test_plan_rejects_mixed_senders() {
    morpho_cmd_with_state()
        .args(["plan", &fixture("mixed_senders")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to plan bundle"))
        .stderr(predicate::str::contains("Inputs must share one sender"));
}

#[test]
fn test_plan_wrong_signer() {
    morpho_cmd_with_state()
        .args([
            "plan",
            &fixture("supply"),
            "--private-key",
            "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be signed by"));
}
