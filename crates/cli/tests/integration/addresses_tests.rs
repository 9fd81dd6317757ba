//! Integration tests for the addresses command.

use predicates::prelude::*;

use super::helpers::{json_output, morpho_cmd};

#[test]
fn test_addresses_table_output() {
    morpho_cmd()
        .arg("addresses")
        .assert()
        .success()
        .stdout(predicate::str::contains("Morpho on mainnet"))
        .stdout(predicate::str::contains("Bundler3"))
        .stdout(predicate::str::contains("GeneralAdapter1"));
}

#[test]
fn test_addresses_json_output() {
    let addresses = json_output(morpho_cmd().args(["addresses", "--chain", "base"]));

    assert_eq!(
        addresses["bundler3"],
        "0x6bfd8137e702540e7a42b74178a4a49ba43920c4"
    );
    assert_eq!(
        addresses["morpho"],
        "0xbbbbbbbbbb9cc5e90e3b3af64bdaf62c37eeffcb"
    );
}

#[test]
fn test_addresses_format_from_env() {
    morpho_cmd()
        .env("MORPHO_FORMAT", "json")
        .args(["addresses", "--chain", "8453"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"general_adapter1\""));
}

#[test]
fn test_addresses_unknown_chain() {
    morpho_cmd()
        .args(["addresses", "--chain", "polygon"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown chain"));
}
