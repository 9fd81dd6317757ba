//! Test helper utilities for CLI integration tests.

#![expect(deprecated, reason = "Command::cargo_bin deprecation")]

use assert_cmd::Command;

/// Anvil's default account 0, which holds every fixture balance.
pub const USER: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

/// Anvil's default account 0 private key
pub const USER_PRIVATE_KEY: &str =
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// Path of a fixture file.
pub fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{}.json", env!("CARGO_MANIFEST_DIR"), name)
}

/// Create a CLI command isolated from the caller's environment.
pub fn morpho_cmd() -> Command {
    let mut cmd = Command::cargo_bin("morpho").unwrap();
    cmd.env_remove("MORPHO_STATE")
        .env_remove("MORPHO_FORMAT")
        .env_remove("PRIVATE_KEY")
        .env_remove("RUST_LOG");
    cmd
}

/// Create a CLI command reading the fixture state.
pub fn morpho_cmd_with_state() -> Command {
    let mut cmd = morpho_cmd();
    cmd.env("MORPHO_STATE", fixture("state"));
    cmd
}

/// Run a command expected to succeed and parse its stdout as JSON.
pub fn json_output(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.arg("--format").arg("json").assert().success();
    serde_json::from_slice(&output.get_output().stdout).unwrap()
}

/// Reads a serialized `U256`, hex or decimal.
pub fn amount(value: &serde_json::Value) -> u128 {
    let raw = value.as_str().unwrap();
    match raw.strip_prefix("0x") {
        Some(hex) => u128::from_str_radix(hex, 16).unwrap(),
        None => raw.parse().unwrap(),
    }
}
