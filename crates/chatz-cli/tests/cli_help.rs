use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn test_help_lists_commands() {
    cargo_bin_cmd!("chatz")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("exec"))
        .stdout(predicate::str::contains("render"))
        .stdout(predicate::str::contains("history"))
        .stdout(predicate::str::contains("apis"));
}

#[test]
fn test_exec_requires_prompt() {
    cargo_bin_cmd!("chatz")
        .arg("exec")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--prompt"));
}
