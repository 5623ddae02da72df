use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;

fn fixture(name: &str, contents: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("evmir_cli_test_{name}_{}", std::process::id()));
    fs::write(&path, contents).expect("fixture written");
    path
}

const PROGRAM: &str = "
function main {
    main:
        %a = add 32, 64
        mstore 0, %a
        return 0, 32
}
";

#[test]
fn compiles_a_file_to_assembly() {
    let input = fixture("asm", PROGRAM);
    Command::cargo_bin("evmir")
        .unwrap()
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("MSTORE"))
        .stdout(predicate::str::contains("RETURN"));
    let _ = fs::remove_file(input);
}

#[test]
fn emits_optimized_ir_on_request() {
    let input = fixture("ir", PROGRAM);
    Command::cargo_bin("evmir")
        .unwrap()
        .arg(&input)
        .args(["--emit", "ir"])
        .assert()
        .success()
        .stdout(predicate::str::contains("function main"))
        .stdout(predicate::str::contains("96"));
    let _ = fs::remove_file(input);
}

#[test]
fn rejects_malformed_input_with_a_parse_error() {
    let input = fixture("bad", "function main {\n  main:\n    frobnicate 1\n}\n");
    Command::cargo_bin("evmir")
        .unwrap()
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
    let _ = fs::remove_file(input);
}

#[test]
fn missing_files_fail_cleanly() {
    Command::cargo_bin("evmir")
        .unwrap()
        .arg("/nonexistent/evmir_input.venom")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}
