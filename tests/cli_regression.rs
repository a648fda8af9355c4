//! Regression tests for the `peglint` binary.
//! Requires: assert_cmd, predicates crates in [dev-dependencies].

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;

fn write_temp(name: &str, content: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("peglint_{}_{name}", std::process::id()));
    fs::write(&path, content).expect("temp file should be writable");
    path
}

#[test]
fn valid_grammar_exits_zero() {
    let grammar = write_temp("valid.peg", "Start <- 'a'\n");

    let mut cmd = Command::cargo_bin("peglint").expect("binary builds");
    cmd.arg(&grammar);
    cmd.assert().success();

    let _ = fs::remove_file(grammar);
}

#[test]
fn grammar_with_dangling_reference_exits_one() {
    let grammar = write_temp("dangling.peg", "Start <- Missing\n");

    let mut cmd = Command::cargo_bin("peglint").expect("binary builds");
    cmd.arg(&grammar);
    cmd.assert()
        .failure()
        .stderr(contains("undefined rule").or(contains("Missing")));

    let _ = fs::remove_file(grammar);
}

#[test]
fn source_that_matches_exits_zero() {
    let grammar = write_temp("match.peg", "Start <- [a-z]+\n");
    let source = write_temp("match.src", "hello");

    let mut cmd = Command::cargo_bin("peglint").expect("binary builds");
    cmd.arg(&grammar).arg(&source);
    cmd.assert().success();

    let _ = fs::remove_file(grammar);
    let _ = fs::remove_file(source);
}

#[test]
fn source_that_fails_reports_a_diagnostic() {
    let grammar = write_temp("fail.peg", "Start <- 'hello'\n");
    let source = write_temp("fail.src", "help");

    let mut cmd = Command::cargo_bin("peglint").expect("binary builds");
    cmd.arg(&grammar).arg(&source);
    cmd.assert().failure().stderr(contains("expected"));

    let _ = fs::remove_file(grammar);
    let _ = fs::remove_file(source);
}

#[test]
fn trace_flag_prints_the_dispatch_table() {
    let grammar = write_temp("trace.peg", "Start <- 'ab'\n");
    let source = write_temp("trace.src", "ab");

    let mut cmd = Command::cargo_bin("peglint").expect("binary builds");
    cmd.arg("--trace").arg(&grammar).arg(&source);
    cmd.assert()
        .success()
        .stderr(contains("pos:lev").and(contains("LiteralString")));

    let _ = fs::remove_file(grammar);
    let _ = fs::remove_file(source);
}
