/*
 * Integration tests for the linepool CLI.
 *
 * Scripts size buffers with `linepool size` and smoke-test a geometry with
 * `linepool probe`, so the exit codes and the --json field names are part
 * of the contract and are checked here.
 */

use assert_cmd::Command;
use predicates::prelude::*;

#[allow(deprecated)]
fn linepool_cmd() -> Command {
    Command::cargo_bin("linepool").unwrap()
}

/* =========================================================================
 * SIZE - layout arithmetic
 * ========================================================================= */

#[test]
fn test_size_text() {
    /* 76B blocks on 128B lines: one line each, plus one line of header */
    linepool_cmd()
        .args(["size", "76", "8"])
        .assert()
        .success()
        .stdout(predicate::str::contains("required bytes: 1152"))
        .stdout(predicate::str::contains("8 x 76B blocks (stride 128B, line 128B)"));
}

#[test]
fn test_size_json() {
    linepool_cmd()
        .args(["size", "256", "4096", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""block_size":256"#))
        .stdout(predicate::str::contains(r#""blocks_in_chunk":4096"#))
        .stdout(predicate::str::contains(r#""cache_line_size":128"#))
        .stdout(predicate::str::contains(r#""stride":256"#))
        .stdout(predicate::str::contains(r#""required_bytes":1048704"#));
}

#[test]
fn test_size_custom_cache_line() {
    linepool_cmd()
        .args(["size", "100", "2", "-c", "64", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""cache_line_size":64"#))
        .stdout(predicate::str::contains(r#""stride":128"#));

    linepool_cmd()
        .args(["size", "--cache-line=32", "1", "1", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""cache_line_size":32"#));
}

#[test]
fn test_size_huge_geometry_does_not_allocate() {
    /* pure arithmetic: 4 GiB blocks times u32::MAX would never fit in memory */
    linepool_cmd()
        .args(["size", "4294967295", "4294967295", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""blocks_in_chunk":4294967295"#));
}

/* =========================================================================
 * PROBE - build, fill, verify, drain
 * ========================================================================= */

#[test]
fn test_probe_ok() {
    linepool_cmd()
        .args(["probe", "256", "4096"])
        .assert()
        .success()
        .stdout(predicate::str::contains("probe ok: 4096 blocks"))
        .stdout(predicate::str::contains("allocated 4096 total"));
}

#[test]
fn test_probe_json() {
    linepool_cmd()
        .args(["probe", "76", "8", "--json"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains(r#""status":"ok""#))
        .stdout(predicate::str::contains(r#""total_allocated_count":8"#))
        .stdout(predicate::str::contains(r#""alloc_worst_retry_count":0"#))
        .stdout(predicate::str::contains(r#""free_worst_retry_count":0"#))
        .stdout(predicate::str::contains(r#""lost_blocks":0"#))
        .stdout(predicate::str::contains(r#""exit_code":0"#));
}

#[test]
fn test_probe_verbose_lists_every_block() {
    let out = linepool_cmd()
        .args(["probe", "64", "5", "-v", "-c", "64"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(out).unwrap();
    let blocks = text.lines().filter(|l| l.starts_with("block ")).count();
    assert_eq!(blocks, 5);
    assert!(text.contains("0x"), "addresses should print in hex: {text}");
}

#[test]
fn test_probe_single_block() {
    linepool_cmd()
        .args(["probe", "1", "1", "-c", "8"])
        .assert()
        .success();
}

/* =========================================================================
 * ERRORS - bad geometry and bad arguments exit 2
 * ========================================================================= */

#[test]
fn test_cache_line_not_power_of_two() {
    linepool_cmd()
        .args(["size", "64", "4", "-c", "96"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not a power of two"));
}

#[test]
fn test_cache_line_too_small() {
    linepool_cmd()
        .args(["probe", "64", "4", "-c", "4"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("below the minimum"));
}

#[test]
fn test_zero_block_size_json_error() {
    linepool_cmd()
        .args(["size", "0", "4", "--json"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains(r#""status":"error""#))
        .stdout(predicate::str::contains("block size must be positive"));
}

#[test]
fn test_zero_block_count() {
    linepool_cmd()
        .args(["probe", "64", "0"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("block count must be positive"));
}

#[test]
fn test_missing_command() {
    linepool_cmd()
        .assert()
        .code(2)
        .stderr(predicate::str::contains("missing command"))
        .stderr(predicate::str::contains("usage:"));
}

#[test]
fn test_unknown_command() {
    linepool_cmd()
        .args(["grow", "1", "2"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown command 'grow'"));
}

#[test]
fn test_missing_operand() {
    linepool_cmd()
        .args(["size", "64"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("missing COUNT"));
}

#[test]
fn test_bad_number() {
    linepool_cmd()
        .args(["size", "64", "lots"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("'lots' is not a valid"));
}

#[test]
fn test_verbose_rejected_for_size() {
    linepool_cmd()
        .args(["size", "64", "4", "-v"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown option '-v'"));
}

#[test]
fn test_streams_are_separated() {
    /* reports on stdout only, diagnostics on stderr only */
    linepool_cmd()
        .args(["size", "76", "8"])
        .assert()
        .success()
        .stdout(predicate::str::ends_with("1152\n"))
        .stderr(predicate::str::is_empty());

    linepool_cmd()
        .args(["size", "64", "4", "-c", "96"])
        .assert()
        .code(2)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::starts_with("linepool: invalid descriptor"));
}

/* =========================================================================
 * HELP / VERSION
 * ========================================================================= */

#[test]
fn test_help() {
    linepool_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("linepool size"))
        .stdout(predicate::str::contains("linepool probe"));
}

#[test]
fn test_version() {
    linepool_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("linepool "));
}
