//! End-to-end tests for the shardline binary
//!
//! These tests run the compiled CLI with the memory backend only.
//! Run with: cargo test -p shardline-cli --test cli_tests

use assert_cmd::Command;
use predicates::prelude::*;

const SHARDLINE_VARS: [&str; 11] = [
    "SHARDLINE_SHARD_COUNT",
    "SHARDLINE_CHUNK_SIZE",
    "SHARDLINE_CONCURRENCY",
    "SHARDLINE_DEADLINE_MS",
    "SHARDLINE_STRATEGY",
    "SHARDLINE_SHARD_URLS",
    "SHARDLINE_DB_MAX_CONNECTIONS",
    "SHARDLINE_DB_CONNECT_TIMEOUT",
    "LOG_LEVEL",
    "LOG_OUTPUT",
    "LOG_FORMAT",
];

/// Helper to build a command with a clean sharding environment
fn shardline() -> Command {
    let mut cmd = Command::cargo_bin("shardline").expect("Failed to find shardline binary");
    for var in SHARDLINE_VARS {
        cmd.env_remove(var);
    }
    cmd
}

fn json_stdout(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.output().expect("Failed to run shardline");
    serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
}

// ============================================================================
// Route Tests
// ============================================================================

#[test]
fn test_route_known_keys() {
    shardline()
        .args(["route", "3", "7728", "1024", "--shards", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ds_1"))
        .stdout(predicate::str::contains("ds_0"))
        .stdout(predicate::str::contains("1692966"));
}

#[test]
fn test_route_json_is_stable_across_runs() {
    let first = json_stdout(shardline().args(["route", "7,User7", "--shards", "3", "--format", "json"]));
    let second = json_stdout(shardline().args(["route", "7,User7", "--shards", "3", "--format", "json"]));

    assert_eq!(first, second);
    assert_eq!(first[0]["key"], "7,User7");
    assert!(first[0]["target"].as_str().unwrap().starts_with("ds_"));
}

#[test]
fn test_route_shard_count_from_environment() {
    let json = json_stdout(
        shardline()
            .env("SHARDLINE_SHARD_COUNT", "1")
            .args(["route", "polygenelubricants", "--format", "json"]),
    );
    assert_eq!(json[0]["target"], "ds_0");
    assert_eq!(json[0]["hash"], 2_147_483_648u64);
}

#[test]
fn test_route_rejects_zero_shards() {
    shardline()
        .args(["route", "3", "--shards", "0"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid shard count"));
}

#[test]
fn test_route_rejects_empty_key() {
    shardline()
        .args(["route", ",", "--shards", "2"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("empty composite key"));
}

// ============================================================================
// Load Tests
// ============================================================================

#[test]
fn test_load_memory_json_summary() {
    let json = json_stdout(shardline().args([
        "load",
        "--records",
        "2000",
        "--shards",
        "4",
        "--chunk-size",
        "100",
        "--format",
        "json",
    ]));

    assert_eq!(json["total_committed"], 2000);
    assert_eq!(json["complete"], true);
    assert_eq!(json["shards"].as_array().unwrap().len(), 4);
}

#[test]
fn test_load_table_output() {
    shardline()
        .args(["load", "--records", "500"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Committed 500 records across 2 shards"));
}

#[test]
fn test_load_injected_failure_exits_one() {
    shardline()
        .args([
            "load",
            "--records",
            "1000",
            "--fail-shard",
            "1",
            "--fail-chunk",
            "1",
        ])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("failed"))
        .stdout(predicate::str::contains("Chunk 1 failed during submit"));
}

#[test]
fn test_load_invalid_chunk_size_from_environment() {
    shardline()
        .env("SHARDLINE_CHUNK_SIZE", "0")
        .args(["load", "--records", "10"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid chunk size"));
}

#[test]
fn test_load_rejects_records_beyond_id_range() {
    shardline()
        .args(["load", "--records", "9223372036854775808"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("exceeds the largest user id"));
}

#[test]
fn test_load_postgres_rejects_malformed_pool_size() {
    shardline()
        .env("SHARDLINE_SHARD_URLS", "postgres://localhost/ds_0,postgres://localhost/ds_1")
        .env("SHARDLINE_DB_MAX_CONNECTIONS", "lots")
        .args(["load", "--records", "10", "--backend", "postgres"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("SHARDLINE_DB_MAX_CONNECTIONS"));
}

#[test]
fn test_load_postgres_requires_urls() {
    shardline()
        .args(["load", "--records", "10", "--backend", "postgres"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("SHARDLINE_SHARD_URLS"));
}

// ============================================================================
// General
// ============================================================================

#[test]
fn test_missing_subcommand() {
    shardline()
        .assert()
        .code(2)
        .stderr(predicate::str::contains("A subcommand is required"));
}

#[test]
fn test_malformed_log_level_is_usage_error() {
    shardline()
        .env("LOG_LEVEL", "loud")
        .args(["route", "3", "--shards", "2"])
        .assert()
        .code(2)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Invalid log level: 'loud'"));
}

#[test]
fn test_markdown_help() {
    shardline()
        .arg("--markdown-help")
        .assert()
        .success()
        .stdout(predicate::str::contains("shardline route"))
        .stdout(predicate::str::contains("shardline load"));
}
