// CLI integration tests for table and dataset flows.
use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_packrec");
    let mut command = Command::new(exe);
    command.env_remove("PACKREC_DIR").env_remove("RUST_LOG");
    command
}

fn run(dir: &Path, args: &[&str]) -> Output {
    cmd()
        .arg("--dir")
        .arg(dir)
        .args(args)
        .output()
        .expect("spawn packrec")
}

fn parse_json(output: &[u8]) -> Value {
    let text = String::from_utf8_lossy(output);
    let line = text.lines().next().expect("json line");
    serde_json::from_str(line).expect("valid json")
}

fn ok_json(dir: &Path, args: &[&str]) -> Value {
    let output = run(dir, args);
    assert!(
        output.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    parse_json(&output.stdout)
}

#[test]
fn table_create_append_read_flow() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path().join("store");

    let created = ok_json(&dir, &["table", "create", "ticks", "--record-size", "4"]);
    assert_eq!(created["table"], "ticks");
    assert_eq!(created["chunk_size"], 512);
    assert!(created["path"].as_str().unwrap().ends_with("ticks.rec"));

    let appended = ok_json(&dir, &["table", "append", "ticks", "--as", "u32", "1", "2", "3", "4"]);
    assert_eq!(appended["appended"], 4);
    assert_eq!(appended["records"], 4);

    let window = ok_json(
        &dir,
        &["table", "read", "ticks", "--as", "u32", "--start", "1", "--count", "2"],
    );
    assert_eq!(window["records"], serde_json::json!([2, 3]));

    let rest = ok_json(&dir, &["table", "read", "ticks", "--as", "u32", "--start", "2"]);
    assert_eq!(rest["records"], serde_json::json!([3, 4]));

    let info = ok_json(&dir, &["table", "info", "ticks"]);
    assert_eq!(info["record_size"], 4);
    assert_eq!(info["records"], 4);
    assert!(info["compression"].is_null());
}

#[test]
fn negative_and_float_values_round_trip() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path();
    ok_json(dir, &["table", "create", "deltas", "--record-size", "8", "--compression", "3"]);
    ok_json(dir, &["table", "append", "deltas", "--as", "i64", "-5", "7"]);
    let read = ok_json(dir, &["table", "read", "deltas", "--as", "i64"]);
    assert_eq!(read["records"], serde_json::json!([-5, 7]));
    let floats = ok_json(dir, &["table", "read", "deltas", "--as", "f64", "--count", "0"]);
    assert_eq!(floats["records"], serde_json::json!([]));
    let info = ok_json(dir, &["table", "info", "deltas"]);
    assert_eq!(info["compression"], 3);
}

#[test]
fn dataset_text_flow() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path();
    let created = ok_json(
        dir,
        &["dataset", "create", "names", "--record-size", "4", "--extent", "2"],
    );
    assert_eq!(created["extent"], 2);

    let fresh = ok_json(dir, &["dataset", "read", "names", "--as", "text"]);
    assert_eq!(fresh["records"], serde_json::json!(["", ""]));

    let written = ok_json(dir, &["dataset", "write", "names", "--as", "text", "abc", "de"]);
    assert_eq!(written["written"], 2);
    let read = ok_json(dir, &["dataset", "read", "names", "--as", "text"]);
    assert_eq!(read["records"], serde_json::json!(["abc", "de"]));
}

#[test]
fn errors_are_json_with_exit_codes() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path();

    let missing = run(dir, &["table", "info", "nope"]);
    assert_eq!(missing.status.code(), Some(3));
    let err = parse_json(&missing.stderr);
    assert_eq!(err["error"]["kind"], "NotFound");

    ok_json(dir, &["table", "create", "t", "--record-size", "4"]);
    let duplicate = run(dir, &["table", "create", "t", "--record-size", "4"]);
    assert_eq!(duplicate.status.code(), Some(4));
    assert_eq!(parse_json(&duplicate.stderr)["error"]["kind"], "AlreadyExists");

    let wrong_width = run(dir, &["table", "append", "t", "--as", "u8", "1"]);
    assert_eq!(wrong_width.status.code(), Some(2));
    let err = parse_json(&wrong_width.stderr);
    assert_eq!(err["error"]["kind"], "Usage");
    assert!(err["error"]["hint"].is_string());

    let past_end = run(dir, &["table", "read", "t", "--as", "u32", "--count", "1"]);
    assert_eq!(past_end.status.code(), Some(13));
    assert_eq!(parse_json(&past_end.stderr)["error"]["kind"], "Backend");

    let huge = "4611686018427387904";
    ok_json(dir, &["table", "append", "t", "--as", "u32", "1", "2"]);
    for kind in ["u32", "text"] {
        let oversized = run(dir, &["table", "read", "t", "--as", kind, "--count", huge]);
        assert_eq!(oversized.status.code(), Some(13));
        let err = parse_json(&oversized.stderr);
        assert_eq!(err["error"]["kind"], "Backend");
        assert!(!String::from_utf8_lossy(&oversized.stderr).contains("dropped without close"));
    }

    let past_start = run(dir, &["table", "read", "t", "--as", "u32", "--start", "10"]);
    assert_eq!(past_start.status.code(), Some(13));
    assert_eq!(parse_json(&past_start.stderr)["error"]["kind"], "Backend");

    let bad_name = run(dir, &["table", "create", "a/b", "--record-size", "4"]);
    assert_eq!(bad_name.status.code(), Some(2));

    ok_json(dir, &["dataset", "create", "d", "--record-size", "4", "--extent", "3"]);
    let short = run(dir, &["dataset", "write", "d", "--as", "u32", "1", "2"]);
    assert_eq!(short.status.code(), Some(10));
    let err = parse_json(&short.stderr);
    assert_eq!(err["error"]["kind"], "InsufficientCapacity");
    assert_eq!(err["error"]["available"], 2);
    assert_eq!(err["error"]["requested"], 3);

    let kind_mismatch = run(dir, &["dataset", "read", "t", "--as", "u32"]);
    assert_eq!(kind_mismatch.status.code(), Some(11));
}

#[test]
fn store_dir_falls_back_to_env() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = cmd()
        .env("PACKREC_DIR", temp.path())
        .args(["table", "create", "envtable", "--record-size", "2"])
        .output()
        .expect("spawn packrec");
    assert!(output.status.success());
    assert!(temp.path().join("envtable.rec").exists());
}
