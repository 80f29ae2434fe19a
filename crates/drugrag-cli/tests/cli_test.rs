//! Integration tests for the drugrag binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const ENV_VARS: &[&str] = &[
    "OPENAI_API_KEY",
    "OPENAI_BASE_URL",
    "EMBEDDING_MODEL",
    "DECOMPOSE_MODEL",
    "ANSWER_MODEL",
    "EMBEDDING_DIMS",
    "DRUGRAG_SNAPSHOT",
    "DRUGRAG_CONFIG",
    "LOG_LEVEL",
    "RUST_LOG",
];

/// Binary isolated from the caller's environment and `.env`
fn drugrag_cmd(workdir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("drugrag").unwrap();
    cmd.current_dir(workdir.path());
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd
}

/// Config pointing at a closed local port with retries disabled
fn write_config(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("config.yml");
    fs::write(
        &path,
        "llm_service:\n  url: http://127.0.0.1:9\n  embedding_dimensions: 2\n  timeout_secs: 2\nretry:\n  max_attempts: 1\n",
    )
    .unwrap();
    path
}

fn write_snapshot(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("index.json");
    fs::write(
        &path,
        r#"{
  "version": 1,
  "dimensions": 2,
  "embedding_model": "text-embedding-3-large",
  "chunks": [
    {"id": "DB00682#0", "text": "Warfarin is an anticoagulant.", "vector": [1.0, 0.0],
     "source": {"document_id": "DB00682", "title": "Warfarin"}, "range": {"start": 0, "end": 29}},
    {"id": "DB01050#0", "text": "Ibuprofen is an NSAID.", "vector": [0.0, 1.0],
     "source": {"document_id": "DB01050", "title": "Ibuprofen"}, "range": {"start": 0, "end": 22}}
  ]
}"#,
    )
    .unwrap();
    path
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    drugrag_cmd(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("query"))
        .stdout(predicate::str::contains("index"));
}

#[test]
fn test_status_reports_snapshot() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);
    let snapshot = write_snapshot(&dir);

    drugrag_cmd(&dir)
        .arg("--config")
        .arg(&config)
        .arg("status")
        .arg("--snapshot")
        .arg(&snapshot)
        .assert()
        .success()
        .stdout(predicate::str::contains("Chunks:          2"))
        .stdout(predicate::str::contains("Documents:       2"))
        .stdout(predicate::str::contains("text-embedding-3-large"));
}

#[test]
fn test_status_json() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);
    let snapshot = write_snapshot(&dir);

    let output = drugrag_cmd(&dir)
        .arg("--config")
        .arg(&config)
        .args(["--format", "json", "status", "--snapshot"])
        .arg(&snapshot)
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["chunk_count"], 2);
    assert_eq!(json["dimensions"], 2);
}

#[test]
fn test_status_without_snapshot_is_config_error() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    drugrag_cmd(&dir)
        .arg("--config")
        .arg(&config)
        .arg("status")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("no index snapshot configured"));
}

#[test]
fn test_missing_snapshot_file_is_not_found() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    drugrag_cmd(&dir)
        .arg("--config")
        .arg(&config)
        .args(["status", "--snapshot"])
        .arg(dir.path().join("absent.json"))
        .assert()
        .code(2);
}

#[test]
fn test_blank_query_is_invalid_input() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);
    let snapshot = write_snapshot(&dir);

    drugrag_cmd(&dir)
        .arg("--config")
        .arg(&config)
        .args(["query", "--snapshot"])
        .arg(&snapshot)
        .arg("   ")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("non-empty"));
}

#[test]
fn test_unreachable_provider_on_decomposition_is_upstream_error() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);
    let snapshot = write_snapshot(&dir);

    drugrag_cmd(&dir)
        .arg("--config")
        .arg(&config)
        .args(["query", "--snapshot"])
        .arg(&snapshot)
        .args(["ibuprofen", "and", "warfarin"])
        .assert()
        .code(4);
}

#[test]
fn test_unreachable_provider_on_atomic_query_degrades() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);
    let snapshot = write_snapshot(&dir);

    drugrag_cmd(&dir)
        .arg("--config")
        .arg(&config)
        .args(["query", "--snapshot"])
        .arg(&snapshot)
        .arg("What is warfarin?")
        .assert()
        .success()
        .stdout(predicate::str::contains("could not be answered"));
}

#[test]
fn test_index_requires_a_source() {
    let dir = TempDir::new().unwrap();
    drugrag_cmd(&dir)
        .args(["index", "--out"])
        .arg(dir.path().join("out.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("--csv"));
}

#[test]
fn test_index_rejects_empty_corpus() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);
    let corpus = dir.path().join("corpus");
    fs::create_dir(&corpus).unwrap();

    drugrag_cmd(&dir)
        .arg("--config")
        .arg(&config)
        .args(["index", "--dir"])
        .arg(&corpus)
        .arg("--out")
        .arg(dir.path().join("out.json"))
        .assert()
        .code(3)
        .stderr(predicate::str::contains("no text to index"));
}
