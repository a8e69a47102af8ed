//! CLI integration tests for publish-post

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Content directory with a description and no media, plus a config path
/// that does not exist so defaults apply
fn setup_test_env() -> (TempDir, std::path::PathBuf, std::path::PathBuf) {
    let temp_dir = TempDir::new().unwrap();

    let content_dir = temp_dir.path().join("launch-post");
    fs::create_dir_all(&content_dir).unwrap();
    fs::write(content_dir.join("description.txt"), "Hello from the test #rust").unwrap();

    let config_path = temp_dir.path().join("missing-config.toml");
    (temp_dir, content_dir, config_path)
}

fn publish_post(config_path: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("publish-post").unwrap();
    cmd.env("CONTENT_PUBLISHER_CONFIG", config_path)
        .env_remove("CONTENT_PUBLISHER_LOG_FORMAT")
        .env_remove("CONTENT_PUBLISHER_LOG_LEVEL");
    cmd
}

#[test]
fn test_help_lists_flags_and_exit_codes() {
    let (_temp_dir, _content_dir, config_path) = setup_test_env();

    publish_post(&config_path)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--dir"))
        .stdout(predicate::str::contains("--platforms"))
        .stdout(predicate::str::contains("EXIT CODES"));
}

#[test]
fn test_unknown_platform_reports_json_result() {
    let (_temp_dir, content_dir, config_path) = setup_test_env();

    let output = publish_post(&config_path)
        .arg("--dir")
        .arg(&content_dir)
        .args(["--platforms", "unknown-platform", "--format", "json"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("unknown-platform"))
        .get_output()
        .stdout
        .clone();

    let results: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let result = &results[0];
    assert_eq!(result["platform"], "unknown-platform");
    assert_eq!(result["success"], false);
    assert_eq!(result["trace"].as_array().unwrap().len(), 1);
    assert_eq!(result["trace"][0]["name"], "select_handler");
}

#[test]
fn test_unknown_platform_text_output_shows_trace() {
    let (_temp_dir, content_dir, config_path) = setup_test_env();

    publish_post(&config_path)
        .arg("--dir")
        .arg(&content_dir)
        .args(["--platforms", "myspace"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("myspace: FAILED"))
        .stdout(predicate::str::contains("select_handler"));
}

#[test]
fn test_missing_directory_is_invalid_input() {
    let (temp_dir, _content_dir, config_path) = setup_test_env();

    publish_post(&config_path)
        .arg("--dir")
        .arg(temp_dir.path().join("does-not-exist"))
        .args(["--platforms", "reddit"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_missing_description_is_invalid_input() {
    let (temp_dir, _content_dir, config_path) = setup_test_env();
    let empty_dir = temp_dir.path().join("empty");
    fs::create_dir_all(&empty_dir).unwrap();

    publish_post(&config_path)
        .arg("--dir")
        .arg(&empty_dir)
        .args(["--platforms", "reddit"])
        .assert()
        .code(3);
}

#[test]
fn test_endpoint_requires_single_platform() {
    let (_temp_dir, content_dir, config_path) = setup_test_env();

    publish_post(&config_path)
        .arg("--dir")
        .arg(&content_dir)
        .args(["--platforms", "reddit,x", "--endpoint", "http://127.0.0.1:1"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("single platform"));
}

#[test]
fn test_invalid_output_format_is_rejected() {
    let (_temp_dir, content_dir, config_path) = setup_test_env();

    publish_post(&config_path)
        .arg("--dir")
        .arg(&content_dir)
        .args(["--platforms", "reddit", "--format", "yaml"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Invalid output format"));
}

#[test]
fn test_invalid_orientation_is_a_usage_error() {
    let (_temp_dir, content_dir, config_path) = setup_test_env();

    publish_post(&config_path)
        .arg("--dir")
        .arg(&content_dir)
        .args(["--platforms", "reddit", "--orientation", "diagonal"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid orientation"));
}

#[test]
fn test_broken_config_file_fails_setup() {
    let (temp_dir, content_dir, _config_path) = setup_test_env();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "[retry]\nmax_attempts = 0\n").unwrap();

    publish_post(&config_path)
        .arg("--dir")
        .arg(&content_dir)
        .args(["--platforms", "reddit"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error:"));
}
