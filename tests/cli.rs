//! CLI argument and job-input tests. No engine is ever reached.
//!
//! Input failures surface as `{"error": ...}` lines on stdout with a zero exit;
//! only startup failures exit non-zero.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Engine address nothing listens on.
const DEAD_HOST: &str = "127.0.0.1:9";

/// Runs the binary against a scratch engine dir with user config and overrides cleared.
fn cmd(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("comfy-relay").unwrap();
    cmd.env("COMFY_RELAY_CONFIG", dir.path().join("absent.toml"))
        .env("COMFY_DIR", dir.path())
        .env("COMFY_HOST", DEAD_HOST)
        .env_remove("COMFY_RELAY_REPLAY")
        .env_remove("COMFY_RELAY_REC")
        .env_remove("MAX_IMAGE_SIZE_MB")
        .env_remove("COMFY_POLL_INTERVAL_MS")
        .env_remove("COMFY_POLL_TIMEOUT_SECS")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn missing_prompt_is_an_error_response() {
    let dir = tempfile::tempdir().unwrap();
    cmd(&dir)
        .args(["--test-input", r#"{"input": {"image": "aGVsbG8="}}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            r#"{"error":"Invalid input: Missing required 'prompt' parameter"}"#,
        ));
}

#[test]
fn malformed_job_is_an_error_response() {
    let dir = tempfile::tempdir().unwrap();
    cmd(&dir)
        .args(["--test-input", "{not json"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with(r#"{"error":"Invalid input: malformed job"#));
}

#[test]
fn numeric_job_id_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    cmd(&dir)
        .args(["--test-input", r#"{"id": 7, "input": {"image": "aGVsbG8="}}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("Missing required 'prompt' parameter"))
        .stdout(predicate::str::contains("malformed").not());
}

#[test]
fn undecodable_image_is_an_error_response() {
    let dir = tempfile::tempdir().unwrap();
    cmd(&dir)
        .args(["--test-input", r#"{"input": {"prompt": "a cat", "image": "data:image/png;base64,%%%"}}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("Failed to decode input image"));

    assert!(!dir.path().join("input").join("input.png").exists());
}

#[test]
fn oversized_image_respects_env_limit() {
    use base64::Engine as _;

    let dir = tempfile::tempdir().unwrap();
    let image = base64::engine::general_purpose::STANDARD.encode(vec![7u8; 2 * 1024 * 1024]);
    let job = serde_json::json!({"input": {"prompt": "a cat", "image": image}}).to_string();
    let job_path = dir.path().join("job.json");
    std::fs::write(&job_path, job).unwrap();

    cmd(&dir)
        .env("MAX_IMAGE_SIZE_MB", "1")
        .args(["-j", job_path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Input image rejected"));
}

#[test]
fn stdin_jobs_get_one_response_line_each() {
    let dir = tempfile::tempdir().unwrap();
    let jobs = concat!(
        r#"{"id": "a", "input": {}}"#,
        "\n\n",
        r#"{"id": "b", "input": {"prompt": "   ", "image": "aGVsbG8="}}"#,
        "\n",
    );

    let assert = cmd(&dir).write_stdin(jobs).assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2, "{stdout}");
    assert!(lines.iter().all(|l| l.starts_with(r#"{"error":"Invalid input"#)), "{stdout}");
}

#[test]
fn unreachable_engine_fails_the_job_not_the_process() {
    use base64::Engine as _;

    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "[workflow]\ncheck_nodes = false\n").unwrap();

    let mut png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    png.resize(256, 0);
    let image = base64::engine::general_purpose::STANDARD.encode(&png);
    let job = serde_json::json!({"input": {"prompt": "a cat", "image": image}}).to_string();

    cmd(&dir)
        .args(["--config", config.to_str().unwrap(), "--test-input", &job])
        .assert()
        .success()
        .stdout(predicate::str::contains("Failed to queue workflow"));

    assert_eq!(std::fs::read(dir.path().join("input").join("input.png")).unwrap(), png);
}

#[test]
fn missing_job_file_exits_with_error() {
    let dir = tempfile::tempdir().unwrap();
    cmd(&dir)
        .args(["--job-file", dir.path().join("nope.json").to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error: Config error: Failed to read job file"));
}

#[test]
fn invalid_config_exits_with_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "[polling\ninterval_ms = ").unwrap();

    cmd(&dir)
        .args(["--config", config.to_str().unwrap(), "--test-input", "{}"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config error"));
}

#[test]
fn launch_and_wait_ready_conflict() {
    let dir = tempfile::tempdir().unwrap();
    cmd(&dir)
        .args(["--launch-engine", "--wait-ready"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn unlaunchable_engine_exits_with_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(
        &config,
        "[engine]\ncommand = [\"/nonexistent/comfy-engine\"]\nstartup_timeout_secs = 1\n",
    )
    .unwrap();

    cmd(&dir)
        .args(["--config", config.to_str().unwrap(), "--launch-engine", "--test-input", "{}"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Engine startup failed"));
}
