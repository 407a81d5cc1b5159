//! Binary-level checks that need no network.

use std::process::Command;

fn papertrack() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_papertrack"));
    cmd.env_remove("LLM_API_KEY").env_remove("S2_API_KEY");
    cmd
}

#[test]
fn missing_api_key_exits_with_total_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("papertrack.toml");
    std::fs::write(&config, "[search]\ncategory = \"cs.AI\"\n").unwrap();

    let out = papertrack()
        .args(["--config", config.to_str().unwrap(), "run"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("API key"));
}

#[test]
fn unreadable_config_exits_with_total_failure() {
    let dir = tempfile::tempdir().unwrap();
    let out = papertrack()
        .args(["--config", dir.path().join("nope.toml").to_str().unwrap(), "config"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn config_command_prints_settings() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("papertrack.toml");
    std::fs::write(&config, "[llm]\nmodel = \"local-model\"\n").unwrap();

    let out = papertrack()
        .args(["--config", config.to_str().unwrap(), "config"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("local-model"));
    assert!(stderr.contains("not set"));
}
