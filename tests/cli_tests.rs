//! CLI integration tests
//!
//! Tests the command-line interface using assert_cmd

mod common;

use std::fs;

use predicates::prelude::*;

use common::CliEnv;

// ─────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_help_flag() {
    CliEnv::new()
        .cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("generate"))
        .stdout(predicate::str::contains("persona"))
        .stdout(predicate::str::contains("health"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_command() {
    CliEnv::new()
        .cmd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ofsm-orchestrator"))
        .stdout(predicate::str::contains("Build Information"))
        .stdout(predicate::str::contains("Git Hash"));
}

#[test]
fn test_unknown_command() {
    CliEnv::new()
        .cmd()
        .arg("unknown-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

// ─────────────────────────────────────────────────────────────────
// Config Command Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_config_show_default() {
    CliEnv::new()
        .cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[pool]"))
        .stdout(predicate::str::contains("[generation]"))
        .stdout(predicate::str::contains("[backend]"))
        .stdout(predicate::str::contains("[logging]"));
}

#[test]
fn test_config_validate_default() {
    CliEnv::new()
        .cmd()
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));
}

#[test]
fn test_config_validate_nonexistent_file() {
    CliEnv::new()
        .cmd()
        .args(["config", "validate", "--config", "/nonexistent/path/orchestrator.toml"])
        .assert()
        .failure()
        .code(10)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_config_init_then_validate() {
    let env = CliEnv::new();
    let path = env.home.path().join("conf").join("orchestrator.toml");
    let path_str = path.to_str().unwrap();

    env.cmd()
        .args(["config", "init", "--path", path_str])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration written"));
    assert!(path.exists());

    env.cmd()
        .args(["config", "validate", "--config", path_str])
        .assert()
        .success();

    // Refuses to overwrite without --force
    env.cmd()
        .args(["config", "init", "--path", path_str])
        .assert()
        .failure();
    env.cmd()
        .args(["config", "init", "--path", path_str, "--force"])
        .assert()
        .success();
}

#[test]
fn test_env_override_rejected_by_validation() {
    CliEnv::new()
        .cmd()
        .env("OFSM_DEVICE_COUNT", "0")
        .args(["config", "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("pool.device_count"));
}

// ─────────────────────────────────────────────────────────────────
// Persona Command Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_persona_list_seeds_defaults() {
    let env = CliEnv::new();
    env.cmd()
        .args(["persona", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0: Alex Tech"));
    assert!(env.persona_store().exists());
}

#[test]
fn test_persona_add_update_delete() {
    let env = CliEnv::new();

    env.cmd()
        .args(["persona", "add", "Riley", "Short and punchy"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added persona Riley"));

    env.cmd()
        .args(["persona", "add", "Riley", "Again"])
        .assert()
        .failure()
        .code(30);

    let stored = fs::read_to_string(env.persona_store()).unwrap();
    assert!(stored.contains("Short and punchy"));

    env.cmd()
        .args(["persona", "update", "0", "Alex Tech", "Terse"])
        .assert()
        .success();

    env.cmd()
        .args(["persona", "delete", "99"])
        .assert()
        .failure()
        .code(30);

    env.cmd()
        .args(["persona", "delete", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted persona Alex Tech"));

    env.cmd()
        .args(["persona", "list", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Riley"))
        .stdout(predicate::str::contains("Alex Tech").not());
}

#[test]
fn test_persona_store_with_duplicate_names_rejected() {
    let env = CliEnv::new();
    fs::write(
        env.persona_store(),
        r#"[{"name": "Dup", "style": "a"}, {"name": "Dup", "style": "b"}]"#,
    )
    .unwrap();

    env.cmd()
        .args(["persona", "list"])
        .assert()
        .failure()
        .code(30)
        .stderr(predicate::str::contains("duplicate name 'Dup'"));

    // The bad file is left for the operator to fix
    let stored = fs::read_to_string(env.persona_store()).unwrap();
    assert!(stored.contains("\"b\""));
}

// ─────────────────────────────────────────────────────────────────
// Generate Command Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_generate_posts_on_mock() {
    CliEnv::new()
        .mock_cmd()
        .args(["generate", "posts", "home espresso", "--count", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[1]"))
        .stdout(predicate::str::contains("[3]"))
        .stderr(predicate::str::contains("3 of 3 succeeded"));
}

#[test]
fn test_generate_posts_json() {
    let output = CliEnv::new()
        .mock_cmd()
        .args(["generate", "posts", "home espresso", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let results = report["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r["success"] == true));
}

#[test]
fn test_generate_comments_for_named_personas() {
    CliEnv::new()
        .mock_cmd()
        .args([
            "generate",
            "comments",
            "Just adopted a rescue greyhound",
            "--persona",
            "Charlie",
            "--persona",
            "Sam Casual",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("[1] Charlie"))
        .stdout(predicate::str::contains("[2] Sam Casual"));
}

#[test]
fn test_generate_comments_unknown_persona() {
    CliEnv::new()
        .mock_cmd()
        .args(["generate", "comments", "Some post", "--persona", "Nobody"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Nobody"));
}

#[test]
fn test_health_on_mock() {
    CliEnv::new()
        .mock_cmd()
        .env("OFSM_DEVICE_COUNT", "3")
        .arg("health")
        .assert()
        .success()
        .stdout(predicate::str::contains("device 0: ok"))
        .stdout(predicate::str::contains("device 2: ok"));
}
