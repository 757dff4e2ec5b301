use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn ragline_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("ragline");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_path = config_dir.join("ragline.toml");
    fs::write(
        &config_path,
        format!(
            r#"
[db]
path = "{}"

[retrieval]
default_top_n = 5

[embedding]
base_url = "http://127.0.0.1:9"

[vector_store]
url = "http://127.0.0.1:9"

[llm]
base_url = "http://127.0.0.1:9"
"#,
            root.join("data").join("ragline.sqlite").display()
        ),
    )
    .unwrap();

    (tmp, config_path)
}

fn run_ragline(config: &Path, args: &[&str]) -> Output {
    Command::new(ragline_binary())
        .arg("--config")
        .arg(config)
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to run ragline")
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn test_init_is_idempotent() {
    let (_tmp, config) = setup_test_env();

    let first = run_ragline(&config, &["init"]);
    assert!(first.status.success(), "init failed: {}", stderr_of(&first));
    assert!(stdout_of(&first).contains("Database initialized successfully."));

    let second = run_ragline(&config, &["init"]);
    assert!(second.status.success(), "re-init failed: {}", stderr_of(&second));
}

#[test]
fn test_workspace_and_chat_create() {
    let (_tmp, config) = setup_test_env();
    assert!(run_ragline(&config, &["init"]).status.success());

    let ws = run_ragline(
        &config,
        &["workspace", "create", "handbook", "--mode", "query"],
    );
    assert!(ws.status.success(), "workspace create failed: {}", stderr_of(&ws));
    let out = stdout_of(&ws);
    assert!(out.contains("workspace created"));
    assert!(out.contains("  id: 1"));
    assert!(out.contains("  mode: query"));
    assert!(out.contains("  top_n: 5"));

    let chat = run_ragline(&config, &["chat", "new", "1", "--title", "onboarding"]);
    assert!(chat.status.success(), "chat new failed: {}", stderr_of(&chat));
    let out = stdout_of(&chat);
    assert!(out.contains("chat created"));
    assert!(out.contains("  workspace: 1"));
}

#[test]
fn test_unknown_chat_mode_is_rejected() {
    let (_tmp, config) = setup_test_env();
    assert!(run_ragline(&config, &["init"]).status.success());

    let output = run_ragline(&config, &["workspace", "create", "w", "--mode", "chatty"]);
    assert!(!output.status.success());
    assert!(stderr_of(&output).contains("Unknown chat mode"));
}

#[test]
fn test_chat_in_missing_workspace_fails() {
    let (_tmp, config) = setup_test_env();
    assert!(run_ragline(&config, &["init"]).status.success());

    let output = run_ragline(&config, &["chat", "new", "42"]);
    assert!(!output.status.success());
    assert!(stderr_of(&output).contains("Workspace 42 not found"));
}

#[test]
fn test_ask_rejects_empty_message() {
    let (_tmp, config) = setup_test_env();
    assert!(run_ragline(&config, &["init"]).status.success());

    let output = run_ragline(&config, &["ask", "1", "   "]);
    assert!(!output.status.success());
    assert!(stderr_of(&output).contains("Message must not be empty"));
}

#[test]
fn test_invalid_config_fails() {
    let (tmp, _config) = setup_test_env();
    let bad = tmp.path().join("config").join("bad.toml");
    fs::write(
        &bad,
        r#"
[db]
path = "./data/ragline.sqlite"

[chunking]
target_chars = 100
overlap_chars = 100
"#,
    )
    .unwrap();

    let output = run_ragline(&bad, &["init"]);
    assert!(!output.status.success());
    assert!(stderr_of(&output).contains("overlap_chars"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let output = run_ragline(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!output.status.success());
    assert!(stderr_of(&output).contains("Failed to read config file"));
}
