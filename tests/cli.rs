use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn docchat_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("docchat");
    path
}

/// Offline setup: no language model, no vector index, instructions cached
/// inside the temp dir.
fn setup_test_env(extra: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[server]
bind = "127.0.0.1:8099"

[llm]
provider = "disabled"

[index]
provider = "disabled"

[instructions]
cache_path = "{}/data/system_prompt.json"
{}
"#,
        root.display(),
        extra
    );

    let config_path = config_dir.join("docchat.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_docchat(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docchat_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docchat binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_prompt_show_defaults_to_baseline() {
    let (_tmp, config_path) = setup_test_env("");

    let (stdout, stderr, success) = run_docchat(&config_path, &["prompt", "show"]);
    assert!(success, "prompt show failed: {}", stderr);
    assert_eq!(stdout.trim(), "You are a helpful AI assistant.");
}

#[test]
fn test_prompt_set_persists_across_runs() {
    let (tmp, config_path) = setup_test_env("");

    let (stdout, stderr, success) =
        run_docchat(&config_path, &["prompt", "set", "You are a GTM assistant."]);
    assert!(success, "prompt set failed: {}", stderr);
    assert!(stdout.contains("persisted: true"), "stdout: {}", stdout);

    let cache = tmp.path().join("data/system_prompt.json");
    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&cache).unwrap()).unwrap();
    assert_eq!(json["system_prompt"], "You are a GTM assistant.");

    // A fresh process reads the local copy.
    let (stdout, _, success) = run_docchat(&config_path, &["prompt", "show"]);
    assert!(success);
    assert_eq!(stdout.trim(), "You are a GTM assistant.");
}

#[test]
fn test_prompt_set_rejects_blank() {
    let (tmp, config_path) = setup_test_env("");

    let (_, stderr, success) = run_docchat(&config_path, &["prompt", "set", "   "]);
    assert!(!success);
    assert!(stderr.contains("System prompt cannot be empty"), "stderr: {}", stderr);
    assert!(!tmp.path().join("data/system_prompt.json").exists());
}

#[test]
fn test_prompt_sync_without_remote_uses_baseline() {
    let (_tmp, config_path) = setup_test_env("baseline = \"Be brief.\"");

    let (stdout, stderr, success) = run_docchat(&config_path, &["prompt", "sync"]);
    assert!(success, "prompt sync failed: {}", stderr);
    assert!(stdout.contains("source: baseline"), "stdout: {}", stdout);
    assert!(stdout.contains("Be brief."));
}

#[test]
fn test_ask_without_model_apologizes() {
    let (_tmp, config_path) = setup_test_env("");

    let (stdout, stderr, success) = run_docchat(&config_path, &["ask", "What does Acme sell?"]);
    assert!(success, "ask failed: {}", stderr);
    assert!(
        stdout.contains("I'm sorry, I couldn't generate a response right now."),
        "stdout: {}",
        stdout
    );
    assert!(!stdout.contains("indexed documents"));
}

#[test]
fn test_ask_uses_configured_apology_and_history() {
    let (tmp, config_path) = setup_test_env("");
    let content = fs::read_to_string(&config_path).unwrap();
    fs::write(
        &config_path,
        format!("{}\n[conversation]\napology = \"Service busy.\"\n", content),
    )
    .unwrap();

    let history = tmp.path().join("history.json");
    fs::write(
        &history,
        r#"[{"role": "user", "content": "My company is Acme"},
            {"role": "bot", "content": "Nice to meet you."}]"#,
    )
    .unwrap();

    let (stdout, stderr, success) = run_docchat(
        &config_path,
        &["ask", "What do they sell?", "--history", history.to_str().unwrap()],
    );
    assert!(success, "ask failed: {}", stderr);
    assert_eq!(stdout.trim(), "Service busy.");
}

#[test]
fn test_ingest_rejected_without_index() {
    let (tmp, config_path) = setup_test_env("");
    let file = tmp.path().join("acme.txt");
    fs::write(&file, "Acme sells widgets.").unwrap();

    let (_, stderr, success) = run_docchat(&config_path, &["ingest", file.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("Vector index is not configured"), "stderr: {}", stderr);
}

#[test]
fn test_title_without_model_fails() {
    let (_tmp, config_path) = setup_test_env("");

    let (_, stderr, success) = run_docchat(&config_path, &["title", "Tell me about Acme"]);
    assert!(!success);
    assert!(stderr.contains("title call failed"), "stderr: {}", stderr);
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_tmp, config_path) = setup_test_env("");
    let content = fs::read_to_string(&config_path).unwrap();
    fs::write(
        &config_path,
        format!("{}\n[retrieval]\nk = 10\nfetch_k = 5\n", content),
    )
    .unwrap();

    let (_, stderr, success) = run_docchat(&config_path, &["prompt", "show"]);
    assert!(!success);
    assert!(stderr.contains("fetch_k"), "stderr: {}", stderr);
}

#[test]
fn test_completions_need_no_config() {
    let (stdout, stderr, success) = run_docchat(Path::new("/nonexistent/docchat.toml"), &["completions", "bash"]);
    assert!(success, "completions failed: {}", stderr);
    assert!(stdout.contains("docchat"));
}
