use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn recall_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("recall");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/recall.sqlite"

[embedding]
provider = "hash"
dims = 128

[retrieval]
default_limit = 5

[retention]
max_age_days = 90

[logging]
level = "warn"
"#,
        root.display()
    );

    let config_path = config_dir.join("recall.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn write_messages(dir: &Path) -> PathBuf {
    let now = chrono::Utc::now();
    let recent = |mins: i64| (now - chrono::Duration::minutes(mins)).to_rfc3339();

    let lines = [
        serde_json::json!({
            "channel_id": "-100123",
            "channel_name": "Dog Owners",
            "text": "Our puppy feeding schedule is three small meals: morning, noon and evening.",
            "timestamp": recent(30),
            "sender_username": "rex"
        }),
        serde_json::json!({
            "channel_id": "-100123",
            "channel_name": "Dog Owners",
            "text": "The vet said vaccinations should be done before the first walk outside.",
            "timestamp": recent(20),
            "sender_name": "Maya"
        }),
        serde_json::json!({
            "channel_id": "-100123",
            "channel_name": "Dog Owners",
            "text": "Does anyone have a good feeding bowl recommendation?",
            "timestamp": recent(10)
        }),
        serde_json::json!({
            "channel_id": "-100999",
            "channel_name": "Archive",
            "text": "Ancient message about the old dog park schedule.",
            "timestamp": "2020-01-01T00:00:00Z"
        }),
    ];

    let mut content = String::new();
    for line in &lines {
        content.push_str(&line.to_string());
        content.push('\n');
    }
    content.push_str("this line is not json\n");

    let path = dir.join("messages.jsonl");
    fs::write(&path, content).unwrap();
    path
}

fn run_recall(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = recall_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run recall binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn init_and_ingest(config_path: &Path, tmp: &TempDir) {
    let (_, stderr, success) = run_recall(config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    let file = write_messages(tmp.path());
    let (_, stderr, success) = run_recall(config_path, &["ingest", file.to_str().unwrap()]);
    assert!(success, "ingest failed: {}", stderr);
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_recall(&config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("initialized successfully"));
    assert!(tmp.path().join("data/recall.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, s1) = run_recall(&config_path, &["init"]);
    let (_, _, s2) = run_recall(&config_path, &["init"]);
    assert!(s1 && s2);
}

#[test]
fn test_ingest_summary_and_dedup() {
    let (tmp, config_path) = setup_test_env();
    run_recall(&config_path, &["init"]);
    let file = write_messages(tmp.path());

    let (stdout, stderr, success) =
        run_recall(&config_path, &["ingest", file.to_str().unwrap()]);
    assert!(success, "ingest failed: {}", stderr);
    assert!(stdout.contains("stored: 4"), "stdout: {}", stdout);
    assert!(stdout.contains("rejected: 1"), "stdout: {}", stdout);

    let (stdout, _, success) = run_recall(&config_path, &["ingest", file.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("stored: 0"), "stdout: {}", stdout);
    assert!(stdout.contains("duplicates: 4"), "stdout: {}", stdout);
}

#[test]
fn test_ingest_requires_provider() {
    let (tmp, config_path) = setup_test_env();
    fs::write(
        &config_path,
        format!(
            "[db]\npath = \"{}/data/recall.sqlite\"\n",
            tmp.path().display()
        ),
    )
    .unwrap();
    run_recall(&config_path, &["init"]);
    let file = write_messages(tmp.path());

    let (_, stderr, success) = run_recall(&config_path, &["ingest", file.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("requires embeddings"), "stderr: {}", stderr);
}

#[test]
fn test_search_ranks_exact_phrase_first() {
    let (tmp, config_path) = setup_test_env();
    init_and_ingest(&config_path, &tmp);

    let (stdout, stderr, success) = run_recall(
        &config_path,
        &["search", "feeding schedule", "--json", "--explain"],
    );
    assert!(success, "search failed: {}", stderr);

    let results: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let results = results.as_array().unwrap();
    assert!(!results.is_empty());
    assert!(results[0]["text"]
        .as_str()
        .unwrap()
        .contains("feeding schedule"));
    assert!(results[0]["explain"]["exact_phrase"].as_f64().unwrap() > 0.0);

    let scores: Vec<f64> = results
        .iter()
        .map(|r| r["score"].as_f64().unwrap())
        .collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn test_search_limit() {
    let (tmp, config_path) = setup_test_env();
    init_and_ingest(&config_path, &tmp);

    let (stdout, _, success) = run_recall(
        &config_path,
        &["search", "feeding", "--limit", "1", "--json"],
    );
    assert!(success);
    let results: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(results.as_array().unwrap().len(), 1);
}

#[test]
fn test_search_rejects_unusable_max_distance() {
    let (tmp, config_path) = setup_test_env();
    init_and_ingest(&config_path, &tmp);

    for bad in ["NaN", "inf", "3"] {
        let (_, stderr, success) = run_recall(
            &config_path,
            &["search", "feeding", &format!("--max-distance={}", bad)],
        );
        assert!(!success, "--max-distance={} should fail", bad);
        assert!(stderr.contains("max-distance"), "stderr: {}", stderr);
    }
}

#[test]
fn test_search_blank_query() {
    let (tmp, config_path) = setup_test_env();
    init_and_ingest(&config_path, &tmp);

    let (stdout, _, success) = run_recall(&config_path, &["search", "   "]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_search_context_block() {
    let (tmp, config_path) = setup_test_env();
    init_and_ingest(&config_path, &tmp);

    let (stdout, _, success) = run_recall(
        &config_path,
        &["search", "feeding schedule", "--limit", "2", "--context"],
    );
    assert!(success);
    assert!(stdout.starts_with("Our puppy feeding schedule"), "stdout: {}", stdout);
}

#[test]
fn test_get_message() {
    let (tmp, config_path) = setup_test_env();
    init_and_ingest(&config_path, &tmp);

    let (stdout, _, success) = run_recall(&config_path, &["get", "1"]);
    assert!(success);
    assert!(stdout.contains("Dog Owners"));
    assert!(stdout.contains("embedding dims: 128"));

    let (_, stderr, success) = run_recall(&config_path, &["get", "999"]);
    assert!(!success);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_prune_removes_expired_only() {
    let (tmp, config_path) = setup_test_env();
    init_and_ingest(&config_path, &tmp);

    let (stdout, _, success) = run_recall(&config_path, &["prune", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("messages to delete: 1"), "stdout: {}", stdout);

    let (stdout, _, success) = run_recall(&config_path, &["prune"]);
    assert!(success);
    assert!(stdout.contains("deleted: 1"));
    assert!(stdout.contains("remaining: 3"));
}

#[test]
fn test_embed_rebuild() {
    let (tmp, config_path) = setup_test_env();
    init_and_ingest(&config_path, &tmp);

    let (stdout, stderr, success) = run_recall(&config_path, &["embed", "rebuild"]);
    assert!(success, "rebuild failed: {}", stderr);
    assert!(stdout.contains("total messages: 4"));
    assert!(stdout.contains("embedded: 4"));
}

#[test]
fn test_queries_log_no_results() {
    let (tmp, config_path) = setup_test_env();
    init_and_ingest(&config_path, &tmp);

    run_recall(&config_path, &["search", "feeding schedule"]);
    run_recall(&config_path, &["search", "   "]);

    let (stdout, _, success) = run_recall(&config_path, &["queries", "--json"]);
    assert!(success);
    let entries: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(entries.as_array().unwrap().len(), 2);

    let (stdout, _, success) = run_recall(&config_path, &["queries", "--no-results", "--json"]);
    assert!(success);
    let entries: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["status"], "blank_query");
}

#[test]
fn test_missing_config() {
    let (_, stderr, success) = run_recall(Path::new("/nonexistent/recall.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config"));
}
