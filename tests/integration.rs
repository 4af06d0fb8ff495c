use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn dlens_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_dlens"))
}

const NEWS: &str = r#"{"_id": "n1", "url": "https://example.com/1", "disruptionType": "Flood", "imageUrl": "No Image", "isdeleted": false, "location": "Brisbane", "publishedDate": "2024-12-17T08:23:49Z", "raw_text": "", "severity": "High", "text": "Flooding in Brisbane", "title": "Brisbane floods", "actual_text": "Three people were killed and dozens injured as floods swept through Brisbane."}
{"_id": "n2", "url": "https://example.com/2", "disruptionType": "Flood", "imageUrl": "https://example.com/2.jpg", "isdeleted": false, "location": "Port Moresby", "publishedDate": "2024-12-18T02:00:00Z", "raw_text": "", "severity": "Low", "text": "Residents return", "title": "Waters recede", "actual_text": "All residents were rescued safely, a great relief for Port Moresby."}
{"_id": "n3", "url": "https://example.com/3", "disruptionType": "Strike", "isdeleted": false, "location": "Lae", "publishedDate": "2024-12-18T09:30:00Z", "raw_text": "", "severity": "Medium", "text": "Dock workers in Lae walked off the job", "title": "Port strike", "actual_text": ""}
"#;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(root.join("news.ndjson"), NEWS).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/dlens.sqlite"

[server]
bind = "127.0.0.1:7341"

[topics]
artifact_dir = "{root}/data/topics"
iterations = 25
seed = 11
"#,
        root = root.display()
    );

    let config_path = config_dir.join("dlens.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_dlens(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = dlens_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run dlens binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn imported_env() -> (TempDir, PathBuf) {
    let (tmp, config_path) = setup_test_env();
    let news = tmp.path().join("news.ndjson");
    run_dlens(&config_path, &["init"]);
    let (stdout, stderr, success) = run_dlens(&config_path, &["import", news.to_str().unwrap()]);
    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);
    (tmp, config_path)
}

fn json(stdout: &str) -> Value {
    serde_json::from_str(stdout).unwrap_or_else(|e| panic!("not JSON ({}): {}", e, stdout))
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_dlens(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));

    let (_, _, success) = run_dlens(&config_path, &["init"]);
    assert!(success, "Second init failed (not idempotent)");
}

#[test]
fn test_import_skips_existing_ids() {
    let (tmp, config_path) = imported_env();
    let news = tmp.path().join("news.ndjson");

    let (stdout, _, success) = run_dlens(&config_path, &["import", news.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("Imported 0 of 3"), "got: {}", stdout);

    let (stdout, _, _) = run_dlens(&config_path, &["stats"]);
    assert!(stdout.contains("Documents:   3"), "got: {}", stdout);
}

#[test]
fn test_list_and_filter() {
    let (_tmp, config_path) = imported_env();

    let (stdout, _, success) = run_dlens(&config_path, &["list", "--limit", "2"]);
    assert!(success);
    let docs = json(&stdout);
    assert_eq!(docs.as_array().unwrap().len(), 2);
    assert_eq!(docs[0]["id"], "n1");
    assert!(docs[0]["image_url"].is_null());

    let (stdout, _, _) = run_dlens(&config_path, &["filter", "location", "MORESBY"]);
    let docs = json(&stdout);
    assert_eq!(docs.as_array().unwrap().len(), 1);
    assert_eq!(docs[0]["id"], "n2");

    let (_, stderr, success) = run_dlens(&config_path, &["filter", "lat", "1"]);
    assert!(!success);
    assert!(stderr.contains("unknown column"));
}

#[test]
fn test_enrich_sentiment_batch_then_not_needed() {
    let (_tmp, config_path) = imported_env();

    let (stdout, stderr, success) = run_dlens(&config_path, &["enrich", "sentiment"]);
    assert!(success, "enrich failed: stdout={}, stderr={}", stdout, stderr);
    let report = json(&stdout);
    assert_eq!(report["selected"], 3);
    assert_eq!(report["modified"], 3);

    let (stdout, _, success) = run_dlens(&config_path, &["enrich", "sentiment"]);
    assert!(success);
    assert!(stdout.contains("No update needed"));

    let (_, stderr, success) = run_dlens(&config_path, &["enrich", "sentiment", "--id", "n1"]);
    assert!(!success, "repeat single update must report no change");
    assert!(stderr.contains("unchanged"), "got: {}", stderr);
}

#[test]
fn test_aggregate_sentiment() {
    let (_tmp, config_path) = imported_env();
    run_dlens(&config_path, &["enrich", "sentiment"]);

    let (stdout, stderr, success) = run_dlens(
        &config_path,
        &["aggregate", "sentiment", "--mode", "total_count", "--date-only"],
    );
    assert!(success, "aggregate failed: {}", stderr);
    let series = json(&stdout);
    assert_eq!(series["2024-12-17"], 1.0);
    assert_eq!(series["2024-12-18"], 2.0);

    let (stdout, _, _) = run_dlens(
        &config_path,
        &["aggregate", "sentiment", "--mode", "negative_count", "--date-only"],
    );
    assert_eq!(json(&stdout)["2024-12-17"], 1.0);

    let (_, stderr, success) = run_dlens(
        &config_path,
        &["aggregate", "sentiment", "--mode", "median"],
    );
    assert!(!success);
    assert!(stderr.contains("unknown aggregation mode"));
}

#[test]
fn test_enrich_and_aggregate_entities() {
    let (_tmp, config_path) = imported_env();

    let (stdout, stderr, success) = run_dlens(&config_path, &["enrich", "entities", "--id", "n3"]);
    assert!(success, "entities failed: stdout={}, stderr={}", stdout, stderr);
    // Empty body falls back to the summary
    assert_eq!(json(&stdout)["entities"]["city"][0], "Lae");

    let (_, _, success) = run_dlens(&config_path, &["enrich", "entities"]);
    assert!(success);

    let (stdout, _, success) = run_dlens(&config_path, &["aggregate", "entities", "--date-only"]);
    assert!(success);
    let series = json(&stdout);
    assert_eq!(series["2024-12-17"]["city"][0], "Brisbane");
    assert_eq!(series["2024-12-18"]["city"], serde_json::json!(["Port Moresby", "Lae"]));
}

#[test]
fn test_topics_fit_and_visual() {
    let (tmp, config_path) = imported_env();

    let (stdout, stderr, success) =
        run_dlens(&config_path, &["topics", "fit", "--num-topics", "2", "--relevant-terms", "3"]);
    assert!(success, "fit failed: stdout={}, stderr={}", stdout, stderr);
    let report = json(&stdout);
    assert_eq!(report["data"].as_object().unwrap().len(), 2);
    assert!(report["score"]["perplexity"].as_f64().unwrap().is_finite());

    let output = tmp.path().join("out").join("lda_vis.html");
    let (_, stderr, success) = run_dlens(
        &config_path,
        &["topics", "visual", "--num-topics", "2", "--output", output.to_str().unwrap()],
    );
    assert!(success, "visual failed: {}", stderr);
    assert!(fs::read_to_string(&output).unwrap().contains("<html"));

    let (_, stderr, success) = run_dlens(&config_path, &["topics", "visual", "--num-topics", "9"]);
    assert!(!success);
    assert!(stderr.contains("not found"));
}
