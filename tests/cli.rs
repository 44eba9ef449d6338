use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn pdfrag_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("pdfrag");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(files_dir.join("nested")).unwrap();
    fs::write(
        files_dir.join("capital.txt"),
        "The capital of France is Paris.",
    )
    .unwrap();
    fs::write(
        files_dir.join("nested").join("rust.md"),
        "# Rust\n\nCargo builds crates.\n\nThe borrow checker enforces ownership.",
    )
    .unwrap();
    fs::write(files_dir.join("nested").join("image.png"), "not text").unwrap();

    let config_content = format!(
        r#"[index]
path = "{}/data/index.json"

[chunking]
max_chars = 500
overlap_chars = 50

[embedding]
provider = "hash"
dims = 128

[llm]
provider = "none"
"#,
        root.display()
    );

    let config_path = config_dir.join("pdfrag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_pdfrag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = pdfrag_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run pdfrag binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_status_on_fresh_index() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_pdfrag(&config_path, &["status"]);
    assert!(success, "status failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Entries:   0"));
    assert!(stdout.contains("not created yet"));
    assert!(stdout.contains("LLM:       none"));
}

#[test]
fn test_ask_before_ingest() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_pdfrag(&config_path, &["ask", "What is the capital?"]);
    assert!(success, "ask failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Vector store is empty. Please upload some documents first."));
}

#[test]
fn test_ingest_directory_then_status() {
    let (tmp, config_path) = setup_test_env();
    let files = tmp.path().join("files");

    let (stdout, stderr, success) =
        run_pdfrag(&config_path, &["ingest", files.to_str().unwrap()]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Processed 2 pages from 2 files."), "{}", stdout);
    assert!(tmp.path().join("data").join("index.json").exists());

    let (stdout, _, success) = run_pdfrag(&config_path, &["status"]);
    assert!(success);
    assert!(stdout.contains("Documents: 2"), "{}", stdout);
    assert!(stdout.contains("Dims:      128"), "{}", stdout);
}

#[test]
fn test_ask_without_llm_after_ingest() {
    let (tmp, config_path) = setup_test_env();
    let file = tmp.path().join("files").join("capital.txt");
    run_pdfrag(&config_path, &["ingest", file.to_str().unwrap()]);

    let (stdout, _, success) = run_pdfrag(&config_path, &["ask", "What is the capital?"]);
    assert!(success);
    assert!(stdout.contains("LLM not initialized. Please check your API keys."));
}

#[test]
fn test_ingest_is_all_or_nothing() {
    let (tmp, config_path) = setup_test_env();
    let good = tmp.path().join("files").join("capital.txt");
    let bad = tmp.path().join("files").join("broken.pdf");
    fs::write(&bad, "not a pdf").unwrap();

    let (_, stderr, success) = run_pdfrag(
        &config_path,
        &["ingest", good.to_str().unwrap(), bad.to_str().unwrap()],
    );
    assert!(!success, "ingest of a broken pdf should fail");
    assert!(stderr.contains("broken.pdf"), "{}", stderr);
    assert!(!tmp.path().join("data").join("index.json").exists());
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_pdfrag(&tmp.path().join("nope.toml"), &["status"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_invalid_chunking_fails_fast() {
    let (tmp, _) = setup_test_env();
    let config_path = tmp.path().join("config").join("bad.toml");
    fs::write(
        &config_path,
        "[index]\npath = \"x.json\"\n[chunking]\nmax_chars = 100\noverlap_chars = 150\n",
    )
    .unwrap();
    let (_, stderr, success) = run_pdfrag(&config_path, &["status"]);
    assert!(!success);
    assert!(stderr.contains("chunking"), "{}", stderr);
}
