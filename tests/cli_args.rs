//! Integration tests for the command-line binary
//!
//! Runs the real binary against temporary cache directories. Nothing here
//! touches the network.

use std::process::{Command, Output};

use tempfile::TempDir;

/// Helper to run the CLI with given args and capture output
fn run_cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_metacache"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute metacache")
}

fn dir_arg(dir: &TempDir) -> String {
    dir.path().to_string_lossy().into_owned()
}

#[test]
fn test_help_flag_exits_successfully() {
    let output = run_cli(&["--help"]);
    assert!(output.status.success(), "Expected --help to exit successfully");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("metacache"), "Help should mention metacache");
    assert!(stdout.contains("fetch"), "Help should list the fetch command");
    assert!(stdout.contains("kv"), "Help should list the kv command");
}

#[test]
fn test_invalid_url_prints_error_and_exits() {
    let temp_dir = TempDir::new().unwrap();
    let output = run_cli(&["fetch", "not-a-url", "--cache-dir", &dir_arg(&temp_dir)]);
    assert!(!output.status.success(), "Expected invalid URL to fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Invalid URL"),
        "Should print error message about invalid URL: {}",
        stderr
    );
}

#[test]
fn test_clean_on_empty_cache() {
    let temp_dir = TempDir::new().unwrap();
    let output = run_cli(&["clean", "--cache-dir", &dir_arg(&temp_dir)]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Removed 0 expired entries"), "got: {}", stdout);
}

#[test]
fn test_kv_set_then_get_across_processes() {
    let temp_dir = TempDir::new().unwrap();
    let dir = dir_arg(&temp_dir);

    let set = run_cli(&["kv", "set", "greeting", r#"{"text":"hi"}"#, "--cache-dir", &dir]);
    assert!(set.status.success(), "set failed: {}", String::from_utf8_lossy(&set.stderr));
    assert!(temp_dir.path().join("kv").join("store.json").is_file());

    let get = run_cli(&["kv", "get", "greeting", "--cache-dir", &dir]);
    assert!(get.status.success());
    let value: serde_json::Value =
        serde_json::from_slice(&get.stdout).expect("get should print JSON");
    assert_eq!(value, serde_json::json!({"text": "hi"}));
}

#[test]
fn test_kv_entry_outlives_cache_expiration() {
    let temp_dir = TempDir::new().unwrap();
    let dir = dir_arg(&temp_dir);

    let set = run_cli(&["kv", "set", "k", "v", "--ttl", "3600", "--expiration", "1", "--cache-dir", &dir]);
    assert!(set.status.success());

    std::thread::sleep(std::time::Duration::from_millis(2100));

    let clean = run_cli(&["clean", "--expiration", "1", "--cache-dir", &dir]);
    assert!(clean.status.success());

    let get = run_cli(&["kv", "get", "k", "--expiration", "1", "--cache-dir", &dir]);
    assert!(
        get.status.success(),
        "KV entry must survive the sweep: {}",
        String::from_utf8_lossy(&get.stderr)
    );
    let value: serde_json::Value = serde_json::from_slice(&get.stdout).unwrap();
    assert_eq!(value, serde_json::json!("v"));
}

#[test]
fn test_kv_get_missing_key_fails() {
    let temp_dir = TempDir::new().unwrap();
    let output = run_cli(&["kv", "get", "absent", "--cache-dir", &dir_arg(&temp_dir)]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Key not found"), "got: {}", stderr);
}

#[test]
fn test_kv_custom_file() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("nested").join("kv.json");
    let file_arg = file.to_string_lossy().into_owned();

    let output = run_cli(&[
        "kv",
        "--file",
        &file_arg,
        "set",
        "k",
        "plain text",
        "--cache-dir",
        &dir_arg(&temp_dir),
    ]);
    assert!(output.status.success());

    let raw = std::fs::read_to_string(&file).unwrap();
    assert!(raw.contains(r#"\"plain text\""#), "value is stored JSON-encoded: {}", raw);
}

#[cfg(test)]
mod unit_tests {
    //! Unit tests for CLI parsing that don't require running the binary

    use clap::Parser;
    use metacache::cli::{Cli, Command, KvAction};

    #[test]
    fn test_kv_get_parses() {
        let cli = Cli::parse_from(["metacache", "kv", "get", "k"]);
        assert!(matches!(
            cli.command,
            Command::Kv { action: KvAction::Get { ref key }, .. } if key == "k"
        ));
    }

    #[test]
    fn test_unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["metacache", "explode"]).is_err());
    }
}
