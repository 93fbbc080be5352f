//! CLI integration tests

use std::process::Command;

fn squirrly(args: &[&str]) -> std::process::Output {
    Command::new("cargo")
        .args(["run", "-q", "-p", "squirrly-cli", "--"])
        .args(args)
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = squirrly(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("flamegraph"), "Should describe the tool");
    assert!(stdout.contains("run"), "Should show run command");
    assert!(stdout.contains("follow"), "Should show follow command");
    assert!(stdout.contains("--output-file"), "Should show output file option");
    assert!(stdout.contains("--output-dir"), "Should show output dir option");
    assert!(stdout.contains("--inline"), "Should show inline option");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = squirrly(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("squirrly"), "Should show binary name");
}

/// Test follow subcommand help
#[test]
fn test_follow_help() {
    let output = squirrly(&["follow", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "follow help should succeed");
    assert!(stdout.contains("<POD>"), "Should require a pod name");
}

/// Inline delivery cannot be combined with file delivery
#[test]
fn test_inline_conflicts_with_output_file() {
    let output = squirrly(&["--inline", "-o", "result.txt", "run"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "Conflicting flags should fail");
    assert!(stderr.contains("cannot be used with"), "Should explain the conflict");
}

/// Unknown profiler modes are rejected before anything runs
#[test]
fn test_rejects_unknown_mode() {
    let output = squirrly(&["--mode", "WALL", "run"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "Unknown mode should fail");
    assert!(stderr.contains("WALL"), "Should name the rejected mode");
}
