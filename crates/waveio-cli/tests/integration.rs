//! Integration tests for `waveio-cli`.
//!
//! Runs the built binary end-to-end against the `dummy` backend, which
//! requires no real audio hardware, so these tests are stable in CI.

use std::process::Command;

fn waveio_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_waveio"));
    cmd.env("WAVEIO_BACKEND", "dummy");
    cmd
}

#[test]
fn cli_devices_lists_dummy_endpoints() {
    let output = waveio_bin().arg("devices").output().expect("failed to run waveio devices");

    assert!(output.status.success(), "waveio devices failed: {}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("backend: dummy"));
    assert!(stdout.contains("input devices:"));
    assert!(stdout.contains("output devices:"));
    assert!(stdout.contains("Dummy Output Device"));
    assert!(stdout.contains("Dummy Input Device"));
}

#[test]
fn cli_devices_unknown_backend_fails() {
    let output = Command::new(env!("CARGO_BIN_EXE_waveio"))
        .args(["devices", "--backend", "not-a-real-backend"])
        .output()
        .expect("failed to run waveio devices");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown backend"), "stderr was: {stderr}");
}

#[test]
fn cli_sine_plays_briefly() {
    let output = waveio_bin()
        .args(["sine", "--freq", "220", "--seconds", "0"])
        .output()
        .expect("failed to run waveio sine");

    assert!(output.status.success(), "waveio sine failed: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("playing 220"));
}

#[test]
fn cli_record_writes_raw_samples() {
    use tempfile::TempDir;

    let dir = TempDir::new().unwrap();
    let out_path = dir.path().join("capture.raw");

    let output = waveio_bin()
        .args(["record", "--seconds", "0", out_path.to_str().unwrap()])
        .output()
        .expect("failed to run waveio record");

    assert!(output.status.success(), "waveio record failed: {}", String::from_utf8_lossy(&output.stderr));
    assert!(out_path.exists(), "recording should be written");
}

#[test]
fn cli_help_lists_subcommands() {
    let output = Command::new(env!("CARGO_BIN_EXE_waveio"))
        .arg("--help")
        .output()
        .expect("failed to run waveio --help");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("devices"));
    assert!(stdout.contains("sine"));
    assert!(stdout.contains("record"));
    assert!(stdout.contains("monitor"));
}

#[test]
fn cli_version_works() {
    let output = Command::new(env!("CARGO_BIN_EXE_waveio"))
        .arg("--version")
        .output()
        .expect("failed to run waveio --version");

    assert!(output.status.success());
}
