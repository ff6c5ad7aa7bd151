use std::process::Command;

fn decbench() -> Command {
    Command::new(env!("CARGO_BIN_EXE_decbench"))
}

#[test]
fn help_lists_options() {
    let output = decbench().arg("--help").output().expect("run decbench --help");

    assert!(
        output.status.success(),
        "decbench --help failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--max-streams"), "missing --max-streams in help");
    assert!(stdout.contains("--target-fps"), "missing --target-fps in help");
    assert!(stdout.contains("--csv-file"), "missing --csv-file in help");
    assert!(stdout.contains("--json"), "missing --json in help");
    assert!(stdout.contains("--log-file"), "missing --log-file in help");
    assert!(stdout.contains("rtsp://"), "missing RTSP mention in help");
}

#[test]
fn version_prints_package_version() {
    let output = decbench().arg("--version").output().expect("run decbench --version");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains(env!("CARGO_PKG_VERSION")),
        "unexpected version output: {stdout}"
    );
}

#[test]
fn missing_source_is_a_usage_error() {
    let output = decbench().output().expect("run decbench");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("SOURCE") || stderr.contains("source"), "stderr: {stderr}");
}

#[test]
fn zero_max_streams_is_rejected_at_parse_time() {
    let output = decbench()
        .args(["--max-streams", "0", "video.mp4"])
        .output()
        .expect("run decbench");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("0"), "stderr: {stderr}");
}

#[test]
fn nonexistent_file_fails_before_probing() {
    let output = decbench()
        .arg("/nonexistent/decbench-cli-test.mp4")
        .output()
        .expect("run decbench");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("File not found"), "stderr: {stderr}");
}

#[test]
fn negative_target_fps_is_rejected() {
    let output = decbench()
        .args(["--target-fps", "-5", "--", "/nonexistent/x.mp4"])
        .output()
        .expect("run decbench");

    assert!(!output.status.success());
}
