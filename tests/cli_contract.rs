use std::process::Command;

fn run_telecine(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_telecine"))
        .args(args)
        .output()
        .expect("telecine command should run")
}

#[test]
fn missing_source_fails_before_any_terminal_setup() {
    let output = run_telecine(&["/definitely/not/there.mp4"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("was not found"),
        "stderr should name the missing source, got: {stderr}"
    );
    // Startup failures print plain diagnostics, no escape sequences.
    assert!(!stderr.contains('\x1b'));
}

#[test]
fn non_positive_fps_is_rejected() {
    let output = run_telecine(&["clip.mp4", "--fps", "0"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("positive"));
}

#[test]
fn unknown_color_mode_is_rejected_by_the_parser() {
    let output = run_telecine(&["clip.mp4", "--colors", "999"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("999"));
}

#[test]
fn help_documents_the_playback_flags() {
    let output = run_telecine(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for flag in ["--fps", "--scale", "--colors", "--dither", "--symbols", "--loop"] {
        assert!(stdout.contains(flag), "help should mention {flag}");
    }
}

#[test]
fn version_flag_reports_and_exits_zero() {
    let output = run_telecine(&["--version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}
