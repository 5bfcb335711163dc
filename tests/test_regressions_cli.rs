use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::tempdir;

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_trace-filter")
}

fn write_file(path: &Path, content: &str) {
    fs::write(path, content).expect("failed to write test file");
}

fn run(args: &[&str]) -> Output {
    Command::new(bin())
        .env_remove("RUST_LOG")
        .env_remove("TRACE_FILTER_CONFIG")
        .args(args)
        .output()
        .expect("command should run")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

const RECORDS: &str = r#"{"trace_type": "lttng.kernel", "type": "sched_switch", "timestamp": 1000, "pid": 1234, "name": "glxgears"}
{"trace_type": "lttng.kernel", "type": "sched_switch", "timestamp": 2000, "pid": 500, "name": "glxgears"}
{"trace_type": "ust", "type": "foo", "timestamp": 3000, "pid": 4321, "name": "bash"}
"#;

#[test]
fn test_filter_prints_matching_lines() {
    let dir = tempdir().expect("temp dir");
    let file = dir.path().join("events.jsonl");
    write_file(&file, RECORDS);

    let output = run(&[
        "filter",
        "-f",
        r#"pid > 1000 && name matches "gl.*""#,
        file.to_str().expect("utf8 path"),
    ]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let out = stdout(&output);
    assert_eq!(out.lines().count(), 1, "unexpected output:\n{out}");
    assert!(out.contains("\"pid\": 1234"));
}

#[test]
fn test_tree_and_predicate_paths_count_the_same() {
    let dir = tempdir().expect("temp dir");
    let file = dir.path().join("events.jsonl");
    write_file(&file, RECORDS);
    let path = file.to_str().expect("utf8 path");

    for filter in ["! \"Event type\" == foo", "glxgears", "pid < 1000 || name == bash"] {
        let plain = run(&["filter", "--count", "-f", filter, path]);
        let tree = run(&["filter", "--tree", "--count", "-f", filter, path]);
        assert!(plain.status.success() && tree.status.success());
        assert_eq!(stdout(&plain), stdout(&tree), "filter '{filter}'");
    }
}

#[test]
fn test_header_keys_keep_their_names_on_both_paths() {
    let dir = tempdir().expect("temp dir");
    let file = dir.path().join("events.jsonl");
    write_file(&file, RECORDS);
    let path = file.to_str().expect("utf8 path");

    for (filter, expected) in [
        (r#"! type == "foo""#, "2"),
        ("type == sched_switch", "2"),
        ("^glx", "2"),
        ("pid != 1234", "2"),
    ] {
        for tree in [false, true] {
            let mut args = vec!["filter", "--count", "-f", filter, path];
            if tree {
                args.insert(1, "--tree");
            }
            let output = run(&args);
            assert!(output.status.success(), "filter '{filter}'");
            assert_eq!(stdout(&output).trim(), expected, "filter '{filter}', tree: {tree}");
        }
    }
}

#[test]
fn test_malformed_filter_applies_no_filtering() {
    let dir = tempdir().expect("temp dir");
    let file = dir.path().join("events.jsonl");
    write_file(&file, RECORDS);

    let output = run(&[
        "filter",
        "--count",
        "-f",
        "pid > && ((",
        file.to_str().expect("utf8 path"),
    ]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "3");
    assert!(String::from_utf8_lossy(&output.stderr).contains("no filtering applied"));
}

#[test]
fn test_trace_type_gate() {
    let dir = tempdir().expect("temp dir");
    let file = dir.path().join("events.jsonl");
    write_file(&file, RECORDS);

    let output = run(&[
        "filter",
        "--count",
        "--trace-type",
        "lttng.kernel",
        "-f",
        "pid present",
        file.to_str().expect("utf8 path"),
    ]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "2");
}

#[test]
fn test_saved_filters_from_config() {
    let dir = tempdir().expect("temp dir");
    let file = dir.path().join("events.jsonl");
    let config = dir.path().join("filters.toml");
    write_file(&file, RECORDS);
    write_file(
        &config,
        r#"
profile_name = "test"

[[saved_filters]]
name = "busy"
expression = "pid > 1000"
"#,
    );

    for extra in [None, Some("--tree")] {
        let mut args = vec![
            "-c",
            config.to_str().expect("utf8 path"),
            "filter",
            "--count",
            "--saved",
            "busy",
            "-f",
            "name == glxgears",
        ];
        args.extend(extra);
        args.push(file.to_str().expect("utf8 path"));
        let output = run(&args);
        assert!(
            output.status.success(),
            "stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        assert_eq!(stdout(&output).trim(), "1");
    }

    let output = run(&[
        "-c",
        config.to_str().expect("utf8 path"),
        "filter",
        "--saved",
        "missing",
        file.to_str().expect("utf8 path"),
    ]);
    assert!(!output.status.success());
}

#[test]
fn test_json_output_lists_records() {
    let dir = tempdir().expect("temp dir");
    let file = dir.path().join("events.jsonl");
    write_file(&file, RECORDS);

    let output = run(&[
        "-F",
        "json",
        "filter",
        "-f",
        "name == bash",
        file.to_str().expect("utf8 path"),
    ]);
    assert!(output.status.success());
    let value: serde_json::Value =
        serde_json::from_str(&stdout(&output)).expect("stdout should be JSON");
    assert_eq!(value["matched"], 1);
    assert_eq!(value["total"], 3);
    assert_eq!(value["records"][0]["pid"], 4321);
}

#[test]
fn test_check_rejects_malformed_filter() {
    let ok = run(&["check", "-f", "pid > 1000"]);
    assert!(ok.status.success());
    assert!(stdout(&ok).contains("pid > 1000"));

    let bad = run(&["check", "-f", "pid = 1000"]);
    assert!(!bad.status.success());
    assert!(String::from_utf8_lossy(&bad.stderr).contains("Unexpected token"));
}

#[test]
fn test_explain_json() {
    let output = run(&["-F", "json", "explain", "-f", "glxgears"]);
    assert!(output.status.success());
    let value: serde_json::Value =
        serde_json::from_str(&stdout(&output)).expect("stdout should be JSON");
    assert_eq!(value["compiled"]["expressions"][0]["left"]["field"], "*");
    assert_eq!(value["tree"]["children"][0]["kind"], "Or");
}

#[test]
fn test_explain_text_shows_tree() {
    let output = run(&["--color", "never", "explain", "-f", "pid > 1000"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("Compare [pid] > \"1000\""), "output:\n{out}");
}
