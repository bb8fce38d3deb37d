//! CLI integration tests using assert_cmd.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

fn codegrade() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("codegrade").unwrap()
}

fn request(code: &str, cases: &[(&str, &str)], mode: &str) -> String {
    let cases: Vec<_> = cases
        .iter()
        .map(|(input, output)| serde_json::json!({ "input": input, "output": output }))
        .collect();
    serde_json::json!({ "code": code, "test_cases": cases, "mode": mode }).to_string()
}

fn report(output: &[u8]) -> serde_json::Value {
    serde_json::from_slice(output).expect("stdout is a JSON report")
}

const DOUBLE: &str = "def double(x):\n    return x * 2\n";

#[test]
fn grade_from_stdin_in_subprocess_mode() {
    let out = codegrade()
        .arg("grade")
        .write_stdin(request(DOUBLE, &[("3", "6"), ("5", "10")], "run"))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json = report(&out);
    assert_eq!(json["allPassed"], true);
    assert_eq!(json["results"].as_array().map(Vec::len), Some(2));
    assert_eq!(json["results"][1]["actualOutput"], "10");
}

#[test]
fn grade_from_file_with_mode_override() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(request(DOUBLE, &[("3", "6")], "run").as_bytes())
        .unwrap();

    let out = codegrade()
        .arg("grade")
        .arg("--request")
        .arg(file.path())
        .arg("--mode")
        .arg("submit")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json = report(&out);
    assert_eq!(json["mode"], "submit");
    assert_eq!(json["verdict"], "Accepted");
    assert!(json["transcript"]
        .as_str()
        .unwrap()
        .ends_with("🎉 ALL TEST CASES PASSED!"));
}

#[test]
fn transcript_flag_prints_plain_text() {
    codegrade()
        .args(["grade", "--transcript", "--isolation", "thread"])
        .write_stdin(request(DOUBLE, &[("3", "7")], "submit"))
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Execution Results:\n===================="))
        .stdout(predicate::str::contains("   Expected: 7 | Got: 6"))
        .stdout(predicate::str::contains("⚠️ SOME TESTS FAILED. KEEP TRYING!"));
}

#[test]
fn subprocess_worker_times_out() {
    let code = "def spin(x):\n    while True:\n        pass\n";
    let out = codegrade()
        .args(["grade", "--isolation", "subprocess", "--timeout-ms", "200"])
        .write_stdin(request(code, &[("1", "1")], "run"))
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json = report(&out);
    assert_eq!(json["allPassed"], false);
    assert_eq!(json["results"][0]["error"]["kind"], "ExecutionTimeout");
}

#[test]
fn subprocess_timeout_keeps_partial_log() {
    let code = "def spin(x):\n    print('started', x)\n    while True:\n        pass\n";
    let out = codegrade()
        .args(["grade", "--isolation", "subprocess", "--timeout-ms", "2000"])
        .write_stdin(request(code, &[("1", "1")], "run"))
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json = report(&out);
    assert_eq!(json["results"][0]["error"]["kind"], "ExecutionTimeout");
    assert_eq!(json["results"][0]["capturedLog"], "started 1\n");
}

#[test]
fn raw_stdout_writes_do_not_corrupt_the_worker_result() {
    let code = "import sys\n\ndef noisy(x):\n    sys.__stdout__.write('{\"bogus\": 1}\\n')\n    return x * 2\n";
    let out = codegrade()
        .args(["grade", "--isolation", "subprocess"])
        .write_stdin(request(code, &[("4", "8")], "run"))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json = report(&out);
    assert_eq!(json["allPassed"], true);
    assert_eq!(json["results"][0]["capturedLog"], "{\"bogus\": 1}\n");
}

#[test]
fn missing_entry_point_still_exits_zero() {
    let out = codegrade()
        .arg("grade")
        .write_stdin(request("x = 1", &[("1", "1")], "run"))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json = report(&out);
    assert_eq!(json["allPassed"], false);
    assert_eq!(json["error"]["kind"], "NoEntryPointFound");
}

#[test]
fn malformed_request_exits_one() {
    codegrade()
        .arg("grade")
        .write_stdin("{ not json")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("failed to parse request JSON"));
}

#[test]
fn missing_request_file_exits_one() {
    codegrade()
        .args(["grade", "--request", "/nonexistent/request.json"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("failed to read request"));
}

#[test]
fn bad_config_exits_one() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[sandbox]\nisolation = \"docker\"").unwrap();
    codegrade()
        .arg("grade")
        .arg("--config")
        .arg(file.path())
        .write_stdin(request(DOUBLE, &[("3", "6")], "run"))
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("failed to load config"));
}

#[test]
fn config_file_sets_allowlist() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[sandbox]\nallowed_modules = []\nisolation = \"thread\"").unwrap();
    let code = "import math\n\ndef f(x):\n    return x\n";
    let out = codegrade()
        .arg("grade")
        .arg("--config")
        .arg(file.path())
        .write_stdin(request(code, &[("1", "1")], "run"))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json = report(&out);
    assert_eq!(json["results"][0]["error"]["kind"], "ModuleNotAllowed");
}

#[test]
fn worker_rejects_garbage() {
    codegrade()
        .arg("worker")
        .write_stdin("garbage")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("worker failed"));
}
