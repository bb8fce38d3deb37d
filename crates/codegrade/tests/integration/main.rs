// End-to-end grading through the public API, thread backend.
use codegrade::{
    grade, CodeGradingRequest, ExecutionSettings, Grader, GradingError, ResolverStrategy, RunMode,
    TestCase, Verdict,
};

const DOUBLE: &str = "def double(x):\n    return x * 2\n";

fn fast_grader() -> Grader {
    let settings = ExecutionSettings {
        timeout_ns: 1_000_000_000,
        ..ExecutionSettings::default()
    };
    Grader::new(settings, ResolverStrategy::Textual)
}

// ─── basic pass ──────────────────────────────────────────────────────────────
#[test]
fn test_doubling_function_passes() {
    let request = CodeGradingRequest::new(DOUBLE, vec![TestCase::new("3", "6")], RunMode::Run);
    let report = grade(&request);
    assert!(report.all_passed, "report: {report:?}");
    let results = report.results().expect("run results");
    assert_eq!(results.len(), 1);
    assert!(results[0].passed);
    assert_eq!(results[0].actual_output.as_deref(), Some("6"));
    assert!(results[0].error.is_none());
}

#[test]
fn test_tuple_input_is_one_argument() {
    let code = "def pair_sum(p):\n    a, b = p\n    return a + b\n";
    let request = CodeGradingRequest::new(code, vec![TestCase::new("(2, 3)", "5")], RunMode::Run);
    let report = grade(&request);
    assert!(report.all_passed, "report: {report:?}");
}

#[test]
fn test_list_output_ignores_spacing() {
    let code = "def dup(x):\n    return [x, x]\n";
    let request = CodeGradingRequest::new(code, vec![TestCase::new("1", "[1,1]")], RunMode::Run);
    assert!(grade(&request).all_passed);
}

#[test]
fn test_float_does_not_match_int() {
    let code = "def half(x):\n    return x / 2\n";
    let request = CodeGradingRequest::new(code, vec![TestCase::new("2", "1")], RunMode::Run);
    let report = grade(&request);
    assert!(!report.all_passed);
    let results = report.results().expect("run results");
    assert_eq!(results[0].actual_output.as_deref(), Some("1.0"));
    assert!(results[0].error.is_none());
}

// ─── fault containment ───────────────────────────────────────────────────────
#[test]
fn test_divide_by_zero_on_second_case_only() {
    let code = "def inv(x):\n    return 10 // x\n";
    let request = CodeGradingRequest::new(
        code,
        vec![TestCase::new("2", "5"), TestCase::new("0", "0")],
        RunMode::Run,
    );
    let report = grade(&request);
    assert!(!report.all_passed);
    let results = report.results().expect("run results");
    assert!(results[0].passed);
    assert!(results[0].error.is_none());

    let error = results[1].error.as_ref().expect("second case error");
    assert_eq!(error.kind, "RuntimeError");
    assert!(error.message.contains("division"), "message: {}", error.message);
    assert!(!error.trace.is_empty());
    assert_eq!(results[1].actual_output, None);
}

#[test]
fn test_cases_after_a_failure_still_run() {
    let code = "def check(x):\n    if x == 1:\n        raise ValueError('bad')\n    return x\n";
    let request = CodeGradingRequest::new(
        code,
        vec![
            TestCase::new("1", "1"),
            TestCase::new("2", "2"),
            TestCase::new("3", "3"),
        ],
        RunMode::Run,
    );
    let report = grade(&request);
    let results = report.results().expect("run results");
    assert_eq!(results.len(), 3);
    assert!(!results[0].passed);
    assert!(results[1].passed && results[2].passed);
}

#[test]
fn test_syntax_error_fails_every_case_without_aborting() {
    let code = "def broken(x):\n    return x +\n";
    let request = CodeGradingRequest::new(
        code,
        vec![TestCase::new("1", "1"), TestCase::new("2", "2")],
        RunMode::Run,
    );
    let report = grade(&request);
    assert!(report.error.is_none());
    let results = report.results().expect("run results");
    assert_eq!(results.len(), 2);
    for outcome in results {
        assert_eq!(outcome.error.as_ref().map(|e| e.kind.as_str()), Some("SyntaxError"));
    }
}

#[test]
fn test_infinite_loop_times_out_and_next_case_runs() {
    let code = "def spin(x):\n    while x:\n        pass\n    return 0\n";
    let request = CodeGradingRequest::new(
        code,
        vec![TestCase::new("1", "0"), TestCase::new("0", "0")],
        RunMode::Run,
    );
    let report = fast_grader().grade(&request);
    let results = report.results().expect("run results");
    assert_eq!(
        results[0].error.as_ref().map(|e| e.kind.as_str()),
        Some("ExecutionTimeout")
    );
    assert!(results[1].passed, "second case: {:?}", results[1]);
}

#[test]
fn test_denied_import_is_reported_per_case() {
    let code = "import socket\n\ndef f(x):\n    return x\n";
    let request = CodeGradingRequest::new(code, vec![TestCase::new("1", "1")], RunMode::Run);
    let report = grade(&request);
    let results = report.results().expect("run results");
    let error = results[0].error.as_ref().expect("import error");
    assert_eq!(error.kind, "ModuleNotAllowed");
    assert!(error.message.contains("socket"));
}

#[test]
fn test_os_is_not_importable_by_default() {
    let code = "import os\n\ndef ls(x):\n    return sorted(os.listdir('/'))[:x]\n";
    let request = CodeGradingRequest::new(code, vec![TestCase::new("3", "[]")], RunMode::Run);
    let report = grade(&request);
    let results = report.results().expect("run results");
    let error = results[0].error.as_ref().expect("import error");
    assert_eq!(error.kind, "ModuleNotAllowed");
    assert_eq!(results[0].actual_output, None);
}

#[test]
fn test_open_is_unavailable() {
    let code = "def cat(path):\n    return open(path).read()\n";
    let request =
        CodeGradingRequest::new(code, vec![TestCase::new("'/etc/hostname'", "x")], RunMode::Run);
    let report = grade(&request);
    let results = report.results().expect("run results");
    let error = results[0].error.as_ref().expect("name error");
    assert_eq!(error.kind, "RuntimeError");
    assert!(error.message.contains("open"), "message: {}", error.message);
}

#[test]
fn test_recursive_helpers_resolve() {
    let code = "def fib(n):\n    return n if n < 2 else helper(n)\n\n\
                def helper(n):\n    return fib(n - 1) + fib(n - 2)\n";
    let request = CodeGradingRequest::new(code, vec![TestCase::new("10", "55")], RunMode::Run);
    assert!(grade(&request).all_passed);
}

#[test]
fn test_allowed_module_usable() {
    let code = "import math\n\ndef hyp(p):\n    return int(math.hypot(*p))\n";
    let request = CodeGradingRequest::new(code, vec![TestCase::new("(3, 4)", "5")], RunMode::Run);
    assert!(grade(&request).all_passed);
}

// ─── logs ────────────────────────────────────────────────────────────────────
#[test]
fn test_logs_are_labeled_per_case() {
    let code = "def loud(x):\n    print('got', x)\n    return x\n";
    let request = CodeGradingRequest::new(
        code,
        vec![TestCase::new("1", "1"), TestCase::new("2", "2")],
        RunMode::Run,
    );
    let report = grade(&request);
    assert_eq!(
        report.logs(),
        Some("--- Test Case 1 ---\ngot 1\n\n--- Test Case 2 ---\ngot 2\n")
    );
    assert_eq!(report.results().expect("results")[0].captured_log, "got 1\n");
}

#[test]
fn test_restoring_original_stdout_is_still_captured() {
    let code = "import sys\n\ndef sneak(x):\n    sys.stdout = sys.__stdout__\n    print('hidden', x)\n    return x\n";
    let request = CodeGradingRequest::new(code, vec![TestCase::new("1", "1")], RunMode::Run);
    let report = grade(&request);
    let results = report.results().expect("run results");
    assert!(results[0].passed, "case: {:?}", results[0]);
    assert_eq!(results[0].captured_log, "hidden 1\n");
}

#[test]
fn test_timed_out_case_keeps_output_written_so_far() {
    let code = "def spin(x):\n    print('started', x)\n    while True:\n        pass\n";
    let request = CodeGradingRequest::new(code, vec![TestCase::new("1", "1")], RunMode::Run);
    let report = fast_grader().grade(&request);
    let results = report.results().expect("run results");
    assert_eq!(
        results[0].error.as_ref().map(|e| e.kind.as_str()),
        Some("ExecutionTimeout")
    );
    assert_eq!(results[0].captured_log, "started 1\n");
}

// ─── request-level failures ──────────────────────────────────────────────────
#[test]
fn test_no_function_definition_runs_nothing() {
    let request = CodeGradingRequest::new("print('hi')", vec![TestCase::new("1", "1")], RunMode::Run);
    let report = grade(&request);
    assert!(!report.all_passed);
    assert!(report.results().expect("results").is_empty());
    assert_eq!(
        report.error.as_ref().map(|f| &f.error),
        Some(&GradingError::NoEntryPointFound)
    );
}

// ─── mode contract ───────────────────────────────────────────────────────────
#[test]
fn test_submit_mode_returns_transcript_and_verdict() {
    let request = CodeGradingRequest::new(
        DOUBLE,
        vec![TestCase::new("3", "6"), TestCase::new("4", "9")],
        RunMode::Submit,
    );
    let report = grade(&request);
    assert!(!report.all_passed);
    assert!(report.results().is_none());
    assert_eq!(report.verdict(), Some(Verdict::WrongAnswer));
    let transcript = report.transcript().expect("transcript");
    assert_eq!(
        transcript,
        "Execution Results:\n\
         ====================\n\
         Test Case 1: ✅ PASS\n\
         Test Case 2: ❌ FAIL\n   Expected: 9 | Got: 8\n\
         ⚠️ SOME TESTS FAILED. KEEP TRYING!"
    );
    // header + rule + 2 cases + 1 failure detail + summary
    assert_eq!(transcript.lines().count(), 6);
}

#[test]
fn test_submit_mode_all_passed() {
    let request = CodeGradingRequest::new(DOUBLE, vec![TestCase::new("3", "6")], RunMode::Submit);
    let report = grade(&request);
    assert!(report.all_passed);
    assert_eq!(report.verdict(), Some(Verdict::Accepted));
    assert!(report
        .transcript()
        .expect("transcript")
        .ends_with("🎉 ALL TEST CASES PASSED!"));
}

#[test]
fn test_grading_twice_gives_equal_reports() {
    let code = "def loud(x):\n    print(x)\n    return 10 // x\n";
    for mode in [RunMode::Run, RunMode::Submit] {
        let request = CodeGradingRequest::new(
            code,
            vec![TestCase::new("2", "5"), TestCase::new("0", "0")],
            mode,
        );
        assert_eq!(grade(&request), grade(&request), "mode {mode}");
    }
}

#[test]
fn test_report_json_is_camel_case() {
    let request = CodeGradingRequest::new(DOUBLE, vec![TestCase::new("3", "6")], RunMode::Run);
    let json = serde_json::to_value(grade(&request)).expect("serialize");
    assert_eq!(json["allPassed"], true);
    assert_eq!(json["mode"], "run");
    assert_eq!(json["results"][0]["caseNumber"], 1);
    assert_eq!(json["results"][0]["actualOutput"], "6");
}
