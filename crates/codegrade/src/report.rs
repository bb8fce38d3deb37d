//! Human-readable renderings of grading results.

use crate::model::{ExecutionOutcome, RequestFailure};

const HEADER: &str = "Execution Results:";
const RULE: &str = "====================";
const PASS_MARK: &str = "✅ PASS";
const FAIL_MARK: &str = "❌ FAIL";
const ALL_PASSED: &str = "🎉 ALL TEST CASES PASSED!";
const SOME_FAILED: &str = "⚠️ SOME TESTS FAILED. KEEP TRYING!";

/// Render the submit-mode transcript.
///
/// One status line per case, one detail line under each failing case, and a
/// summary line. A request-level `failure` replaces the case lines with its
/// message. Lines are joined with `\n` and there is no trailing newline.
///
/// # Examples
/// ```
/// use codegrade::report::render_transcript;
/// assert_eq!(
///     render_transcript(&[], None),
///     "Execution Results:\n====================\n🎉 ALL TEST CASES PASSED!"
/// );
/// ```
pub fn render_transcript(outcomes: &[ExecutionOutcome], failure: Option<&RequestFailure>) -> String {
    let mut lines: Vec<String> = vec![HEADER.to_string(), RULE.to_string()];

    if let Some(failure) = failure {
        lines.push(format!("   Error: {}", failure.message));
        lines.push(SOME_FAILED.to_string());
        return lines.join("\n");
    }

    for outcome in outcomes {
        let mark = if outcome.passed { PASS_MARK } else { FAIL_MARK };
        lines.push(format!("Test Case {}: {mark}", outcome.case_number));
        if outcome.passed {
            continue;
        }
        match &outcome.error {
            Some(error) => lines.push(format!("   Error: {}", error.message)),
            None => lines.push(format!(
                "   Expected: {} | Got: {}",
                outcome.expected_output,
                outcome.actual_output.as_deref().unwrap_or_default()
            )),
        }
    }

    let all_passed = outcomes.iter().all(|o| o.passed);
    lines.push(if all_passed { ALL_PASSED } else { SOME_FAILED }.to_string());
    lines.join("\n")
}

/// Concatenate every case's captured stdout under a `--- Test Case N ---`
/// label. Cases that printed nothing are skipped.
pub fn collect_logs(outcomes: &[ExecutionOutcome]) -> String {
    outcomes
        .iter()
        .filter(|o| !o.captured_log.is_empty())
        .map(|o| format!("--- Test Case {} ---\n{}", o.case_number, o.captured_log))
        .collect::<Vec<_>>()
        .join("\n")
}
