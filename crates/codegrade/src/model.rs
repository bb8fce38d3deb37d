//! Grading data model: what the transport layer hands in and gets back.
//!
//! All JSON field names are camelCase except the request's `test_cases`,
//! which keeps the name existing clients send.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GradingError;
use crate::types::ExecutionError;

/// Placeholder shown instead of hidden test case data in run mode.
pub const HIDDEN_PLACEHOLDER: &str = "<hidden>";

/// Grading mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Per-case diagnostics and logs for iterative debugging.
    Run,
    /// Final grade: verdict plus a rendered transcript.
    #[default]
    Submit,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Run => f.write_str("run"),
            RunMode::Submit => f.write_str("submit"),
        }
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "run" => Ok(RunMode::Run),
            "submit" => Ok(RunMode::Submit),
            other => Err(format!("unknown mode '{other}' (expected run or submit)")),
        }
    }
}

/// One input/expected-output pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Python expression passed as the entry point's single argument.
    pub input: String,
    /// Expected `str()` of the return value.
    pub output: String,
    /// Hidden cases still run in run mode but their data is redacted.
    #[serde(default, alias = "isHidden", skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,
}

impl TestCase {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            hidden: false,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

/// A submission plus the cases it is graded against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeGradingRequest {
    pub code: String,
    pub test_cases: Vec<TestCase>,
    #[serde(default)]
    pub mode: RunMode,
}

impl CodeGradingRequest {
    pub fn new(code: impl Into<String>, test_cases: Vec<TestCase>, mode: RunMode) -> Self {
        Self {
            code: code.into(),
            test_cases,
            mode,
        }
    }
}

/// Why a case failed to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseError {
    /// `SyntaxError`, `RuntimeError`, `ExecutionTimeout`, ...
    pub kind: String,
    pub message: String,
    pub trace: String,
}

impl From<&ExecutionError> for CaseError {
    fn from(err: &ExecutionError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
            trace: err.trace(),
        }
    }
}

/// Result of one test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    /// 1-based position in the request.
    pub case_number: usize,
    pub passed: bool,
    pub input: String,
    pub expected_output: String,
    /// Present only when the entry point returned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_output: Option<String>,
    /// Text the submission wrote to stdout.
    pub captured_log: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub captured_stderr: String,
    /// Present only when execution failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CaseError>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,
}

impl ExecutionOutcome {
    /// Replaces the case's data with placeholders, keeping the verdict and
    /// error kind.
    pub fn redact(&mut self) {
        self.input = HIDDEN_PLACEHOLDER.to_string();
        self.expected_output = HIDDEN_PLACEHOLDER.to_string();
        if self.actual_output.is_some() {
            self.actual_output = Some(HIDDEN_PLACEHOLDER.to_string());
        }
        self.captured_log.clear();
        self.captured_stderr.clear();
        if let Some(error) = self.error.as_mut() {
            error.message = HIDDEN_PLACEHOLDER.to_string();
            error.trace = HIDDEN_PLACEHOLDER.to_string();
        }
        self.hidden = true;
    }
}

/// Final status recorded for a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Accepted,
    WrongAnswer,
}

impl Verdict {
    pub fn from_passed(all_passed: bool) -> Self {
        if all_passed {
            Verdict::Accepted
        } else {
            Verdict::WrongAnswer
        }
    }
}

/// A request-level failure, reported with zero executed cases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFailure {
    #[serde(flatten)]
    pub error: GradingError,
    pub message: String,
}

impl From<GradingError> for RequestFailure {
    fn from(error: GradingError) -> Self {
        let message = error.to_string();
        Self { error, message }
    }
}

/// Mode-dependent part of a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportBody {
    Run {
        results: Vec<ExecutionOutcome>,
        logs: String,
    },
    Submit {
        verdict: Verdict,
        transcript: String,
    },
}

/// What the grader returns for every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingReport {
    pub all_passed: bool,
    pub mode: RunMode,
    #[serde(flatten)]
    pub body: ReportBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RequestFailure>,
}

impl GradingReport {
    /// Per-case outcomes (run mode only).
    pub fn results(&self) -> Option<&[ExecutionOutcome]> {
        match &self.body {
            ReportBody::Run { results, .. } => Some(results),
            ReportBody::Submit { .. } => None,
        }
    }

    /// Concatenated case-labeled logs (run mode only).
    pub fn logs(&self) -> Option<&str> {
        match &self.body {
            ReportBody::Run { logs, .. } => Some(logs),
            ReportBody::Submit { .. } => None,
        }
    }

    /// Rendered transcript (submit mode only).
    pub fn transcript(&self) -> Option<&str> {
        match &self.body {
            ReportBody::Submit { transcript, .. } => Some(transcript),
            ReportBody::Run { .. } => None,
        }
    }

    pub fn verdict(&self) -> Option<Verdict> {
        match &self.body {
            ReportBody::Submit { verdict, .. } => Some(*verdict),
            ReportBody::Run { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_mode_defaults_to_submit() {
        let json = r#"{"code":"def f(x): return x","test_cases":[{"input":"1","output":"1"}]}"#;
        let request: CodeGradingRequest = serde_json::from_str(json).expect("parse request");
        assert_eq!(request.mode, RunMode::Submit);
        assert_eq!(request.test_cases.len(), 1);
        assert!(!request.test_cases[0].hidden);
    }

    #[test]
    fn test_case_accepts_is_hidden_alias() {
        let case: TestCase =
            serde_json::from_str(r#"{"input":"1","output":"2","isHidden":true}"#).expect("parse");
        assert!(case.hidden);
    }

    #[test]
    fn outcome_serializes_camel_case_and_omits_absent_fields() {
        let outcome = ExecutionOutcome {
            case_number: 1,
            passed: true,
            input: "3".to_string(),
            expected_output: "6".to_string(),
            actual_output: Some("6".to_string()),
            captured_log: String::new(),
            captured_stderr: String::new(),
            error: None,
            hidden: false,
        };
        let value = serde_json::to_value(&outcome).expect("serialize");
        assert_eq!(value["caseNumber"], 1);
        assert_eq!(value["expectedOutput"], "6");
        assert_eq!(value["actualOutput"], "6");
        assert!(value.get("error").is_none());
        assert!(value.get("capturedStderr").is_none());
        assert!(value.get("hidden").is_none());
    }

    #[test]
    fn redact_hides_data_but_keeps_verdict() {
        let mut outcome = ExecutionOutcome {
            case_number: 2,
            passed: false,
            input: "[1, 2]".to_string(),
            expected_output: "3".to_string(),
            actual_output: None,
            captured_log: "debug\n".to_string(),
            captured_stderr: String::new(),
            error: Some(CaseError {
                kind: "RuntimeError".to_string(),
                message: "boom".to_string(),
                trace: "Traceback".to_string(),
            }),
            hidden: false,
        };
        outcome.redact();
        assert_eq!(outcome.input, HIDDEN_PLACEHOLDER);
        assert_eq!(outcome.expected_output, HIDDEN_PLACEHOLDER);
        assert!(outcome.actual_output.is_none());
        assert!(outcome.captured_log.is_empty());
        assert!(!outcome.passed);
        let error = outcome.error.expect("error kept");
        assert_eq!(error.kind, "RuntimeError");
        assert_eq!(error.message, HIDDEN_PLACEHOLDER);
    }

    #[test]
    fn submit_report_serializes_flat() {
        let report = GradingReport {
            all_passed: false,
            mode: RunMode::Submit,
            body: ReportBody::Submit {
                verdict: Verdict::WrongAnswer,
                transcript: "Execution Results:".to_string(),
            },
            error: Some(GradingError::NoEntryPointFound.into()),
        };
        let value = serde_json::to_value(&report).expect("serialize");
        assert_eq!(value["allPassed"], false);
        assert_eq!(value["mode"], "submit");
        assert_eq!(value["verdict"], "WrongAnswer");
        assert_eq!(value["transcript"], "Execution Results:");
        assert_eq!(value["error"]["kind"], "NoEntryPointFound");
        assert_eq!(
            value["error"]["message"],
            "no function definition found in submission"
        );
        assert!(value.get("results").is_none());
    }

    #[test]
    fn verdict_follows_aggregate() {
        assert_eq!(Verdict::from_passed(true), Verdict::Accepted);
        assert_eq!(Verdict::from_passed(false), Verdict::WrongAnswer);
    }
}
