//! Grading orchestration: resolve the entry point once, run every case,
//! compare, and shape the report for the request's mode.
//!
//! Only an unresolvable entry point or an empty test list ends a request
//! early. Every per-case fault is recorded in that case's outcome and the
//! loop moves on.

use tracing::{debug, info, info_span, warn};

use crate::compare::outputs_match;
use crate::config::GraderConfig;
use crate::error::GradingError;
use crate::model::{
    CaseError, CodeGradingRequest, ExecutionOutcome, GradingReport, ReportBody, RequestFailure,
    RunMode, TestCase, Verdict,
};
use crate::report::{collect_logs, render_transcript};
use crate::resolver::{resolve_entry_point_cached, ResolverStrategy};
use crate::sandbox::execute_case;
use crate::types::{ExecutionError, ExecutionSettings};

/// Stateless grader; share one across threads freely.
#[derive(Debug, Clone, Default)]
pub struct Grader {
    settings: ExecutionSettings,
    strategy: ResolverStrategy,
}

impl Grader {
    pub fn new(settings: ExecutionSettings, strategy: ResolverStrategy) -> Self {
        Self { settings, strategy }
    }

    pub fn from_config(config: &GraderConfig) -> Self {
        Self::new(config.to_execution_settings(), config.resolver.strategy)
    }

    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    pub fn strategy(&self) -> ResolverStrategy {
        self.strategy
    }

    /// Grade `request`. Never panics on submission behavior and never fails:
    /// request-level problems are reported in [`GradingReport::error`].
    pub fn grade(&self, request: &CodeGradingRequest) -> GradingReport {
        let span = info_span!(
            "grade",
            mode = %request.mode,
            cases = request.test_cases.len(),
            isolation = %self.settings.isolation,
        );
        let _enter = span.enter();

        if request.test_cases.is_empty() {
            return fatal_report(request.mode, GradingError::EmptyTestSuite);
        }

        let entry_point = match resolve_entry_point_cached(&request.code, self.strategy) {
            Ok(name) => name,
            Err(err) => return fatal_report(request.mode, err.into()),
        };
        debug!(entry_point = %entry_point, "entry point resolved");

        let mut outcomes: Vec<ExecutionOutcome> = request
            .test_cases
            .iter()
            .enumerate()
            .map(|(index, case)| self.grade_case(&request.code, &entry_point, index + 1, case))
            .collect();

        let passed = outcomes.iter().filter(|o| o.passed).count();
        let all_passed = passed == outcomes.len();
        info!(passed, total = outcomes.len(), "request graded");

        for outcome in outcomes.iter_mut().filter(|o| o.hidden) {
            outcome.redact();
        }

        let body = match request.mode {
            RunMode::Run => {
                let logs = collect_logs(&outcomes);
                ReportBody::Run {
                    results: outcomes,
                    logs,
                }
            }
            RunMode::Submit => ReportBody::Submit {
                verdict: Verdict::from_passed(all_passed),
                transcript: render_transcript(&outcomes, None),
            },
        };

        GradingReport {
            all_passed,
            mode: request.mode,
            body,
            error: None,
        }
    }

    /// Run, capture and compare one case.
    fn grade_case(
        &self,
        code: &str,
        entry_point: &str,
        case_number: usize,
        case: &TestCase,
    ) -> ExecutionOutcome {
        let result = execute_case(code, entry_point, &case.input, &self.settings);

        let (passed, actual_output, error) = match &result.error {
            Some(err) => {
                match err {
                    ExecutionError::Timeout { .. } | ExecutionError::SandboxFailure { .. } => {
                        warn!(case_number, error = %err, "case aborted")
                    }
                    _ => debug!(case_number, kind = err.kind(), "case raised"),
                }
                (false, None, Some(CaseError::from(err)))
            }
            None => {
                let actual = result
                    .return_value
                    .clone()
                    .unwrap_or_else(|| "None".to_string());
                let passed = outputs_match(&actual, &case.output);
                debug!(case_number, passed, "case compared");
                (passed, Some(actual), None)
            }
        };

        ExecutionOutcome {
            case_number,
            passed,
            input: case.input.clone(),
            expected_output: case.output.clone(),
            actual_output,
            captured_log: result.stdout,
            captured_stderr: result.stderr,
            error,
            hidden: case.hidden,
        }
    }
}

/// Grade `request` with default settings and the textual resolver.
pub fn grade(request: &CodeGradingRequest) -> GradingReport {
    Grader::default().grade(request)
}

fn fatal_report(mode: RunMode, error: GradingError) -> GradingReport {
    warn!(error = %error, "request rejected before execution");
    let failure = RequestFailure::from(error);
    let body = match mode {
        RunMode::Run => ReportBody::Run {
            results: Vec::new(),
            logs: String::new(),
        },
        RunMode::Submit => ReportBody::Submit {
            verdict: Verdict::WrongAnswer,
            transcript: render_transcript(&[], Some(&failure)),
        },
    };
    GradingReport {
        all_passed: false,
        mode,
        body,
        error: Some(failure),
    }
}
