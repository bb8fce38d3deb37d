//! Run one test case's harness under the configured isolation backend.
//!
//! Every backend returns an [`ExecutionResult`] and never panics on submission
//! behavior:
//!
//! - `thread`: a fresh interpreter on a new thread, interrupted on timeout.
//! - `pooled`: a warm [`InterpreterPool`] slot with a fresh `__main__` scope,
//!   interrupted on timeout. Falls back to `thread` when no slot frees up in
//!   time.
//! - `subprocess`: a `codegrade worker` child process, killed on timeout.
//!
//! In all three, output written past `max_output_bytes` turns the case into
//! [`ExecutionError::OutputLimitExceeded`], whatever the code did afterwards.

use std::collections::HashSet;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::harness::build_harness;
use crate::modules::build_allowed_set;
use crate::output::OutputBuffer;
use crate::pool::{InterpreterPool, WorkItem};
use crate::timeout::{run_with_timeout, wait_with_interrupt, TimedRun};
use crate::types::{ExecutionError, ExecutionResult, ExecutionSettings, Isolation};
use crate::vm::{build_interpreter, run_code, RunInterrupt, VmRunResult};
use crate::worker::{run_in_subprocess, WorkerRequest};

/// Execute `entry_point(input)` appended to `code`.
///
/// # Examples
/// ```no_run
/// use codegrade::sandbox::execute_case;
/// use codegrade::ExecutionSettings;
///
/// let result = execute_case(
///     "def double(x):\n    return x * 2",
///     "double",
///     "21",
///     &ExecutionSettings::default(),
/// );
/// assert_eq!(result.return_value.as_deref(), Some("42"));
/// ```
pub fn execute_case(
    code: &str,
    entry_point: &str,
    input: &str,
    settings: &ExecutionSettings,
) -> ExecutionResult {
    let harness = build_harness(code, entry_point, input);
    execute_harness(&harness, settings)
}

/// Execute an already-built harness.
pub fn execute_harness(harness: &str, settings: &ExecutionSettings) -> ExecutionResult {
    let start = Instant::now();

    let mut result = match settings.isolation {
        Isolation::Thread => run_in_thread(
            harness,
            settings.max_output_bytes,
            Arc::new(build_allowed_set(settings)),
            settings.timeout_ns,
        ),
        Isolation::Pooled => run_pooled(harness, settings),
        Isolation::Subprocess => match &settings.worker_program {
            Some(program) => run_in_subprocess(program, &WorkerRequest::new(harness, settings)),
            None => failure("subprocess isolation requires a worker program"),
        },
    };

    result.duration_ns = start.elapsed().as_nanos() as u64;
    debug!(
        isolation = %settings.isolation,
        duration_ns = result.duration_ns,
        error = result.error.as_ref().map(ExecutionError::kind),
        "case executed"
    );
    result
}

/// Fresh interpreter on a dedicated thread. Also what the subprocess worker
/// runs inside the child.
pub(crate) fn run_in_thread(
    harness: &str,
    max_output_bytes: usize,
    allowed_set: Arc<HashSet<String>>,
    timeout_ns: u64,
) -> ExecutionResult {
    let output = OutputBuffer::new(max_output_bytes);
    let vm_output = output.clone();
    let harness = harness.to_owned();
    let interrupt = RunInterrupt::new();
    let vm_interrupt = Arc::clone(&interrupt);

    let run = run_with_timeout(
        "codegrade-case",
        move || {
            let interp = build_interpreter(allowed_set);
            run_code(&interp, &harness, vm_output, &vm_interrupt)
        },
        timeout_ns,
        || interrupt.interrupt(),
    );

    settle(run, output, max_output_bytes, timeout_ns)
}

fn run_pooled(harness: &str, settings: &ExecutionSettings) -> ExecutionResult {
    let allowed_set = Arc::new(build_allowed_set(settings));
    let output = OutputBuffer::new(settings.max_output_bytes);
    let (response_tx, response_rx) = mpsc::sync_channel::<VmRunResult>(1);
    let interrupt = RunInterrupt::new();

    let work = WorkItem {
        harness: harness.to_owned(),
        output: output.clone(),
        allowed_set: Arc::clone(&allowed_set),
        interrupt: Arc::clone(&interrupt),
        response: response_tx,
    };

    let timeout = Duration::from_nanos(settings.timeout_ns);
    if !InterpreterPool::global().dispatch_work(work, timeout) {
        warn!("interpreter pool exhausted, using a fresh interpreter");
        return run_in_thread(
            harness,
            settings.max_output_bytes,
            allowed_set,
            settings.timeout_ns,
        );
    }

    let run = wait_with_interrupt(
        &response_rx,
        timeout,
        || interrupt.interrupt(),
        "pool slot exited before returning a result",
    );

    settle(run, output, settings.max_output_bytes, settings.timeout_ns)
}

/// Turn a deadline-bounded VM run into the case's result.
fn settle(
    run: TimedRun<VmRunResult>,
    output: OutputBuffer,
    max_output_bytes: usize,
    timeout_ns: u64,
) -> ExecutionResult {
    match run {
        TimedRun::Completed(result) => {
            let error = if output.is_limit_exceeded() {
                Some(ExecutionError::OutputLimitExceeded {
                    limit_bytes: max_output_bytes,
                })
            } else {
                result.error
            };
            ExecutionResult {
                stdout: result.stdout,
                stderr: result.stderr,
                return_value: if error.is_some() { None } else { result.return_value },
                error,
                duration_ns: 0,
            }
        }
        TimedRun::TimedOut => {
            output.cancel();
            let (stdout, stderr) = output.into_strings();
            ExecutionResult {
                stdout,
                stderr,
                return_value: None,
                error: Some(ExecutionError::Timeout {
                    limit_ns: timeout_ns,
                }),
                duration_ns: 0,
            }
        }
        TimedRun::Crashed(message) => {
            let (stdout, stderr) = output.into_strings();
            ExecutionResult {
                stdout,
                stderr,
                return_value: None,
                error: Some(ExecutionError::SandboxFailure { message }),
                duration_ns: 0,
            }
        }
    }
}

pub(crate) fn failure(message: impl Into<String>) -> ExecutionResult {
    ExecutionResult {
        stdout: String::new(),
        stderr: String::new(),
        return_value: None,
        error: Some(ExecutionError::SandboxFailure {
            message: message.into(),
        }),
        duration_ns: 0,
    }
}
