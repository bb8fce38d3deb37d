//! Subprocess isolation: the `codegrade worker` protocol.
//!
//! The parent writes one JSON [`WorkerRequest`] to the child's stdin and
//! closes it. The child runs the harness with [`serve`] and, once the run is
//! over, prints one line: [`RESULT_PREFIX`] followed by a JSON
//! [`ExecutionResult`]. The parent takes the last such line, so bytes the
//! submission pushed straight to file descriptor 1 cannot stand in for the
//! result. A child still running past the deadline is killed, so a runaway
//! case never outlives its test.
//!
//! The child enforces the case deadline itself and reports partial output in
//! its result. The parent's kill is the backstop; it keeps whatever the child
//! had written to stdout.
//!
//! The child starts with an empty environment in the system temp directory.

use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::WorkerError;
use crate::sandbox::{failure, run_in_thread};
use crate::timeout::INTERRUPT_GRACE;
use crate::types::{ExecutionError, ExecutionResult, ExecutionSettings};

/// Marks the worker's result line on stdout.
pub const RESULT_PREFIX: &str = "codegrade-result:";

/// Extra wall time granted to the child for process startup, on top of the
/// case deadline and the child's own interrupt grace.
const STARTUP_GRACE: Duration = Duration::from_millis(1_500);

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// What the parent sends the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub harness: String,
    pub timeout_ns: u64,
    pub max_output_bytes: usize,
    pub allowed_modules: Vec<String>,
}

impl WorkerRequest {
    pub fn new(harness: &str, settings: &ExecutionSettings) -> Self {
        Self {
            harness: harness.to_owned(),
            timeout_ns: settings.timeout_ns,
            max_output_bytes: settings.max_output_bytes,
            allowed_modules: settings.allowed_modules.clone(),
        }
    }
}

/// Worker side: read one request from `input`, write one result to `output`.
pub fn serve<R: Read, W: Write>(mut input: R, mut output: W) -> Result<(), WorkerError> {
    let mut raw = Vec::new();
    input.read_to_end(&mut raw)?;
    let request: WorkerRequest = serde_json::from_slice(&raw)?;

    let allowed_set = Arc::new(request.allowed_modules.iter().cloned().collect());
    let result = run_in_thread(
        &request.harness,
        request.max_output_bytes,
        allowed_set,
        request.timeout_ns,
    );

    output.write_all(RESULT_PREFIX.as_bytes())?;
    serde_json::to_writer(&mut output, &result)?;
    output.write_all(b"\n")?;
    output.flush()?;
    Ok(())
}

/// Parent side: run `request` in `<program> worker`.
pub fn run_in_subprocess(program: &Path, request: &WorkerRequest) -> ExecutionResult {
    let payload = match serde_json::to_vec(request) {
        Ok(payload) => payload,
        Err(err) => return failure(format!("failed to encode worker request: {err}")),
    };

    let mut child = match Command::new(program)
        .arg("worker")
        .env_clear()
        .current_dir(std::env::temp_dir())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            return failure(format!(
                "failed to spawn worker {}: {err}",
                program.display()
            ))
        }
    };
    debug!(pid = child.id(), "worker spawned");

    let stdout_reader = child.stdout.take().map(spawn_reader);
    let stderr_reader = child.stderr.take().map(spawn_reader);

    if let Some(mut stdin) = child.stdin.take() {
        // A child that dies before reading shows up below as a bad exit.
        if let Err(err) = stdin.write_all(&payload) {
            warn!(error = %err, "failed to send request to worker");
        }
    }

    let deadline = Duration::from_nanos(request.timeout_ns) + INTERRUPT_GRACE + STARTUP_GRACE;
    let (status, timed_out) = match wait_with_deadline(&mut child, deadline) {
        Ok(waited) => waited,
        Err(err) => return failure(format!("failed to wait for worker: {err}")),
    };

    let stdout = join_reader(stdout_reader);
    let stderr = join_reader(stderr_reader);

    if timed_out {
        warn!(
            limit_ns = request.timeout_ns,
            worker_stderr = %String::from_utf8_lossy(&stderr).trim(),
            "worker killed at deadline"
        );
        return ExecutionResult {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::new(),
            return_value: None,
            error: Some(ExecutionError::Timeout {
                limit_ns: request.timeout_ns,
            }),
            duration_ns: 0,
        };
    }

    if !status.success() {
        let detail = String::from_utf8_lossy(&stderr);
        return failure(format!("worker exited with {status}: {}", detail.trim()));
    }

    parse_response(&stdout)
}

/// Decode the last [`RESULT_PREFIX`] line of the worker's stdout.
fn parse_response(stdout: &[u8]) -> ExecutionResult {
    let line = stdout
        .split(|&b| b == b'\n')
        .rev()
        .find_map(|line| line.strip_prefix(RESULT_PREFIX.as_bytes()));
    let Some(line) = line else {
        return failure("malformed worker response: no result line");
    };
    match serde_json::from_slice::<ExecutionResult>(line) {
        Ok(result) => result,
        Err(err) => failure(format!("malformed worker response: {err}")),
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join_reader(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Poll until `child` exits or `limit` elapses; kill it in the latter case.
/// Returns the exit status and whether the deadline was hit.
fn wait_with_deadline(child: &mut Child, limit: Duration) -> std::io::Result<(ExitStatus, bool)> {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((status, false));
        }
        if Instant::now() >= deadline {
            child.kill().ok();
            let status = child.wait()?;
            return Ok((status, true));
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}
