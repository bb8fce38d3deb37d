use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::warn;

/// Stack size for threads that host an interpreter. Deep Python recursion
/// must hit `RecursionError` before the native stack runs out.
pub const VM_STACK_SIZE: usize = 32 * 1024 * 1024;

/// How long an interrupted run gets to unwind before it is abandoned.
pub const INTERRUPT_GRACE: Duration = Duration::from_secs(1);

const INTERRUPT_POLL: Duration = Duration::from_millis(5);

/// How a deadline-bounded run ended.
#[derive(Debug, PartialEq, Eq)]
pub enum TimedRun<T> {
    Completed(T),
    /// The deadline passed. The run was interrupted and has unwound, or it
    /// ignored the interrupt for [`INTERRUPT_GRACE`] and was abandoned.
    TimedOut,
    /// The thread could not be spawned or panicked before returning.
    Crashed(String),
}

/// Run `f` on a new thread named `name` and wait at most `timeout_ns`.
///
/// Past the deadline `interrupt` is called repeatedly until `f` returns. The
/// interpreter turns an interrupt into a `TimeoutError` at its next
/// instruction, so Python code stops promptly; only a long native call or
/// code that keeps swallowing the error outlives the grace period, and that
/// thread is then left behind. The subprocess backend kills even those.
pub fn run_with_timeout<F, T, I>(name: &str, f: F, timeout_ns: u64, interrupt: I) -> TimedRun<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
    I: FnMut(),
{
    let (tx, rx) = mpsc::channel::<T>();

    let spawned = thread::Builder::new()
        .name(name.to_string())
        .stack_size(VM_STACK_SIZE)
        .spawn(move || {
            let result = f();
            // The receiver is gone if the run was abandoned.
            let _ = tx.send(result);
        });
    if let Err(err) = spawned {
        return TimedRun::Crashed(format!("failed to spawn execution thread: {err}"));
    }

    wait_with_interrupt(
        &rx,
        Duration::from_nanos(timeout_ns),
        interrupt,
        "execution thread panicked",
    )
}

/// Wait up to `timeout` for a result on `rx`; past it, call `interrupt` every
/// few milliseconds until the run reports back or the grace period ends.
/// `lost` describes a run whose sender vanished before the deadline.
pub fn wait_with_interrupt<T, I>(
    rx: &Receiver<T>,
    timeout: Duration,
    mut interrupt: I,
    lost: &str,
) -> TimedRun<T>
where
    I: FnMut(),
{
    match rx.recv_timeout(timeout) {
        Ok(result) => return TimedRun::Completed(result),
        Err(RecvTimeoutError::Disconnected) => return TimedRun::Crashed(lost.to_string()),
        Err(RecvTimeoutError::Timeout) => {}
    }

    let grace_end = Instant::now() + INTERRUPT_GRACE;
    loop {
        interrupt();
        match rx.recv_timeout(INTERRUPT_POLL) {
            Ok(_) | Err(RecvTimeoutError::Disconnected) => return TimedRun::TimedOut,
            Err(RecvTimeoutError::Timeout) if Instant::now() >= grace_end => {
                warn!("interrupted run did not stop, abandoning it");
                return TimedRun::TimedOut;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
}
