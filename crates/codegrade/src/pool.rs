//! Pre-warmed interpreter pool for the `pooled` isolation backend.
//!
//! ## Design
//!
//! Each slot is a dedicated OS thread that:
//! 1. Builds one `PyInterp` at startup.
//! 2. Blocks on a `Receiver<WorkItem>`.
//! 3. Runs each harness in a fresh `__main__` scope, restores the snapshot
//!    taken at warm-up (builtins, module namespaces, `sys.modules`, `sys`
//!    lists, recursion limit), sends the `VmRunResult` back and returns itself
//!    to the idle queue.
//!
//! `PyInterp` is not `Send`; it never leaves its slot thread. Only the
//! `SyncSender<WorkItem>` end crosses threads.
//!
//! ## Pool size
//!
//! Read from `CODEGRADE_POOL_SIZE` on the first [`InterpreterPool::global`]
//! call. Default: 4.
//!
//! ## Timeout handling
//!
//! At the deadline the caller interrupts the run through the item's
//! [`RunInterrupt`]; the harness unwinds with `TimeoutError` and the slot
//! rejoins the queue. A harness that ignores the interrupt keeps its slot,
//! which shrinks the pool; [`InterpreterPool::dispatch_work`] then reports
//! exhaustion and the sandbox falls back to a fresh interpreter thread.

use std::collections::{HashSet, VecDeque};
use std::sync::mpsc::{self, SyncSender};
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::output::OutputBuffer;
use crate::timeout::VM_STACK_SIZE;
use crate::types::DEFAULT_ALLOWED_MODULES;
use crate::vm::{build_interpreter, run_code, RunInterrupt, VmRunResult};

/// Default slot count when `CODEGRADE_POOL_SIZE` is unset or invalid.
pub const DEFAULT_POOL_SIZE: usize = 4;

type SlotQueue = Arc<(Mutex<VecDeque<SyncSender<WorkItem>>>, Condvar)>;

/// One harness run handed to a slot thread. Every field is `Send`.
pub(crate) struct WorkItem {
    pub harness: String,
    pub output: OutputBuffer,
    /// Allowlist for this run; may differ from the slot's previous run.
    pub allowed_set: Arc<HashSet<String>>,
    pub interrupt: Arc<RunInterrupt>,
    pub response: SyncSender<VmRunResult>,
}

/// Start one slot thread; it pushes its sender onto `queue` once warm.
fn start_slot_thread(slot_id: usize, queue: SlotQueue) -> std::io::Result<()> {
    let (tx, rx) = mpsc::sync_channel::<WorkItem>(1);

    std::thread::Builder::new()
        .name(format!("codegrade-pool-slot-{slot_id}"))
        .stack_size(VM_STACK_SIZE)
        .spawn(move || {
            let default_set: HashSet<String> = DEFAULT_ALLOWED_MODULES
                .iter()
                .map(|s| s.to_string())
                .collect();
            let mut interp = build_interpreter(Arc::new(default_set));
            let snapshot = interp.snapshot();
            debug!(slot_id, "pool slot ready");

            release_slot(&queue, &tx);

            while let Ok(item) = rx.recv() {
                interp.set_allowed_set(item.allowed_set);
                let result = run_code(&interp, &item.harness, item.output, &item.interrupt);
                interp.restore(&snapshot);

                // Err means the caller gave up waiting.
                if item.response.send(result).is_err() {
                    debug!(slot_id, "pool result discarded after caller timeout");
                }

                release_slot(&queue, &tx);
            }
        })?;

    Ok(())
}

fn release_slot(queue: &SlotQueue, tx: &SyncSender<WorkItem>) {
    let (lock, cvar) = &**queue;
    let mut idle = lock.lock().expect("pool slot queue poisoned");
    idle.push_back(tx.clone());
    cvar.notify_one();
}

/// Fixed-size pool of pre-warmed RustPython interpreters.
pub struct InterpreterPool {
    available: SlotQueue,
    size: usize,
}

impl InterpreterPool {
    /// Start `size` slots (at least 1) and block until each one is warm.
    ///
    /// A slot whose thread cannot be spawned is logged and skipped; the pool
    /// then runs with fewer slots, possibly none.
    pub fn new(size: usize) -> Self {
        let target = size.max(1);
        let available: SlotQueue = Arc::new((
            Mutex::new(VecDeque::with_capacity(target)),
            Condvar::new(),
        ));

        let mut started = 0;
        for slot_id in 0..target {
            match start_slot_thread(slot_id, Arc::clone(&available)) {
                Ok(()) => started += 1,
                Err(err) => warn!(slot_id, error = %err, "failed to spawn pool slot"),
            }
        }

        {
            let (lock, cvar) = &*available;
            let mut idle = lock.lock().expect("pool queue poisoned");
            while idle.len() < started {
                idle = cvar.wait(idle).expect("pool condvar poisoned");
            }
        }

        debug!(size = started, "interpreter pool warmed");
        InterpreterPool {
            available,
            size: started,
        }
    }

    /// The process-global pool, sized by `CODEGRADE_POOL_SIZE` at first use.
    pub fn global() -> &'static InterpreterPool {
        static INSTANCE: OnceLock<InterpreterPool> = OnceLock::new();
        INSTANCE.get_or_init(|| {
            let size = std::env::var("CODEGRADE_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_POOL_SIZE);
            InterpreterPool::new(size)
        })
    }

    /// Hand `work` to an idle slot, waiting at most `checkout_timeout`.
    ///
    /// Returns `false` when no slot became idle in time; `work` is dropped and
    /// the caller should run the harness elsewhere.
    pub(crate) fn dispatch_work(&self, work: WorkItem, checkout_timeout: Duration) -> bool {
        let (lock, cvar) = &*self.available;
        let deadline = Instant::now() + checkout_timeout;

        let slot_tx = {
            let mut idle = lock.lock().expect("pool queue poisoned");
            loop {
                if let Some(tx) = idle.pop_front() {
                    break tx;
                }
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return false;
                }
                idle = cvar
                    .wait_timeout(idle, remaining)
                    .expect("pool condvar poisoned")
                    .0;
            }
        };

        // An idle slot is blocked in recv(), so this does not wait.
        slot_tx.send(work).is_ok()
    }

    /// Number of slots waiting for work.
    pub fn idle_count(&self) -> usize {
        let (lock, _) = &*self.available;
        lock.lock().expect("pool queue poisoned").len()
    }

    /// Number of slots that started.
    pub fn size(&self) -> usize {
        self.size
    }
}
