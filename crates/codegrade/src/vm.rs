//! RustPython integration: interpreter construction and harness execution.
//!
//! Everything that touches the RustPython API lives here:
//! - [`build_interpreter`] creates an interpreter with the native stdlib.
//! - [`run_code`] installs the import hook and the case's output sink,
//!   compiles the harness, runs it in a fresh `__main__` scope and extracts
//!   the result or a structured error.
//!
//! ## Import hook
//!
//! `builtins.__import__` is replaced by a native function that applies the
//! allowlist to every import that does not come from a real module (a module
//! whose `__dict__` is registered in `sys.modules` under its `__name__`).
//! Submission code runs as `__main__`, so its imports are always checked while
//! stdlib internals may import their own dependencies. The hook is installed
//! inside `enter()` because `builtins.__import__` only exists after
//! `vm.initialize()`.
//!
//! ## Output capture
//!
//! `sys.stdout` / `sys.stderr` and their `__stdout__` / `__stderr__`
//! originals are replaced with minimal objects whose `write(s)` forwards to
//! the case's [`OutputBuffer`], so restoring "the real" stream still writes
//! into the capture.
//!
//! ## Interrupts
//!
//! Each interpreter owns a user signal channel. The frame loop polls it before
//! every instruction, which is how [`RunInterrupt`] raises `TimeoutError`
//! inside a run that overstays its deadline.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use rustpython_vm::{
    builtins::PyBaseExceptionRef,
    compiler::Mode,
    function::FuncArgs,
    scope::Scope,
    signal::{user_signal_channel, UserSignalSender},
    AsObject, Interpreter, PyObjectRef, PyResult, TryFromObject, VirtualMachine,
};

use crate::harness::RESULT_VAR;
use crate::modules::is_module_allowed;
use crate::output::{OutputBuffer, Stream, WriteRefused};
use crate::types::ExecutionError;

/// Sentinel prefix of the `ImportError` raised by the hook.
const DENIED_PREFIX: &str = "ModuleNotAllowed:";

/// Where the real `__import__` is parked on first hook installation.
const SAVED_IMPORT_ATTR: &str = "__codegrade_original_import__";

/// What one harness run produced, before timing and limit post-processing.
pub(crate) struct VmRunResult {
    pub stdout: String,
    pub stderr: String,
    pub return_value: Option<String>,
    pub error: Option<ExecutionError>,
}

/// Builtins removed from every interpreter: they reach the filesystem
/// without an import.
const REMOVED_BUILTINS: &[&str] = &["open"];

/// `sys` lists that are mutated in place rather than rebound.
const SYS_LISTS: &[&str] = &["path", "meta_path", "path_hooks"];

/// An interpreter bundled with the allowlist its import hook enforces.
pub(crate) struct PyInterp {
    inner: Interpreter,
    allowed_set: Arc<HashSet<String>>,
    signals: UserSignalSender,
}

/// Deadline interrupt for one harness run.
///
/// [`run_code`] attaches the interpreter's signal sender for the duration of
/// the run. [`interrupt`](RunInterrupt::interrupt) queues a `TimeoutError`
/// that the interpreter raises before its next instruction. Signals that are
/// still queued when the run ends do nothing, and a run interrupted before it
/// started never executes.
pub(crate) struct RunInterrupt {
    state: Mutex<InterruptState>,
}

#[derive(Default)]
struct InterruptState {
    requested: bool,
    active: bool,
    sender: Option<UserSignalSender>,
}

impl RunInterrupt {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(InterruptState::default()),
        })
    }

    /// Ask the run to stop.
    ///
    /// The "signal pending" flag is process-wide and any interpreter may
    /// consume it, so callers repeat this until the run reports back.
    pub(crate) fn interrupt(self: &Arc<Self>) {
        let mut state = self.state.lock().expect("run interrupt poisoned");
        state.requested = true;
        if !state.active {
            return;
        }
        let Some(sender) = state.sender.as_ref() else {
            return;
        };
        let target = Arc::clone(self);
        let _ = sender.send(Box::new(move |vm: &VirtualMachine| -> PyResult<()> {
            if target.is_active() {
                Err(vm.new_exception_msg(
                    vm.ctx.exceptions.timeout_error.to_owned(),
                    "execution timed out".to_owned(),
                ))
            } else {
                Ok(())
            }
        }));
    }

    fn is_active(&self) -> bool {
        self.state.lock().expect("run interrupt poisoned").active
    }

    /// `false` when the run was interrupted before it started.
    fn attach(&self, sender: UserSignalSender) -> bool {
        let mut state = self.state.lock().expect("run interrupt poisoned");
        if state.requested {
            return false;
        }
        state.active = true;
        state.sender = Some(sender);
        true
    }

    fn detach(&self) {
        let mut state = self.state.lock().expect("run interrupt poisoned");
        state.active = false;
        state.sender = None;
    }
}

/// Shallow copy of the interpreter state a run can rebind: the builtins,
/// every module namespace loaded at warm-up, `sys.modules` itself, the
/// [`SYS_LISTS`] and the recursion limit. Objects reachable through those
/// namespaces are not deep-copied.
pub(crate) struct InterpSnapshot {
    /// (live dict, copy)
    namespaces: Vec<(PyObjectRef, PyObjectRef)>,
    /// (live list, copy)
    lists: Vec<(PyObjectRef, PyObjectRef)>,
    recursion_limit: usize,
}

impl PyInterp {
    /// Replace the allowlist; picked up by the next [`run_code`].
    pub(crate) fn set_allowed_set(&mut self, allowed_set: Arc<HashSet<String>>) {
        self.allowed_set = allowed_set;
    }

    pub(crate) fn snapshot(&self) -> InterpSnapshot {
        self.inner.enter(|vm| {
            let mut namespaces = Vec::new();
            let mut save = |live: PyObjectRef| {
                if let Ok(copy) = vm.call_method(&live, "copy", ()) {
                    namespaces.push((live, copy));
                }
            };

            save(vm.builtins.dict().into());
            if let Ok(modules) = vm.sys_module.get_attr("modules", vm) {
                for module in iterate(vm, &modules, "values") {
                    if let Ok(dict) = module.get_attr("__dict__", vm) {
                        save(dict);
                    }
                }
                save(modules);
            }

            let lists = SYS_LISTS
                .iter()
                .filter_map(|name| {
                    let live = vm.sys_module.get_attr(*name, vm).ok()?;
                    let copy = vm.call_method(&live, "copy", ()).ok()?;
                    Some((live, copy))
                })
                .collect();

            InterpSnapshot {
                namespaces,
                lists,
                recursion_limit: vm.recursion_limit.get(),
            }
        })
    }

    /// Put back everything `snapshot` recorded. Modules first loaded after
    /// the snapshot drop out of `sys.modules`.
    pub(crate) fn restore(&self, snapshot: &InterpSnapshot) {
        self.inner.enter(|vm| {
            for (live, copy) in &snapshot.namespaces {
                let _ = vm.call_method(live, "clear", ());
                let _ = vm.call_method(live, "update", (copy.clone(),));
            }
            for (live, copy) in &snapshot.lists {
                let _ = vm.call_method(live, "clear", ());
                let _ = vm.call_method(live, "extend", (copy.clone(),));
            }
            vm.recursion_limit.set(snapshot.recursion_limit);
        })
    }
}

/// Items of `obj.<method>()`; empty when anything fails.
fn iterate(vm: &VirtualMachine, obj: &PyObjectRef, method: &str) -> Vec<PyObjectRef> {
    let Ok(view) = vm.call_method(obj, method, ()) else {
        return Vec::new();
    };
    let Ok(iter) = vm.call_method(&view, "__iter__", ()) else {
        return Vec::new();
    };
    let mut items = Vec::new();
    // Ends on StopIteration.
    while let Ok(item) = vm.call_method(&iter, "__next__", ()) {
        items.push(item);
    }
    items
}

/// Host directories holding a CPython 3.x standard library. RustPython can
/// run the pure-Python modules from there (`collections`, `functools`, ...);
/// the native modules registered below shadow any C extensions.
fn python_stdlib_paths() -> Vec<String> {
    [
        "/usr/local/lib/python3.13",
        "/usr/local/lib/python3.12",
        "/usr/local/lib/python3.11",
        "/usr/local/lib/python3.10",
        "/usr/lib/python3.12",
        "/usr/lib/python3.11",
        "/usr/lib/python3.10",
        "/usr/lib/python3",
    ]
    .iter()
    .filter(|p| std::path::Path::new(p).is_dir())
    .map(|p| p.to_string())
    .collect()
}

/// Create an interpreter with the native stdlib and host stdlib paths.
pub(crate) fn build_interpreter(allowed_set: Arc<HashSet<String>>) -> PyInterp {
    let mut settings = rustpython_vm::Settings::default();
    settings.path_list.extend(python_stdlib_paths());

    let (signals, signal_rx) = user_signal_channel();
    let inner = Interpreter::with_init(settings, |vm| {
        vm.add_native_modules(rustpython_stdlib::get_module_inits());
        vm.set_user_signal_channel(signal_rx);
    });
    inner.enter(|vm| {
        for name in REMOVED_BUILTINS {
            let _ = vm.builtins.as_object().del_attr(*name, vm);
        }
    });

    PyInterp {
        inner,
        allowed_set,
        signals,
    }
}

/// Run one harness in a fresh `__main__` scope of `interp`, interruptible
/// through `interrupt`.
pub(crate) fn run_code(
    interp: &PyInterp,
    harness: &str,
    output: OutputBuffer,
    interrupt: &RunInterrupt,
) -> VmRunResult {
    if !interrupt.attach(interp.signals.clone()) {
        let (stdout, stderr) = output.into_strings();
        return VmRunResult {
            stdout,
            stderr,
            return_value: None,
            error: Some(ExecutionError::RuntimeError {
                message: "execution interrupted before it started".to_owned(),
                traceback: String::new(),
            }),
        };
    }
    let result = run_attached(interp, harness, output);
    interrupt.detach();
    result
}

fn run_attached(interp: &PyInterp, harness: &str, output: OutputBuffer) -> VmRunResult {
    let allowed_set = Arc::clone(&interp.allowed_set);

    interp.inner.enter(|vm| {
        install_import_hook(vm, &allowed_set);
        install_output_capture(vm, &output);

        let finish = |return_value: Option<String>, error: Option<ExecutionError>| {
            let (stdout, stderr) = output.clone().into_strings();
            VmRunResult {
                stdout,
                stderr,
                return_value,
                error,
            }
        };

        let code = match vm.compile(harness, Mode::Exec, "<submission>".to_owned()) {
            Ok(code) => code,
            Err(err) => return finish(None, Some(extract_syntax_error(err))),
        };

        let scope = vm.new_scope_with_builtins();
        let _ = scope
            .globals
            .set_item("__name__", vm.ctx.new_str("__main__").into(), vm);

        match vm.run_code_obj(code, scope.clone()) {
            Ok(_) => finish(extract_result(vm, &scope), None),
            Err(exc) => {
                let error = extract_module_not_allowed(vm, &exc)
                    .unwrap_or_else(|| extract_runtime_error(vm, &exc));
                finish(None, Some(error))
            }
        }
    })
}

/// `true` when the importing globals belong to a module registered in
/// `sys.modules`. Anything else (submission code, `exec` with a fresh dict,
/// calls without a frame) is subject to the allowlist.
fn is_trusted_module_import(args: &FuncArgs, vm: &VirtualMachine) -> bool {
    let Some(globals) = args.args.get(1) else {
        return false;
    };
    if vm.is_none(globals) {
        return false;
    }
    let name = match vm.call_method(globals, "get", (vm.ctx.new_str("__name__"),)) {
        Ok(name) if !vm.is_none(&name) => name,
        _ => return false,
    };
    let Ok(name) = name.str(vm) else {
        return false;
    };
    if name.as_str() == "__main__" {
        return false;
    }
    let Ok(modules) = vm.sys_module.get_attr("modules", vm) else {
        return false;
    };
    let module = match vm.call_method(&modules, "get", (name,)) {
        Ok(module) if !vm.is_none(&module) => module,
        _ => return false,
    };
    module
        .get_attr("__dict__", vm)
        .map(|dict| dict.is(globals))
        .unwrap_or(false)
}

fn install_import_hook(vm: &VirtualMachine, allowed_set: &Arc<HashSet<String>>) {
    // Always delegate to the real import, never to a hook left behind by an
    // earlier run on a pooled interpreter.
    let original_import = match vm.builtins.get_attr(SAVED_IMPORT_ATTR, vm) {
        Ok(saved) => saved,
        Err(_) => {
            let Ok(real) = vm.builtins.get_attr("__import__", vm) else {
                return;
            };
            let _ = vm.builtins.set_attr(SAVED_IMPORT_ATTR, real.clone(), vm);
            real
        }
    };

    // PyObjectRef is not Send + Sync, but the hook only ever runs on this VM's
    // thread.
    #[allow(clippy::arc_with_non_send_sync)]
    let original_import = Arc::new(original_import);
    let allowed_set = Arc::clone(allowed_set);

    let hook = vm.new_function(
        "__import__",
        move |args: FuncArgs, vm: &VirtualMachine| -> PyResult<PyObjectRef> {
            // __import__(name, globals=None, locals=None, fromlist=(), level=0)
            let module_name: String = args
                .args
                .first()
                .and_then(|o| o.str(vm).ok())
                .map(|s| s.as_str().to_owned())
                .unwrap_or_default();
            let level = args
                .args
                .get(4)
                .and_then(|o| i64::try_from_object(vm, o.clone()).ok())
                .unwrap_or(0);

            // Relative imports cannot escape: submission code has no package.
            if level == 0
                && !is_trusted_module_import(&args, vm)
                && !is_module_allowed(&module_name, &allowed_set)
            {
                return Err(vm.new_import_error(
                    format!("{DENIED_PREFIX}{module_name}"),
                    vm.ctx.new_str(module_name),
                ));
            }

            original_import.call(args, vm)
        },
    );

    let _ = vm.builtins.set_attr("__import__", hook, vm);
}

fn install_output_capture(vm: &VirtualMachine, output: &OutputBuffer) {
    let stdout = build_writer_object(vm, output.clone(), Stream::Stdout);
    let stderr = build_writer_object(vm, output.clone(), Stream::Stderr);
    let _ = vm.sys_module.set_attr("stdout", stdout.clone(), vm);
    let _ = vm.sys_module.set_attr("__stdout__", stdout, vm);
    let _ = vm.sys_module.set_attr("stderr", stderr.clone(), vm);
    let _ = vm.sys_module.set_attr("__stderr__", stderr, vm);
}

/// A namespace object with `write(s)`, `flush()`, `closed` and `encoding`,
/// enough for `print()` and most code that touches `sys.stdout` directly.
fn build_writer_object(vm: &VirtualMachine, output: OutputBuffer, stream: Stream) -> PyObjectRef {
    let write_fn = vm.new_function(
        "write",
        move |args: FuncArgs, vm: &VirtualMachine| -> PyResult<PyObjectRef> {
            let data: String = args
                .args
                .first()
                .and_then(|o| o.str(vm).ok())
                .map(|s| s.as_str().to_owned())
                .unwrap_or_default();

            match output.write(stream, data.as_bytes()) {
                Ok(()) => Ok(vm.ctx.new_int(data.chars().count()).into()),
                Err(WriteRefused::Limit(err)) => Err(vm.new_runtime_error(err.to_string())),
                Err(WriteRefused::Cancelled) => {
                    Err(vm.new_runtime_error("execution cancelled".to_owned()))
                }
            }
        },
    );

    let flush_fn = vm.new_function(
        "flush",
        |_args: FuncArgs, vm: &VirtualMachine| -> PyResult<PyObjectRef> { Ok(vm.ctx.none()) },
    );

    let ns = vm.new_module("<writer>", vm.ctx.new_dict(), None);
    let _ = ns.set_attr("write", write_fn, vm);
    let _ = ns.set_attr("flush", flush_fn, vm);
    let _ = ns.set_attr("closed", vm.ctx.new_bool(false), vm);
    let _ = ns.set_attr("encoding", vm.ctx.new_str("utf-8"), vm);
    ns.into()
}

fn extract_syntax_error(err: rustpython_vm::compiler::CompileError) -> ExecutionError {
    let (line, col) = err.python_location();
    ExecutionError::SyntaxError {
        message: err.to_string(),
        line: line as u32,
        col: col as u32,
    }
}

fn extract_module_not_allowed(
    vm: &VirtualMachine,
    exc: &PyBaseExceptionRef,
) -> Option<ExecutionError> {
    let msg = exc.as_object().str(vm).ok()?;
    msg.as_str()
        .strip_prefix(DENIED_PREFIX)
        .map(|name| ExecutionError::ModuleNotAllowed {
            module_name: name.to_string(),
        })
}

fn extract_runtime_error(vm: &VirtualMachine, exc: &PyBaseExceptionRef) -> ExecutionError {
    let message = exc
        .as_object()
        .str(vm)
        .map(|s| s.as_str().to_owned())
        .unwrap_or_else(|_| "unknown runtime error".to_owned());

    // String implements rustpython's py_io::Write.
    let mut traceback = String::new();
    let _ = vm.write_exception(&mut traceback, exc);

    ExecutionError::RuntimeError { message, traceback }
}

/// `str()` of the harness result variable; `None` becomes `"None"` like the
/// value the submission actually returned.
fn extract_result(vm: &VirtualMachine, scope: &Scope) -> Option<String> {
    let globals: PyObjectRef = scope.globals.clone().into();
    let value = vm
        .call_method(&globals, "get", (vm.ctx.new_str(RESULT_VAR),))
        .ok()?;
    value.str(vm).ok().map(|s| s.as_str().to_owned())
}
