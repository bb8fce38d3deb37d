// codegrade: grade Python submissions against test cases in an embedded RustPython VM.

pub mod cache;
pub mod compare;
pub mod config;
pub mod error;
pub mod grader;
pub mod harness;
pub mod model;
pub mod modules;
pub mod output;
pub mod pool;
pub mod report;
pub mod resolver;
pub mod sandbox;
pub mod timeout;
pub mod types;
pub(crate) mod vm;
pub mod worker;

pub use cache::ResolutionCache;
pub use compare::outputs_match;
pub use config::GraderConfig;
pub use error::{ConfigError, GradingError, ResolutionError, WorkerError};
pub use grader::{grade, Grader};
pub use model::{
    CaseError, CodeGradingRequest, ExecutionOutcome, GradingReport, ReportBody, RequestFailure,
    RunMode, TestCase, Verdict,
};
pub use output::OutputBuffer;
pub use pool::InterpreterPool;
pub use report::{collect_logs, render_transcript};
pub use resolver::{resolve_entry_point, ResolverStrategy};
pub use sandbox::execute_case;
pub use types::{
    ExecutionError, ExecutionResult, ExecutionSettings, Isolation, DEFAULT_ALLOWED_MODULES,
};
