//! codegrade CLI: grade a request from a file or stdin and print the report.

use std::io::{self, Read};
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use codegrade::resolver::ResolverStrategy;
use codegrade::{CodeGradingRequest, Grader, GraderConfig, Isolation, RunMode};

#[derive(Parser)]
#[command(
    name = "codegrade",
    version,
    about = "Grade Python submissions against input/output test cases"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade a request and print the report as JSON
    Grade {
        /// Request JSON file (default: stdin)
        #[arg(long)]
        request: Option<PathBuf>,

        /// Override the request's mode: run or submit
        #[arg(long)]
        mode: Option<RunMode>,

        /// Config file path (default: ./codegrade.toml if present)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Isolation backend: thread, pooled or subprocess (default: subprocess)
        #[arg(long)]
        isolation: Option<Isolation>,

        /// Entry-point resolver: textual or syntax
        #[arg(long)]
        resolver: Option<ResolverStrategy>,

        /// Per-case timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Print the plain transcript instead of JSON (submit mode)
        #[arg(long)]
        transcript: bool,
    },

    /// Run one case for the subprocess backend (internal)
    #[command(hide = true)]
    Worker,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("codegrade=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Grade {
            request,
            mode,
            config,
            isolation,
            resolver,
            timeout_ms,
            transcript,
        } => run_grade(GradeArgs {
            request,
            mode,
            config,
            isolation,
            resolver,
            timeout_ms,
            transcript,
        }),
        Commands::Worker => codegrade::worker::serve(io::stdin().lock(), io::stdout().lock())
            .context("worker failed"),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

struct GradeArgs {
    request: Option<PathBuf>,
    mode: Option<RunMode>,
    config: Option<PathBuf>,
    isolation: Option<Isolation>,
    resolver: Option<ResolverStrategy>,
    timeout_ms: Option<u64>,
    transcript: bool,
}

fn run_grade(args: GradeArgs) -> Result<()> {
    let mut config = GraderConfig::load(args.config.as_deref()).context("failed to load config")?;

    if let Some(isolation) = args.isolation {
        config.sandbox.isolation = Some(isolation);
    }
    if let Some(strategy) = args.resolver {
        config.resolver.strategy = strategy;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.sandbox.timeout_ms = timeout_ms;
    }
    let isolation = *config.sandbox.isolation.get_or_insert(Isolation::Subprocess);
    if isolation == Isolation::Subprocess && config.sandbox.worker_program.is_none() {
        let exe = std::env::current_exe().context("failed to locate the codegrade executable")?;
        config.sandbox.worker_program = Some(exe);
    }
    debug!(?config, "effective configuration");

    let raw = match &args.request {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read request: {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read request from stdin")?;
            buf
        }
    };
    let mut request: CodeGradingRequest =
        serde_json::from_str(&raw).context("failed to parse request JSON")?;
    if let Some(mode) = args.mode {
        request.mode = mode;
    }

    let report = Grader::from_config(&config).grade(&request);

    match report.transcript() {
        Some(transcript) if args.transcript => println!("{transcript}"),
        _ => println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to serialize report")?
        ),
    }
    Ok(())
}
