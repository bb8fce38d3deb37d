// crates/codegrade/benches/grading_bench.rs
//
// Criterion benchmark groups:
//   resolve       : entry-point resolution, textual vs syntax strategy
//   grade_request : a 5-case request end to end, thread vs pooled backend

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use codegrade::{
    resolve_entry_point, CodeGradingRequest, ExecutionSettings, Grader, InterpreterPool,
    Isolation, ResolverStrategy, RunMode, TestCase,
};
use std::time::Duration;

const SUBMISSION: &str = concat!(
    "import math\n",
    "\n",
    "# helper used by the entry point\n",
    "def is_prime(n):\n",
    "    if n < 2:\n",
    "        return False\n",
    "    for d in range(2, int(math.sqrt(n)) + 1):\n",
    "        if n % d == 0:\n",
    "            return False\n",
    "    return True\n",
    "\n",
    "def primes_below(limit):\n",
    "    return [n for n in range(limit) if is_prime(n)]\n",
);

fn request() -> CodeGradingRequest {
    let cases = [
        ("10", "[2, 3, 5, 7]"),
        ("2", "[]"),
        ("20", "[2, 3, 5, 7, 11, 13, 17, 19]"),
        ("3", "[2]"),
        ("12", "[2, 3, 5, 7, 11]"),
    ]
    .into_iter()
    .map(|(input, output)| TestCase::new(input, output))
    .collect();
    CodeGradingRequest::new(SUBMISSION, cases, RunMode::Submit)
}

fn resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");
    for strategy in [ResolverStrategy::Textual, ResolverStrategy::Syntax] {
        group.bench_function(strategy.as_str(), |b| {
            b.iter(|| resolve_entry_point(black_box(SUBMISSION), strategy))
        });
    }
    group.finish();
}

fn grade_request(c: &mut Criterion) {
    let request = request();
    let mut group = c.benchmark_group("grade_request");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(20));

    for isolation in [Isolation::Thread, Isolation::Pooled] {
        if isolation == Isolation::Pooled {
            // Warm the pool outside the measurement.
            let _ = InterpreterPool::global();
        }
        let grader = Grader::new(
            ExecutionSettings {
                isolation,
                ..ExecutionSettings::default()
            },
            ResolverStrategy::Textual,
        );
        group.bench_function(isolation.as_str(), |b| {
            b.iter(|| {
                let report = grader.grade(black_box(&request));
                assert!(report.all_passed);
                report
            })
        });
    }
    group.finish();
}

criterion_group!(benches, resolve, grade_request);
criterion_main!(benches);
