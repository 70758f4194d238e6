//! # proctor
//!
//! A crash-isolated autograding test runner: it executes unit tests against
//! student-submitted code, survives anything those tests do (segfaults,
//! aborts, infinite loops, stray panics, forged exits), and produces a
//! machine-readable score report for an upstream grading service.
//!
//! ## Overview
//!
//! Proctor provides:
//!
//! - **Process isolation** - every test body runs in a forked child, so no
//!   misbehavior reaches the grading process
//! - **Tamper-resistant verdicts** - outcomes cross a pipe under a per-test
//!   random mask a test body cannot forge
//! - **Weighted, capped scoring** - per-case point weights with optional
//!   per-group caps and proportional rescaling
//! - **Public/private groups** - failure names redacted for private groups,
//!   spelled out for public ones
//! - **Submission prerequisites** - groups skip themselves when a required
//!   file was not submitted
//!
//! ## Architecture
//!
//! The crate is organized into small, leaf-first subsystems:
//!
//! ### Assertions ([`assertions`])
//!
//! The primitives test bodies call: [`pass_test`], [`fail_test`],
//! [`fail_test_visibly`], [`internal_error`], and the [`expect!`] macro.
//! Each unwinds out of the body; the isolate harness classifies the unwind.
//!
//! ### Registry ([`registry`])
//!
//! A static tree of named groups and cases, built once at startup through a
//! closure-scoped builder (or explicit-path [`Registry::install`]) and
//! read-only afterwards.
//!
//! ### Isolate runner ([`isolate`])
//!
//! Forks one child per test, reads the masked verdict back over a pipe
//! under a wall-clock deadline, and classifies silence as a crash or
//! timeout. The hard part of the crate; see the module docs.
//!
//! ### Reporting ([`report`])
//!
//! A tree of result nodes (single case, public group, private group,
//! missing-file placeholder), each with its own aggregation and redaction
//! rules, plus the JSON [`Report`] the grading service consumes.
//!
//! ### Driver ([`driver`])
//!
//! Walks the registry sequentially, invokes the runner per leaf, and
//! assembles the report. The `proctor` binary is a thin CLI over this
//! module.
//!
//! ## Quick start
//!
//! ```no_run
//! use proctor::{driver, expect, registry, report, IsolateRunner};
//! use std::collections::BTreeSet;
//!
//! fn main() -> anyhow::Result<()> {
//!     let tests = registry::global();
//!     tests.group("Arithmetic", |g| {
//!         g.make_public();
//!         g.case("addition still works", || {
//!             expect!(2 + 2 == 4);
//!         });
//!         g.case_worth("multiplication, heavier", 5, || {
//!             expect!(6 * 7 == 42);
//!         });
//!     });
//!
//!     let runner = IsolateRunner::new();
//!     let (report, _results) = driver::run_tests(tests, &runner, &BTreeSet::new())?;
//!     report::write_report(&report, std::path::Path::new("results.json"))?;
//!     Ok(())
//! }
//! ```

pub mod assertions;
pub mod driver;
pub mod fatal;
pub mod isolate;
pub mod outcome;
pub mod registry;
pub mod report;

// Re-export the types most grading suites touch.

pub use assertions::{fail_test, fail_test_visibly, internal_error, pass_test};
pub use isolate::IsolateRunner;
pub use outcome::{Outcome, Points, Score};
pub use registry::{Registry, Visibility};
pub use report::{Report, ReportEntry, ResultNode};
