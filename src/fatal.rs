//! Last-resort exit path for infrastructure errors.

use std::fmt::Display;

/// Prints the error banner to stderr and terminates the process.
///
/// Test verdicts never travel this path. It is reserved for defects in the
/// grading infrastructure itself: registration collisions, isolate plumbing
/// failures, a body reporting an internal error, bad invocations. Nothing
/// is cleaned up; an autograder that cannot trust its own machinery has no
/// business writing a report.
pub fn emergency_abort(error: impl Display) -> ! {
    eprintln!("===========================");
    eprintln!("= Internal Error Occurred =");
    eprintln!("===========================");
    eprintln!();
    eprintln!("Error: {error}");
    eprintln!("Aborting.");
    std::process::abort();
}
