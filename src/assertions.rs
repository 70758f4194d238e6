//! Primitives test bodies use to signal how they went.
//!
//! Each primitive unwinds out of the test body immediately; none of them
//! return. The isolate's child-side harness catches the unwind and turns it
//! into an [`Outcome`](crate::outcome::Outcome). A body that returns
//! normally counts as a pass, so most tests only ever call [`expect!`] and
//! fall off the end.
//!
//! These functions are only meaningful inside a test body running under the
//! isolate runner. Called anywhere else, the unwind escapes as an ordinary
//! panic.
//!
//! # Example
//!
//! ```no_run
//! use proctor::expect;
//! use proctor::assertions::fail_test;
//!
//! let run = || {
//!     let values: Vec<u32> = student_sort(vec![3, 1, 2]);
//!     expect!(values == [1, 2, 3]);
//!     if values.capacity() > 64 {
//!         fail_test("sorted copy over-allocates");
//!     }
//! };
//! # fn student_sort(v: Vec<u32>) -> Vec<u32> { v }
//! # let _ = run;
//! ```

use std::panic::{Location, panic_any};

/// Payload carried by the unwind a primitive starts.
///
/// The isolate's harness downcasts panic payloads to this type to tell a
/// signalled outcome from a stray panic.
#[derive(Debug, Clone)]
pub(crate) enum TestSignal {
    Passed,
    Failed(String),
    FailedVisibly(String),
    InternalError(String),
}

/// Ends the test immediately with a passing outcome.
pub fn pass_test() -> ! {
    panic_any(TestSignal::Passed)
}

/// Ends the test immediately with a failure.
///
/// The reason and the call site are logged for graders; the student sees
/// only a generic failure phrase.
#[track_caller]
pub fn fail_test(reason: impl Into<String>) -> ! {
    let location = Location::caller();
    panic_any(TestSignal::Failed(format!(
        "{}:{}: {}",
        location.file(),
        location.line(),
        reason.into()
    )))
}

/// Ends the test immediately with a failure whose reason is shown to the
/// student verbatim.
pub fn fail_test_visibly(reason: impl Into<String>) -> ! {
    panic_any(TestSignal::FailedVisibly(reason.into()))
}

/// Reports a defect in the grading setup itself.
///
/// This is never a verdict on the submission: the driver treats it as fatal
/// and aborts the whole run.
#[track_caller]
pub fn internal_error(reason: impl Into<String>) -> ! {
    let location = Location::caller();
    panic_any(TestSignal::InternalError(format!(
        "{}:{}: {}",
        location.file(),
        location.line(),
        reason.into()
    )))
}

/// Implementation detail of [`expect!`]; use the macro instead.
#[doc(hidden)]
pub fn expect_failed(expression: &str, file: &str, line: u32) -> ! {
    panic_any(TestSignal::Failed(format!(
        "{file}:{line}: expect({expression}): condition was false."
    )))
}

/// Fails the test if the condition is false, reporting the stringified
/// condition and its source location to graders.
///
/// ```no_run
/// # use proctor::expect;
/// # let queue: Vec<u32> = vec![];
/// expect!(queue.is_empty());
/// ```
#[macro_export]
macro_rules! expect {
    ($cond:expr) => {
        if !$cond {
            $crate::assertions::expect_failed(stringify!($cond), file!(), line!());
        }
    };
}
