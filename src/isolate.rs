//! Executes one test body in a forked child and recovers its outcome.
//!
//! Test bodies are untrusted: they may segfault, abort, spin forever, call
//! `exit` with a chosen status, or unwind with anything. The runner shields
//! the grading process from all of it by forking a child per test and
//! reading the verdict back over a pipe:
//!
//! ```text
//!   parent                              child
//!     │ pipe(), draw mask byte            │
//!     │ fork() ──────────────────────────►│ run body under catch_unwind
//!     │ poll(read end, deadline)          │ classify unwind → Outcome
//!     │                                   │ write (outcome ^ mask) ++ message
//!     │ ◄─────────────────────────────────│ _exit(0)
//!     │ read to EOF, waitpid
//!     │ decode, or Crash / Timeout
//! ```
//!
//! The outcome byte is XOR-masked with a random byte drawn fresh for every
//! test, before the fork, so both sides share it. A body that bypasses the
//! harness by exiting early, or by scribbling a guessed byte into the pipe,
//! cannot forge a valid verdict, because it does not know the mask. A pipe
//! with no bytes on it is a [`Crash`](Outcome::Crash); a pipe still silent
//! at the deadline is a [`Timeout`](Outcome::Timeout), and the child is
//! killed outright.
//!
//! Each test gets exactly one attempt. The parent blocks only in `poll`
//! (deadline-bounded) and `waitpid`; there is no in-process sandboxing and
//! no retry logic.

use std::any::Any;
use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{AsFd, OwnedFd};
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, fork, pipe};
use tracing::warn;

use crate::assertions::TestSignal;
use crate::outcome::Outcome;

/// How long a test body may run before its isolate is killed.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(60);

/// Failures of the isolation machinery itself.
///
/// None of these are verdicts on a test: every variant means the grading
/// infrastructure could not do its job, and the driver treats them as fatal.
#[derive(Debug, thiserror::Error)]
pub enum IsolateError {
    #[error("failed to create the outcome pipe: {0}")]
    CreatePipe(#[source] Errno),

    #[error("fork() failed: {0}")]
    Fork(#[source] Errno),

    #[error("failed to poll the outcome pipe: {0}")]
    Poll(#[source] Errno),

    #[error("failed to read the outcome pipe: {0}")]
    Read(#[source] std::io::Error),

    #[error("failed to kill a timed-out child: {0}")]
    Kill(#[source] Errno),

    #[error("failed to wait for a child: {0}")]
    Wait(#[source] Errno),

    /// The body reported a defect in the grading setup itself.
    #[error("test reported an internal error")]
    TestInternalError,
}

/// Runs test bodies in isolation, one forked child per body.
#[derive(Debug, Clone)]
pub struct IsolateRunner {
    deadline: Duration,
}

impl IsolateRunner {
    /// Creates a runner with the default 60-second deadline.
    pub fn new() -> IsolateRunner {
        IsolateRunner {
            deadline: DEFAULT_DEADLINE,
        }
    }

    /// Creates a runner with a custom wall-clock deadline per test.
    pub fn with_deadline(deadline: Duration) -> IsolateRunner {
        IsolateRunner { deadline }
    }

    /// Runs one body to a verdict.
    ///
    /// Returns the classified outcome and its message; the message is empty
    /// except for [`Outcome::VisibleFail`]. Grader-only diagnostics (failure
    /// reasons, panic messages) are written by the child to the shared
    /// stderr rather than returned.
    ///
    /// # Errors
    ///
    /// Fails if the process plumbing fails, or if the body reported an
    /// internal error; both are fatal to the run, never a test verdict.
    pub fn run<F: FnOnce()>(&self, body: F) -> Result<(Outcome, String), IsolateError> {
        let mask: u8 = rand::random();
        let (read_end, write_end) = pipe().map_err(IsolateError::CreatePipe)?;

        // SAFETY: the child touches no state shared with the parent beyond
        // the write end of the pipe; it runs the body, reports, and _exits
        // without ever returning into the caller's stack.
        match unsafe { fork() }.map_err(IsolateError::Fork)? {
            ForkResult::Child => {
                drop(read_end);
                run_in_child(body, write_end, mask)
            }
            ForkResult::Parent { child } => {
                drop(write_end);
                self.collect_verdict(child, read_end, mask)
            }
        }
    }

    fn collect_verdict(
        &self,
        child: Pid,
        read_end: OwnedFd,
        mask: u8,
    ) -> Result<(Outcome, String), IsolateError> {
        if !self.wait_readable(&read_end)? {
            // Nothing on the pipe by the deadline: the body is hung. The
            // child may lose a race and die on its own first, so a vanished
            // pid is not an error here.
            match kill(child, Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(errno) => return Err(IsolateError::Kill(errno)),
            }
            waitpid(child, None).map_err(IsolateError::Wait)?;
            return Ok((Outcome::Timeout, String::new()));
        }

        let mut frame = Vec::new();
        File::from(read_end)
            .read_to_end(&mut frame)
            .map_err(IsolateError::Read)?;
        let status = waitpid(child, None).map_err(IsolateError::Wait)?;

        let outcome = match frame.split_first() {
            Some((&first, _)) => Outcome::from_wire(first ^ mask),
            None => None,
        };
        let Some(outcome) = outcome else {
            // An empty or garbled frame means the harness never reported:
            // the child died, exited early, or wrote bytes it invented.
            log_abnormal_exit(status);
            return Ok((Outcome::Crash, String::new()));
        };

        if !outcome.is_reported() {
            log_abnormal_exit(status);
        }
        if outcome == Outcome::InternalError {
            return Err(IsolateError::TestInternalError);
        }

        let message = String::from_utf8_lossy(&frame[1..]).into_owned();
        Ok((outcome, message))
    }

    /// Waits until the pipe has data, or the deadline passes.
    fn wait_readable(&self, fd: &OwnedFd) -> Result<bool, IsolateError> {
        let start = Instant::now();
        loop {
            let remaining = self.deadline.saturating_sub(start.elapsed());
            let millis = i32::try_from(remaining.as_millis()).unwrap_or(i32::MAX);
            let timeout = PollTimeout::try_from(millis).unwrap_or(PollTimeout::MAX);
            let mut fds = [PollFd::new(fd.as_fd(), PollFlags::POLLIN)];
            match poll(&mut fds, timeout) {
                Ok(0) => return Ok(false),
                Ok(_) => return Ok(true),
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(IsolateError::Poll(errno)),
            }
        }
    }
}

impl Default for IsolateRunner {
    fn default() -> Self {
        IsolateRunner::new()
    }
}

/// Warns when a child that never reported a verdict was torn down by a
/// signal, so graders can tell a segfault from a silent early exit.
fn log_abnormal_exit(status: WaitStatus) {
    if let WaitStatus::Signaled(_, signal, _) = status {
        warn!("child isolate was killed by {signal}");
    }
}

/// Child-side entry point: run, report, vanish.
fn run_in_child<F: FnOnce()>(body: F, write_end: OwnedFd, mask: u8) -> ! {
    let (outcome, message) = classify(body);

    let mut frame = Vec::with_capacity(1 + message.len());
    frame.push(outcome.to_wire() ^ mask);
    frame.extend_from_slice(message.as_bytes());

    // write_all retries partial writes; anything short of a full frame
    // reads back as a crash, which is the right verdict for a child that
    // could not report.
    let mut pipe = File::from(write_end);
    let status = match pipe.write_all(&frame).and_then(|()| pipe.flush()) {
        Ok(()) => 0,
        Err(_) => 1,
    };
    drop(pipe);

    // The child shares the parent's whole address space image; running
    // destructors or atexit handlers here would replay parent cleanup.
    unsafe { nix::libc::_exit(status) }
}

/// Runs the body under `catch_unwind` and classifies however it ended.
fn classify<F: FnOnce()>(body: F) -> (Outcome, String) {
    // The default hook would print a "thread panicked" banner for every
    // signalled outcome; the match below logs what graders need instead.
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let verdict = panic::catch_unwind(AssertUnwindSafe(body));
    panic::set_hook(default_hook);

    let payload = match verdict {
        Ok(()) => return (Outcome::Pass, String::new()),
        Err(payload) => payload,
    };

    match payload.downcast::<TestSignal>() {
        Ok(signal) => match *signal {
            TestSignal::Passed => (Outcome::Pass, String::new()),
            TestSignal::Failed(reason) => {
                eprintln!("  test failed: {reason}");
                (Outcome::Fail, String::new())
            }
            TestSignal::FailedVisibly(message) => (Outcome::VisibleFail, message),
            TestSignal::InternalError(reason) => {
                eprintln!("  internal test case failure: {reason}");
                (Outcome::InternalError, String::new())
            }
        },
        Err(payload) => {
            match panic_message(payload.as_ref()) {
                Some(message) => eprintln!("  test panicked: {message}"),
                None => eprintln!("  test panicked with a non-string payload"),
            }
            (Outcome::Exception, String::new())
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> Option<&str> {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
}
