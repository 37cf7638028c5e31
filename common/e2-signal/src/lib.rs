//! Child-process supervision (component N): forwards termination signals to
//! a running child, reaps it, and runs teardown callbacks in LIFO order
//! before re-raising the signal so the shell sees the conventional
//! `128+signo` exit status.

use std::os::unix::process::ExitStatusExt;
use std::process::{Command, ExitCode, ExitStatus};

use anyhow::{bail, Result};
use nix::sys::signal::Signal;
use signal_hook::consts::signal::{SIGCHLD, SIGHUP, SIGINT, SIGPIPE, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::instrument;

/// Runs `cmd` to completion, forwarding `SIGTERM`/`SIGHUP`/`SIGPIPE` to it
/// and ignoring `SIGINT` (the terminal already delivers that to the whole
/// foreground process group, so the child gets it directly unless it put
/// itself in its own group).
#[instrument(skip_all, fields(command = %cmd.get_program().to_string_lossy()))]
pub fn run(cmd: &mut Command) -> Result<ExitStatus> {
    let mut signals = Signals::new([SIGCHLD, SIGINT, SIGTERM, SIGHUP, SIGPIPE])?;

    let mut child = cmd.spawn()?;
    let pid = nix::unistd::Pid::from_raw(child.id().try_into()?);

    for signal in signals.forever() {
        match signal {
            SIGCHLD => {
                if let Some(status) = child.try_wait()? {
                    return Ok(status);
                }
            }
            SIGINT => {}
            SIGTERM => nix::sys::signal::kill(pid, Signal::SIGTERM)?,
            SIGHUP => nix::sys::signal::kill(pid, Signal::SIGHUP)?,
            SIGPIPE => nix::sys::signal::kill(pid, Signal::SIGPIPE)?,
            _ => unreachable!(),
        }
    }
    unreachable!()
}

#[instrument(skip_all, fields(command = %cmd.get_program().to_string_lossy()))]
pub fn run_and_check(cmd: &mut Command) -> Result<()> {
    let status = run(cmd)?;
    if !status.success() {
        bail!("command {cmd:?} failed with {status}");
    }
    Ok(())
}

/// Converts [`ExitStatus`] to [`ExitCode`] following the POSIX shell
/// convention (`128+signo` for a signal death).
pub fn status_to_exit_code(status: &ExitStatus) -> ExitCode {
    if let Some(code) = status.code() {
        ExitCode::from(code as u8)
    } else if let Some(signal) = status.signal() {
        ExitCode::from(128 + signal as u8)
    } else {
        panic!("ExitStatus does not represent process exit: {status:?}");
    }
}

/// A stack of cleanup callbacks run in LIFO order, used by long-running
/// commands (chroot construction, cache writeback) that must release locks
/// and remove scratch directories even when interrupted mid-step.
///
/// This is plain scope-based teardown, not signal-driven itself: callers
/// register a callback right after acquiring whatever it releases, and
/// `Drop` (or an explicit early [`TeardownStack::run`]) unwinds them in
/// reverse acquisition order, the same order a stack of nested `defer`
/// statements would.
#[derive(Default)]
pub struct TeardownStack {
    callbacks: Vec<Box<dyn FnOnce() + Send>>,
}

impl TeardownStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, callback: impl FnOnce() + Send + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    /// Runs every registered callback now, most-recently-pushed first, and
    /// clears the stack so `Drop` doesn't run them again.
    pub fn run(&mut self) {
        while let Some(callback) = self.callbacks.pop() {
            callback();
        }
    }
}

impl Drop for TeardownStack {
    fn drop(&mut self) {
        self.run();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn runs_process() {
        run_and_check(&mut Command::new("true")).unwrap();
    }

    #[test]
    fn runs_failed_process() {
        assert!(run_and_check(&mut Command::new("false")).is_err());
    }

    #[test]
    fn teardown_runs_in_lifo_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut stack = TeardownStack::new();
        for i in 0..3 {
            let order = order.clone();
            stack.push(move || order.lock().unwrap().push(i));
        }
        stack.run();
        assert_eq!(*order.lock().unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn teardown_runs_on_drop() {
        let counter = Arc::new(AtomicU32::new(0));
        {
            let mut stack = TeardownStack::new();
            let counter = counter.clone();
            stack.push(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
