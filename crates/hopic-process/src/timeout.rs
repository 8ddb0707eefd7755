//! A capture-and-poll timeout loop generalized to inherited stdio (build
//! output streams straight to the terminal) and an optional
//! cancellation check each poll tick, so containerized steps can splice in
//! signal-driven teardown without duplicating the loop.

use std::process::{Child, Command};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

#[derive(Debug, Clone, Copy)]
pub struct TimeoutOutcome {
    pub exit_code: i32,
    pub timed_out: bool,
    pub duration: Duration,
}

/// Runs `command` to completion, or until `timeout` elapses, whichever is
/// first. `on_poll` is invoked once per poll tick with the still-running
/// child, for callers (the container runner) that need to react to a
/// caught signal mid-execution; returning `true` requests early
/// termination with `timed_out = false` (the caller is expected to have
/// already killed the child or be about to).
pub fn run_with_timeout(
    command: &mut Command,
    timeout: Option<Duration>,
    mut on_poll: impl FnMut(&mut Child) -> bool,
) -> Result<TimeoutOutcome> {
    let start = Instant::now();

    if timeout.is_none() {
        let mut child = command.spawn().context("failed to spawn command")?;
        loop {
            if let Some(status) = child.try_wait().context("failed to poll command")? {
                return Ok(TimeoutOutcome {
                    exit_code: status.code().unwrap_or(-1),
                    timed_out: false,
                    duration: start.elapsed(),
                });
            }
            if on_poll(&mut child) {
                return Ok(TimeoutOutcome {
                    exit_code: child.wait().ok().and_then(|s| s.code()).unwrap_or(-1),
                    timed_out: false,
                    duration: start.elapsed(),
                });
            }
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    let timeout_dur = timeout.expect("checked above");
    let mut child = command.spawn().context("failed to spawn command")?;
    let deadline = Instant::now() + timeout_dur;

    loop {
        if let Some(status) = child.try_wait().context("failed to poll command")? {
            return Ok(TimeoutOutcome {
                exit_code: status.code().unwrap_or(-1),
                timed_out: false,
                duration: start.elapsed(),
            });
        }

        if on_poll(&mut child) {
            return Ok(TimeoutOutcome {
                exit_code: child.wait().ok().and_then(|s| s.code()).unwrap_or(-1),
                timed_out: false,
                duration: start.elapsed(),
            });
        }

        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(TimeoutOutcome {
                exit_code: -1,
                timed_out: true,
                duration: start.elapsed(),
            });
        }

        std::thread::sleep(Duration::from_millis(100));
    }
}
