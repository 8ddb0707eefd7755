//! Timeout- and signal-aware subprocess execution shared by the phase
//! runner.
//!
//! The poll loop in [`run_with_timeout`] is the same shape the rest of
//! this workspace uses for bounding a child process's lifetime: spawn,
//! then alternate between `Child::try_wait` and a short sleep against a
//! monotonic deadline, rather than blocking on `wait` with no escape
//! hatch. Containerized steps layer signal handling and `docker stop`/
//! `docker kill` teardown on top of the same loop.

mod container;
mod env;
mod signals;
mod timeout;

pub use container::{ContainerSpec, VolumeMount};
pub use env::sanitize_locale_env;
pub use signals::SignalGuard;
pub use timeout::{run_with_timeout, TimeoutOutcome};

/// A marker for the one outcome the phase runner must distinguish from an
/// ordinary non-zero exit: the step's (or the variant's global) timeout
/// expired before or during execution.
#[derive(Debug)]
pub struct StepTimeoutExpired {
    pub step_description: String,
}

impl std::fmt::Display for StepTimeoutExpired {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "step timed out: {}", self.step_description)
    }
}

impl std::error::Error for StepTimeoutExpired {}
