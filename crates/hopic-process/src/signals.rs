//! SIGINT/SIGTERM flags for container teardown.
//!
//! Each signal sets an [`AtomicBool`] via [`signal_hook::flag::register`],
//! which is async-signal-safe; the poll loop in [`crate::run_with_timeout`]
//! checks the flags on every tick rather than handling the signal
//! asynchronously, keeping all teardown logic (stop, then escalate to kill
//! on a second signal) on the main thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use signal_hook::consts::{SIGINT, SIGTERM};

/// Tracks whether SIGINT/SIGTERM have been received, and how many times,
/// so a second identical signal can escalate a graceful stop to a kill.
pub struct SignalGuard {
    sigint: Arc<AtomicBool>,
    sigterm: Arc<AtomicBool>,
}

impl SignalGuard {
    pub fn install() -> Result<Self> {
        let sigint = Arc::new(AtomicBool::new(false));
        let sigterm = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGINT, Arc::clone(&sigint))
            .context("installing SIGINT handler")?;
        signal_hook::flag::register(SIGTERM, Arc::clone(&sigterm))
            .context("installing SIGTERM handler")?;
        Ok(Self { sigint, sigterm })
    }

    /// The signal number to exit with (`128 + signum`), the first time
    /// either flag is observed set.
    pub fn caught(&self) -> Option<i32> {
        if self.sigint.load(Ordering::SeqCst) {
            Some(SIGINT)
        } else if self.sigterm.load(Ordering::SeqCst) {
            Some(SIGTERM)
        } else {
            None
        }
    }

    /// Resets the flags so a second signal of the same kind can be
    /// distinguished from the first (used to escalate stop to kill).
    pub fn reset(&self) {
        self.sigint.store(false, Ordering::SeqCst);
        self.sigterm.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_no_signal_caught() {
        let guard = SignalGuard::install().expect("installs");
        assert!(guard.caught().is_none());
    }
}
