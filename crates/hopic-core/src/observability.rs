//! Structured logging setup.
//!
//! Every subprocess Hopic runs gets one structured log line on stderr,
//! credential values substituted by their variable names rather than
//! echoed. Built on `tracing` + `tracing-subscriber` with an `EnvFilter`
//! gated by `--quiet`/`-v`/`RUST_LOG`. Hopic is a CLI that runs once and
//! exits, so there's no log-file rotation here — stderr is the only sink.

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

/// What to log and how to format it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObservabilityConfig {
    /// Emit one JSON object per line instead of the human-readable format.
    pub json: bool,
}

/// Builds an `EnvFilter` from the CLI's verbosity flags.
///
/// Priority: `quiet` > `verbose` > `RUST_LOG` > `default_level`, matching
/// the layering `claylo-scrat`'s `env_filter()` uses.
pub fn env_filter(quiet: bool, verbose: u8, default_level: &str) -> EnvFilter {
    if quiet {
        return EnvFilter::new("error");
    }

    if verbose > 0 {
        let level = match verbose {
            1 => "debug",
            _ => "trace",
        };
        return EnvFilter::new(level);
    }

    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Installs the global `tracing` subscriber. Must be called once, near the
/// start of `main`, before any `tracing::info!`/`#[instrument]` fires.
pub fn init(cfg: ObservabilityConfig, filter: EnvFilter) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::CLOSE);

    if cfg.json {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_overrides_verbose_and_env() {
        let filter = env_filter(true, 2, "info");
        assert_eq!(filter.to_string(), "error");
    }

    #[test]
    fn verbose_one_maps_to_debug() {
        assert_eq!(env_filter(false, 1, "info").to_string(), "debug");
    }

    #[test]
    fn verbose_two_or_more_maps_to_trace() {
        assert_eq!(env_filter(false, 2, "info").to_string(), "trace");
        assert_eq!(env_filter(false, 5, "info").to_string(), "trace");
    }
}
