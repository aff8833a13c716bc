//! Log subscriber for the `rbench` binary.
//!
//! Everything goes to stderr; stdout carries only the progress lines, the
//! summary, or the JSON report. The filter comes from the first usable
//! source among `RBENCH_LOG`, `RUST_LOG` and the `-v` / `-q` flags, with
//! `warn` when none of them is given. A directive that fails to parse is
//! skipped rather than treated as an error.

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Filter variable consulted before `RUST_LOG`.
pub const LOG_ENV_VAR: &str = "RBENCH_LOG";

const TARGET_PREFIX: &str = "rbench";

/// How chatty the harness is when no filter variable is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    /// Per-trial phase timings and command lines at debug level.
    Verbose,
}

impl Verbosity {
    /// `-v` takes precedence over `-q`.
    #[must_use]
    pub const fn from_flags(verbose: bool, quiet: bool) -> Self {
        if verbose {
            Self::Verbose
        } else if quiet {
            Self::Quiet
        } else {
            Self::Normal
        }
    }

    #[must_use]
    pub const fn default_level(self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::WARN,
            Self::Verbose => Level::DEBUG,
        }
    }
}

/// Install the process-wide subscriber before any harness work starts.
///
/// # Panics
///
/// Panics when a global subscriber is already installed.
pub fn init_subscriber(verbosity: Verbosity, no_color: bool) {
    let filter = build_env_filter(verbosity);
    let ansi = !no_color && std::io::IsTerminal::is_terminal(&std::io::stderr());
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .with_target(true);

    // Uptime stamps only in verbose mode.
    if verbosity == Verbosity::Verbose {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.with_timer(fmt::time::uptime()))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.without_time().compact())
            .init();
    }
}

fn build_env_filter(verbosity: Verbosity) -> EnvFilter {
    if let Ok(directives) = std::env::var(LOG_ENV_VAR)
        && let Ok(filter) = EnvFilter::try_new(&directives)
    {
        return filter;
    }

    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    EnvFilter::try_new(fallback_directive(verbosity))
        .unwrap_or_else(|_| EnvFilter::new(verbosity.default_level().as_str()))
}

fn fallback_directive(verbosity: Verbosity) -> String {
    if verbosity == Verbosity::Verbose {
        format!("{},{TARGET_PREFIX}=debug", Level::INFO)
    } else {
        verbosity.default_level().to_string()
    }
}

#[cfg(test)]
mod tests {
    // `init_subscriber` installs a global and can run only once per process,
    // so it is covered by the binary tests in `tests/run_command.rs`.
    use super::*;

    #[test]
    fn verbosity_from_flags() {
        assert_eq!(Verbosity::from_flags(false, false), Verbosity::Normal);
        assert_eq!(Verbosity::from_flags(true, false), Verbosity::Verbose);
        assert_eq!(Verbosity::from_flags(false, true), Verbosity::Quiet);
        assert_eq!(Verbosity::from_flags(true, true), Verbosity::Verbose);
    }

    #[test]
    fn quiet_and_verbose_shift_the_default_level() {
        assert_eq!(Verbosity::Quiet.default_level(), Level::ERROR);
        assert_eq!(Verbosity::Normal.default_level(), Level::WARN);
        assert_eq!(Verbosity::Verbose.default_level(), Level::DEBUG);
    }

    #[test]
    fn fallback_directives_parse() {
        assert_eq!(fallback_directive(Verbosity::Verbose), "INFO,rbench=debug");
        assert_eq!(fallback_directive(Verbosity::Quiet), "ERROR");
        for verbosity in [Verbosity::Quiet, Verbosity::Normal, Verbosity::Verbose] {
            EnvFilter::try_new(fallback_directive(verbosity)).expect("valid directive");
        }
    }

    #[test]
    fn filter_builds_for_every_verbosity() {
        for verbosity in [Verbosity::Quiet, Verbosity::Normal, Verbosity::Verbose] {
            let _filter = build_env_filter(verbosity);
        }
    }
}
