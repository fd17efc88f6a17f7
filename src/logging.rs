//! Diagnostic output for the runner.
//!
//! The binary builds a [`Dispatch`] from the verbosity flag and attaches it
//! to the run future, so library code only emits `tracing` events and never
//! installs a global subscriber.

use tracing::{Dispatch, Level};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// Environment variable holding an optional `tracing` filter directive
/// (for example `avh_runner=trace`) that overrides the verbosity flag.
pub const LOG_FILTER_ENV: &str = "AVH_LOG";

/// How much diagnostic output to emit on stderr.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Verbosity {
    /// Errors only.
    #[default]
    Quiet,
    /// Step progress and polled states.
    Verbose,
}

impl Verbosity {
    /// Maps the `--verbose` flag to a verbosity.
    #[must_use]
    pub const fn from_flag(verbose: bool) -> Self {
        if verbose { Self::Verbose } else { Self::Quiet }
    }

    /// Most detailed level emitted.
    #[must_use]
    pub const fn level(self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Verbose => Level::DEBUG,
        }
    }
}

/// Builds the stderr dispatcher, honouring [`LOG_FILTER_ENV`] when set.
#[must_use]
pub fn dispatch(verbosity: Verbosity) -> Dispatch {
    let directive = std::env::var(LOG_FILTER_ENV).ok();
    dispatch_with_filter(verbosity, directive.as_deref())
}

/// Builds the stderr dispatcher from an explicit filter directive.
///
/// An empty or unparsable directive falls back to the verbosity level.
#[must_use]
pub fn dispatch_with_filter(verbosity: Verbosity, directive: Option<&str>) -> Dispatch {
    let filter = directive
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .and_then(|text| EnvFilter::try_new(text).ok())
        .unwrap_or_else(|| {
            EnvFilter::default().add_directive(LevelFilter::from_level(verbosity.level()).into())
        });

    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(filter)
        .finish();
    Dispatch::new(subscriber)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tracing::dispatcher;

    use super::*;

    fn enabled_levels(dispatch: &Dispatch) -> (bool, bool, bool) {
        dispatcher::with_default(dispatch, || {
            (
                tracing::enabled!(Level::ERROR),
                tracing::enabled!(Level::INFO),
                tracing::enabled!(Level::DEBUG),
            )
        })
    }

    #[rstest]
    #[case::quiet(false, Verbosity::Quiet)]
    #[case::verbose(true, Verbosity::Verbose)]
    fn flag_maps_to_verbosity(#[case] flag: bool, #[case] expected: Verbosity) {
        assert_eq!(Verbosity::from_flag(flag), expected);
    }

    #[test]
    fn quiet_emits_errors_only() {
        let dispatch = dispatch_with_filter(Verbosity::Quiet, None);
        assert_eq!(enabled_levels(&dispatch), (true, false, false));
    }

    #[test]
    fn verbose_emits_debug() {
        let dispatch = dispatch_with_filter(Verbosity::Verbose, None);
        assert_eq!(enabled_levels(&dispatch), (true, true, true));
    }

    #[test]
    fn directive_overrides_verbosity() {
        let dispatch = dispatch_with_filter(Verbosity::Quiet, Some("info"));
        assert_eq!(enabled_levels(&dispatch), (true, true, false));
    }

    #[rstest]
    #[case::blank("   ")]
    #[case::bad_level("avh_runner=loudest")]
    fn unusable_directive_falls_back(#[case] directive: &str) {
        let dispatch = dispatch_with_filter(Verbosity::Verbose, Some(directive));
        assert_eq!(enabled_levels(&dispatch), (true, true, true));
    }
}
