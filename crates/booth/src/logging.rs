//! Tracing setup for the `booth` binary.
//!
//! The library only emits events. The binary installs one stderr subscriber
//! so log lines stay out of the dialogue printed on stdout.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// HTTP crates whose chatter is capped at WARN unless `RUST_LOG` says otherwise.
const NOISY_TARGETS: [&str; 3] = ["hyper", "reqwest", "rustls"];

/// How much the booth logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    /// Warnings and above. Outages of the webhook, archive or provider show
    /// up here.
    #[default]
    Normal,
    /// Debug and above: admissions, credential rotation, upserts.
    Verbose,
    /// Everything.
    Trace,
}

impl Verbosity {
    /// Tracing level for the booth's own events.
    #[must_use]
    pub fn to_level_filter(&self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::WARN,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }

    /// Filter directive used when `RUST_LOG` is unset.
    #[must_use]
    pub fn directive(&self) -> String {
        let mut directive = format!("confession_booth={}", self.to_level_filter());
        if *self != Self::Trace {
            for target in NOISY_TARGETS {
                directive.push_str(&format!(",{target}=warn"));
            }
        }
        directive
    }
}

/// Install the stderr subscriber.
///
/// `RUST_LOG` takes precedence over `verbosity`. A second call is a no-op.
///
/// # Examples
///
/// ```no_run
/// use confession_booth::{init_logging, logging::Verbosity};
///
/// init_logging(Verbosity::Verbose);
/// ```
pub fn init_logging(verbosity: Verbosity) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.directive()));

    let subscriber = tracing_subscriber::registry().with(env_filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_file(false)
            .with_line_number(false),
    );

    let _ = subscriber.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels() {
        assert_eq!(Verbosity::Quiet.to_level_filter(), Level::ERROR);
        assert_eq!(Verbosity::default().to_level_filter(), Level::WARN);
        assert_eq!(Verbosity::Verbose.to_level_filter(), Level::DEBUG);
        assert_eq!(Verbosity::Trace.to_level_filter(), Level::TRACE);
    }

    #[test]
    fn test_directive_caps_http_crates() {
        let directive = Verbosity::Verbose.directive();
        assert!(directive.starts_with("confession_booth=DEBUG"));
        assert!(directive.contains("reqwest=warn"));
        assert!(directive.contains("hyper=warn"));
    }

    #[test]
    fn test_trace_directive_lets_everything_through() {
        assert_eq!(Verbosity::Trace.directive(), "confession_booth=TRACE");
    }

    #[test]
    fn test_directive_parses() {
        for verbosity in [Verbosity::Quiet, Verbosity::Normal, Verbosity::Trace] {
            assert!(EnvFilter::try_new(verbosity.directive()).is_ok());
        }
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_logging(Verbosity::Quiet);
        init_logging(Verbosity::Trace);
    }
}
