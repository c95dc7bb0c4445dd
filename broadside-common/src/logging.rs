use std::str::FromStr;

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:tt)*) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg)*)
    }};
}

/// Events about mail leaving the process (one per send attempt).
#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, $($msg:tt)*) => {
        $crate::log!($crate::tracing::Level::$level, "outgoing", $($msg)*)
    };

    ($($msg:tt)*) => {
        $crate::outgoing!(level = TRACE, $($msg)*)
    };
}

#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:tt)*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg)*)
    };

    ($($msg:tt)*) => {
        $crate::internal!(level = TRACE, $($msg)*)
    };
}

/// Resolve the level filter from a `LOG_LEVEL` style value.
///
/// Unknown values fall back to `default` with a note on stderr.
pub fn level_from(value: Option<&str>, default: LevelFilter) -> LevelFilter {
    value.map_or(default, |level| {
        LevelFilter::from_str(level).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    })
}

/// Install the global subscriber.
///
/// Only events from `broadside*` targets are emitted. Calling this more than
/// once is harmless; later calls are ignored.
pub fn init() {
    let default = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    let level = level_from(std::env::var("LOG_LEVEL").ok().as_deref(), default);

    let _ = tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_ansi(true)
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_filter(level)
                .with_filter(FilterFn::new(|metadata| {
                    metadata.target().starts_with("broadside")
                })),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_defaults_when_unset() {
        assert_eq!(level_from(None, LevelFilter::INFO), LevelFilter::INFO);
    }

    #[test]
    fn level_parses_known_names() {
        assert_eq!(
            level_from(Some("debug"), LevelFilter::INFO),
            LevelFilter::DEBUG
        );
        assert_eq!(level_from(Some("WARN"), LevelFilter::INFO), LevelFilter::WARN);
    }

    #[test]
    fn level_falls_back_on_garbage() {
        assert_eq!(
            level_from(Some("loudest"), LevelFilter::ERROR),
            LevelFilter::ERROR
        );
    }

    #[test]
    fn init_twice_does_not_panic() {
        init();
        init();
        internal!("logging initialised twice");
        outgoing!(level = DEBUG, recipient = "a@example.com", "sent");
    }
}
