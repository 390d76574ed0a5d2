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

/// Traffic towards a delivery provider
#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, $($msg:tt)*) => {
        $crate::log!($crate::tracing::Level::$level, "outgoing", $($msg)*)
    };

    ($($msg:tt)*) => {
        $crate::outgoing!(level = TRACE, $($msg)*)
    };
}

/// Engine lifecycle and bookkeeping
#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:tt)*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg)*)
    };

    ($($msg:tt)*) => {
        $crate::internal!(level = TRACE, $($msg)*)
    };
}

/// Output format for the log subscriber, selected with `LOG_FORMAT`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format {other}")),
        }
    }
}

const fn default_level() -> LevelFilter {
    if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    }
}

fn level_from(value: Option<&str>) -> LevelFilter {
    let default = default_level();

    value.map_or(default, |level| {
        LevelFilter::from_str(level).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    })
}

fn format_from(value: Option<&str>) -> LogFormat {
    value.map_or_else(LogFormat::default, |format| {
        format.parse().unwrap_or_else(|err| {
            eprintln!("{err}, defaulting to compact output");
            LogFormat::Compact
        })
    })
}

fn is_courier_target(target: &str) -> bool {
    target.starts_with("courier")
}

/// Install the global subscriber.
///
/// `LOG_LEVEL` selects the level (TRACE in debug builds, INFO otherwise) and
/// `LOG_FORMAT` selects `compact` or `json` output. Only courier targets are
/// emitted.
pub fn init() {
    let level = level_from(std::env::var("LOG_LEVEL").ok().as_deref());
    let format = format_from(std::env::var("LOG_FORMAT").ok().as_deref());

    let compact = (format == LogFormat::Compact).then(|| {
        tracing_subscriber::fmt::layer()
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_ansi(true)
            .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
            .with_filter(level)
            .with_filter(FilterFn::new(|metadata| {
                is_courier_target(metadata.target())
            }))
    });

    let json = (format == LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
            .with_filter(level)
            .with_filter(FilterFn::new(|metadata| {
                is_courier_target(metadata.target())
            }))
    });

    tracing_subscriber::Registry::default()
        .with(compact)
        .with(json)
        .init();
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn level_parsing() {
        assert_eq!(level_from(Some("warn")), LevelFilter::WARN);
        assert_eq!(level_from(Some("ERROR")), LevelFilter::ERROR);
        assert_eq!(level_from(Some("nonsense")), default_level());
        assert_eq!(level_from(None), default_level());
    }

    #[test]
    fn format_parsing() {
        assert_eq!(format_from(Some("json")), LogFormat::Json);
        assert_eq!(format_from(Some("TEXT")), LogFormat::Compact);
        assert_eq!(format_from(Some("xml")), LogFormat::Compact);
        assert_eq!(format_from(None), LogFormat::Compact);
    }

    #[test]
    fn only_courier_targets() {
        assert!(is_courier_target("courier_delivery::coordinator"));
        assert!(is_courier_target("courier"));
        assert!(!is_courier_target("hyper::proto"));
    }
}
