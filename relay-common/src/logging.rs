use std::str::FromStr;

use serde::Deserialize;
use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

/// Target shared by every broker traffic event, so it can be silenced on its own
pub const TRAFFIC_TARGET: &str = "relay::traffic";

/// Environment variable that overrides the configured level
pub const LEVEL_ENV: &str = "RELAY_LOG_LEVEL";

#[macro_export]
macro_rules! log {
    (traffic, $level:expr, $span:expr, [$($field:tt)*], $($msg:expr),*) => {{
        let span = $crate::tracing::span!(
            target: $crate::logging::TRAFFIC_TARGET,
            $level,
            $span,
            $($field)*
        );
        let _enter = span.enter();

        $crate::tracing::event!(target: $crate::logging::TRAFFIC_TARGET, $level, $($msg),*)
    }};

    ($level:expr, $span:expr, [$($field:tt)*], $($msg:expr),*) => {{
        let span = $crate::tracing::span!($level, $span, $($field)*);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg),*)
    }};
}

/// Traffic leaving the relay towards the broker.
///
/// `topic = ...` attaches the broker topic to the span.
#[macro_export]
macro_rules! outgoing {
    (topic = $topic:expr, level = $level:ident, $($msg:expr),*) => {
        $crate::log!(traffic, $crate::tracing::Level::$level, "outgoing", [topic = %$topic], $($msg),*)
    };

    (topic = $topic:expr, $($msg:expr),*) => {
        $crate::outgoing!(topic = $topic, level = TRACE, $($msg),*)
    };

    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!(traffic, $crate::tracing::Level::$level, "outgoing", [], $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::outgoing!(level = TRACE, $($msg),*)
    };
}

/// Traffic reported by the device agent.
///
/// `topic = ...` attaches the topic the report arrived on.
#[macro_export]
macro_rules! incoming {
    (topic = $topic:expr, level = $level:ident, $($msg:expr),*) => {
        $crate::log!(traffic, $crate::tracing::Level::$level, "incoming", [topic = %$topic], $($msg),*)
    };

    (topic = $topic:expr, $($msg:expr),*) => {
        $crate::incoming!(topic = $topic, level = TRACE, $($msg),*)
    };

    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!(traffic, $crate::tracing::Level::$level, "incoming", [], $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::incoming!(level = TRACE, $($msg),*)
    };
}

/// Relay lifecycle and record bookkeeping.
///
/// `record = ...` attaches a delivery record id to the span.
#[macro_export]
macro_rules! internal {
    (record = $id:expr, level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", [record_id = %$id], $($msg),*)
    };

    (record = $id:expr, $($msg:expr),*) => {
        $crate::internal!(record = $id, level = TRACE, $($msg),*)
    };

    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", [], $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::internal!(level = TRACE, $($msg),*)
    };
}

/// Log output settings
///
/// ```ron
/// logging: (
///     level: Some("debug"),
///     traffic: false,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogConfig {
    /// Maximum level; `RELAY_LOG_LEVEL` takes precedence
    ///
    /// Default: `trace` in debug builds, `info` otherwise
    #[serde(default)]
    pub level: Option<String>,

    /// Show raw broker traffic (publishes, status reports, incoming messages)
    ///
    /// Default: true
    #[serde(default = "default_traffic")]
    pub traffic: bool,

    #[serde(default = "default_ansi")]
    pub ansi: bool,
}

const fn default_traffic() -> bool {
    true
}

const fn default_ansi() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: None,
            traffic: default_traffic(),
            ansi: default_ansi(),
        }
    }
}

impl LogConfig {
    /// Effective level, preferring `from_env` over the configured one
    ///
    /// An unparsable value is reported and skipped.
    #[must_use]
    pub fn resolve_level(&self, from_env: Option<&str>) -> LevelFilter {
        let default = if cfg!(debug_assertions) {
            LevelFilter::TRACE
        } else {
            LevelFilter::INFO
        };

        [from_env, self.level.as_deref()]
            .into_iter()
            .flatten()
            .find_map(|level| {
                LevelFilter::from_str(level)
                    .inspect_err(|_| eprintln!("Invalid log level specified {level}, ignoring"))
                    .ok()
            })
            .unwrap_or(default)
    }

    /// Whether events under `target` reach the output
    #[must_use]
    pub fn shows(&self, target: &str) -> bool {
        target.starts_with("relay") && (self.traffic || target != TRAFFIC_TARGET)
    }
}

pub fn init(config: &LogConfig) {
    let level = config.resolve_level(std::env::var(LEVEL_ENV).ok().as_deref());
    let filter = config.clone();

    tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_ansi(config.ansi)
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_filter(level)
                .with_filter(FilterFn::new(move |metadata| {
                    filter.shows(metadata.target())
                })),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_env_level_wins_over_config() {
        let config = LogConfig {
            level: Some("warn".to_string()),
            ..LogConfig::default()
        };

        assert_eq!(config.resolve_level(Some("debug")), LevelFilter::DEBUG);
        assert_eq!(config.resolve_level(None), LevelFilter::WARN);
    }

    #[test]
    fn test_invalid_env_level_falls_back_to_config() {
        let config = LogConfig {
            level: Some("error".to_string()),
            ..LogConfig::default()
        };

        assert_eq!(config.resolve_level(Some("loud")), LevelFilter::ERROR);
    }

    #[test]
    fn test_traffic_can_be_silenced() {
        let quiet = LogConfig {
            traffic: false,
            ..LogConfig::default()
        };

        assert!(LogConfig::default().shows(TRAFFIC_TARGET));
        assert!(!quiet.shows(TRAFFIC_TARGET));
        assert!(quiet.shows("relay_delivery::processor"));
        assert!(!quiet.shows("rumqttc::eventloop"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: LogConfig = ron::from_str("(traffic: false)").unwrap();

        assert_eq!(config.level, None);
        assert!(!config.traffic);
        assert!(config.ansi);
    }

    #[test]
    fn test_macros_accept_relay_fields() {
        let topic = "sms/send";
        let id = 42;

        outgoing!(topic = topic, "PUBLISH +15550001|hi");
        incoming!(topic = "sms/status", level = DEBUG, "+15550001|SENT|");
        internal!(record = id, level = INFO, "Dispatching");
        internal!("no fields");
    }
}
