//! Tracing/logging initialization for the server binary.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Pretty,
    /// One JSON object per line, for log aggregation.
    Json,
}

impl LogFormat {
    pub const fn from_json_flag(log_json: bool) -> Self {
        if log_json { Self::Json } else { Self::Pretty }
    }
}

/// Build the env filter: `RUST_LOG` when set, otherwise `default_filter`
/// (e.g. `"myproposal_server=info,tower_http=info"`).
pub fn build_filter(rust_log: Option<&str>, default_filter: &str) -> EnvFilter {
    EnvFilter::new(rust_log.unwrap_or(default_filter))
}

/// Initialise the global tracing subscriber.
pub fn init_tracing(default_filter: &str, format: LogFormat) {
    let rust_log = std::env::var("RUST_LOG").ok();
    let env_filter = build_filter(rust_log.as_deref(), default_filter);
    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_selects_format() {
        assert_eq!(LogFormat::from_json_flag(true), LogFormat::Json);
        assert_eq!(LogFormat::from_json_flag(false), LogFormat::Pretty);
    }

    #[test]
    fn rust_log_wins_over_default() {
        let filter = build_filter(Some("debug"), "myproposal_server=info");
        assert_eq!(filter.to_string(), "debug");

        let filter = build_filter(None, "myproposal_server=info");
        assert_eq!(filter.to_string(), "myproposal_server=info");
    }
}
