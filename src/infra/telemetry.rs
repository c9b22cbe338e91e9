use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "atelier_cache_hit_total",
            Unit::Count,
            "Total number of response-cache hits."
        );
        describe_counter!(
            "atelier_cache_miss_total",
            Unit::Count,
            "Total number of response-cache misses, expired entries included."
        );
        describe_counter!(
            "atelier_cache_expired_total",
            Unit::Count,
            "Total number of response-cache entries dropped after their TTL."
        );
        describe_counter!(
            "atelier_cache_evict_total",
            Unit::Count,
            "Total number of response-cache evictions due to capacity."
        );
        describe_histogram!(
            "atelier_fetch_ms",
            Unit::Milliseconds,
            "Network fetch latency in milliseconds."
        );
        describe_counter!(
            "atelier_fetch_stale_discarded_total",
            Unit::Count,
            "Total number of fetch completions discarded because a newer fetch was issued."
        );
        describe_counter!(
            "atelier_view_report_total",
            Unit::Count,
            "Total number of view reports sent, by result."
        );
        describe_counter!(
            "atelier_like_report_total",
            Unit::Count,
            "Total number of like confirmations sent, by result."
        );
    });
}
