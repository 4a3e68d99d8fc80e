//! Prometheus metrics for the service.

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_gauge, Encoder, IntCounter, IntGauge, TextEncoder,
};
use tracing::warn;

lazy_static! {
    /// Total rate limit checks performed.
    pub static ref CHECKS_TOTAL: IntCounter = register_int_counter!(
        "floodgate_checks_total",
        "Total number of rate limit checks"
    )
    .unwrap();

    /// Total checks that ended in denial.
    pub static ref DENIALS_TOTAL: IntCounter = register_int_counter!(
        "floodgate_denials_total",
        "Total number of denied requests"
    )
    .unwrap();

    /// Total expired entries removed by the background sweep.
    pub static ref SWEPT_KEYS_TOTAL: IntCounter = register_int_counter!(
        "floodgate_swept_keys_total",
        "Total expired entries removed by the sweep"
    )
    .unwrap();

    /// Keys currently tracked in the counter store.
    pub static ref TRACKED_KEYS: IntGauge = register_int_gauge!(
        "floodgate_tracked_keys",
        "Number of keys currently tracked"
    )
    .unwrap();
}

/// Render all registered metrics in Prometheus text exposition format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_registered_metrics() {
        CHECKS_TOTAL.inc();
        let output = render();
        assert!(output.contains("floodgate_checks_total"));
    }
}
