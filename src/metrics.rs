//! Prometheus counters for the payment and webhook paths.

use std::net::SocketAddr;
use tracing::{info, warn};

pub const PAYMENTS_INITIATED: &str = "classroom_payments_initiated_total";
pub const PAYMENTS_COMPLETED: &str = "classroom_payments_completed_total";
pub const PAYMENTS_FAILED: &str = "classroom_payments_failed_total";
pub const COUPONS_REDEEMED: &str = "classroom_coupons_redeemed_total";
pub const WEBHOOKS_RECEIVED: &str = "classroom_webhooks_received_total";

/// Install the Prometheus exporter when a listen address is configured.
pub fn init_metrics(addr: Option<&str>) {
    let Some(addr_str) = addr else {
        return;
    };
    let addr: SocketAddr = match addr_str.parse() {
        Ok(a) => a,
        Err(_) => {
            warn!("Invalid metrics addr '{}', exporter disabled", addr_str);
            return;
        }
    };
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => info!("Prometheus exporter listening on http://{}/metrics", addr),
        Err(e) => warn!("Prometheus exporter install failed (possibly already installed): {}", e),
    }
}

pub struct PaymentMetrics;

impl PaymentMetrics {
    pub fn initiated(content_type: &str) {
        ::metrics::counter!(PAYMENTS_INITIATED, "content_type" => content_type.to_string()).increment(1);
    }

    pub fn completed(content_type: &str) {
        ::metrics::counter!(PAYMENTS_COMPLETED, "content_type" => content_type.to_string()).increment(1);
    }

    pub fn failed(reason: &'static str) {
        ::metrics::counter!(PAYMENTS_FAILED, "reason" => reason).increment(1);
    }

    pub fn coupon_redeemed() {
        ::metrics::counter!(COUPONS_REDEEMED).increment(1);
    }

    pub fn webhook_received(source: &'static str) {
        ::metrics::counter!(WEBHOOKS_RECEIVED, "source" => source).increment(1);
    }
}
