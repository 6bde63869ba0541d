use crate::app::ports::PaymentGatewayPort;
use crate::config::RazorpayConfig;
use crate::domain::payment::GatewayOrder;
use crate::error::{ClassroomError, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

/// hex(HMAC-SHA256(secret, message))
pub fn hmac_sha256_hex(secret: &str, message: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(message);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time comparison of an expected hex digest with the one supplied.
fn signature_matches(secret: &str, message: &[u8], supplied: &str) -> bool {
    if secret.is_empty() || supplied.is_empty() {
        return false;
    }
    match hmac_sha256_hex(secret, message) {
        Some(expected) => expected.as_bytes().ct_eq(supplied.trim().as_bytes()).into(),
        None => false,
    }
}

#[derive(Serialize)]
struct OrderRequest<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    payment_capture: u8,
}

#[derive(Deserialize)]
struct OrderResponse {
    id: String,
    amount: i64,
    currency: String,
}

pub struct RazorpayClient {
    http: reqwest::Client,
    config: RazorpayConfig,
}

impl RazorpayClient {
    pub fn new(config: RazorpayConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl PaymentGatewayPort for RazorpayClient {
    fn key_id(&self) -> &str {
        &self.config.key_id
    }

    async fn create_order(&self, amount_minor: i64, currency: &str, receipt: &str) -> Result<GatewayOrder> {
        let url = format!("{}/orders", self.config.base_url.trim_end_matches('/'));
        let resp = self
            .http
            .post(&url)
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(&OrderRequest {
                amount: amount_minor,
                currency,
                receipt,
                payment_capture: 1,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Razorpay order creation failed with {}: {}", status, body);
            return Err(ClassroomError::gateway(
                "razorpay",
                format!("order creation returned {status}"),
            ));
        }

        let order: OrderResponse = resp.json().await?;
        debug!("Created Razorpay order {} for {} {}", order.id, order.amount, order.currency);
        Ok(GatewayOrder {
            id: order.id,
            amount: order.amount,
            currency: order.currency,
        })
    }

    fn verify_payment_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        let message = format!("{order_id}|{payment_id}");
        signature_matches(&self.config.key_secret, message.as_bytes(), signature)
    }

    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool {
        signature_matches(&self.config.webhook_secret, body, signature)
    }
}
