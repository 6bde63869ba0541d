use crate::app::ports::{PushPort, PushReport};
use crate::config::PushConfig;
use crate::error::{ClassroomError, Result};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

/// The legacy endpoint accepts at most this many registration ids per call.
const MAX_RECIPIENTS: usize = 1000;

#[derive(Deserialize)]
struct FcmResponse {
    #[serde(default)]
    success: usize,
    #[serde(default)]
    failure: usize,
}

pub struct FcmPush {
    http: reqwest::Client,
    config: PushConfig,
}

impl FcmPush {
    pub fn new(config: PushConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl PushPort for FcmPush {
    async fn send(&self, registration_ids: &[String], title: &str, body: &str) -> Result<PushReport> {
        let mut report = PushReport::default();
        for chunk in registration_ids.chunks(MAX_RECIPIENTS) {
            let resp = self
                .http
                .post(&self.config.endpoint)
                .header(AUTHORIZATION, format!("key={}", self.config.server_key))
                .json(&json!({
                    "registration_ids": chunk,
                    "notification": { "title": title, "body": body },
                }))
                .send()
                .await?;
            if !resp.status().is_success() {
                return Err(ClassroomError::gateway("fcm", format!("send returned {}", resp.status())));
            }
            let parsed: FcmResponse = resp.json().await?;
            report.success += parsed.success;
            report.failure += parsed.failure;
        }
        debug!("Push delivered: {} ok, {} failed", report.success, report.failure);
        Ok(report)
    }
}
