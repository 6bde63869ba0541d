use crate::app::ports::SmsPort;
use crate::config::SmsConfig;
use crate::error::{ClassroomError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Deserialize)]
struct SendResponse {
    status: String,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

pub struct TextlocalSms {
    http: reqwest::Client,
    config: SmsConfig,
}

impl TextlocalSms {
    pub fn new(config: SmsConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

/// Textlocal wants the number without the leading `+`.
fn textlocal_number(phone_number: &str) -> &str {
    phone_number.trim_start_matches('+')
}

#[async_trait]
impl SmsPort for TextlocalSms {
    async fn send(&self, phone_number: &str, message: &str) -> Result<()> {
        let resp = self
            .http
            .post(&self.config.base_url)
            .form(&[
                ("apikey", self.config.api_key.as_str()),
                ("numbers", textlocal_number(phone_number)),
                ("sender", self.config.sender.as_str()),
                ("message", message),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ClassroomError::gateway("textlocal", format!("send returned {}", resp.status())));
        }
        let body: SendResponse = resp.json().await?;
        if body.status != "success" {
            warn!("Textlocal rejected message to {}: {:?}", phone_number, body.errors);
            return Err(ClassroomError::gateway("textlocal", "message was not accepted"));
        }
        info!("Sent SMS to {}", phone_number);
        Ok(())
    }
}
