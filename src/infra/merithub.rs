use crate::app::ports::{ClassSchedule, LiveUser, LiveVideoPort, ScheduledClass};
use crate::config::MeritHubConfig;
use crate::error::{ClassroomError, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

#[derive(Debug, Serialize)]
struct Assertion {
    aud: String,
    iss: String,
    expiry: f64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserResponse {
    user_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommonLinks {
    common_host_link: String,
    common_moderator_link: String,
    common_participant_link: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleResponse {
    class_id: String,
    host_link: String,
    common_links: CommonLinks,
}

/// MeritHub client. The access token is fetched lazily and reused until the
/// provider rejects it.
pub struct MeritHubClient {
    http: reqwest::Client,
    config: MeritHubConfig,
    token: Mutex<Option<String>>,
}

impl MeritHubClient {
    pub fn new(config: MeritHubConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .build()?;
        Ok(Self {
            http,
            config,
            token: Mutex::new(None),
        })
    }

    fn token_url(&self) -> String {
        format!("{}{}/api/token", self.config.base_url, self.config.client_id)
    }

    /// Short-lived HS256 assertion exchanged for an access token.
    pub fn assertion(&self) -> Result<String> {
        let claims = Assertion {
            aud: self.token_url(),
            iss: self.config.client_id.clone(),
            expiry: (Utc::now() + Duration::hours(1)).timestamp() as f64,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.secret_key.as_bytes()),
        )
        .map_err(|e| ClassroomError::gateway("merithub", format!("failed to sign assertion: {e}")))
    }

    pub fn room_url(&self, link: &str) -> String {
        format!("{}{}/{}", self.config.room_url, self.config.client_id, link)
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let assertion = self.assertion()?;
        let resp = self
            .http
            .post(self.token_url())
            .form(&[("assertion", assertion.as_str()), ("grant_type", JWT_BEARER_GRANT)])
            .send()
            .await?;
        let resp = check_status(resp, "token exchange").await?;
        let token: TokenResponse = resp.json().await?;
        debug!("Obtained MeritHub access token");
        *cached = Some(token.access_token.clone());
        Ok(token.access_token)
    }

    async fn send_json(&self, method: reqwest::Method, url: String, body: Option<serde_json::Value>, what: &str)
        -> Result<reqwest::Response> {
        let token = self.access_token().await?;
        let mut req = self
            .http
            .request(method, &url)
            .header(AUTHORIZATION, token)
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req.send().await?;
        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            // force a fresh token on the next call
            self.token.lock().await.take();
        }
        check_status(resp, what).await
    }
}

async fn check_status(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    warn!("MeritHub {} failed with {}: {}", what, status, body);
    Err(ClassroomError::gateway("merithub", format!("{what} returned {status}")))
}

fn user_list(user_ids: &[String]) -> serde_json::Value {
    json!({
        "users": user_ids
            .iter()
            .map(|id| json!({ "userId": id, "userType": "su" }))
            .collect::<Vec<_>>()
    })
}

#[async_trait]
impl LiveVideoPort for MeritHubClient {
    async fn create_user(&self, user: &LiveUser) -> Result<String> {
        let url = format!("{}{}/users", self.config.base_url, self.config.client_id);
        let resp = self
            .send_json(reqwest::Method::POST, url, Some(serde_json::to_value(user)?), "create user")
            .await?;
        let created: CreateUserResponse = resp.json().await?;
        info!("Registered {} with MeritHub as {}", user.email, created.user_id);
        Ok(created.user_id)
    }

    async fn schedule_class(&self, host_user_id: &str, class: &ClassSchedule) -> Result<ScheduledClass> {
        let url = format!("{}{}/{}", self.config.class_url, self.config.client_id, host_user_id);
        let resp = self
            .send_json(reqwest::Method::POST, url, Some(serde_json::to_value(class)?), "schedule class")
            .await?;
        let data: ScheduleResponse = resp.json().await?;
        info!("Scheduled MeritHub class {} '{}'", data.class_id, class.title);
        Ok(ScheduledClass {
            host_link: self.room_url(&data.host_link),
            common_host_link: self.room_url(&data.common_links.common_host_link),
            common_moderator_link: self.room_url(&data.common_links.common_moderator_link),
            common_participant_link: self.room_url(&data.common_links.common_participant_link),
            class_id: data.class_id,
        })
    }

    async fn add_users(&self, class_id: &str, user_ids: &[String]) -> Result<()> {
        let url = format!("{}{}/{}/users", self.config.class_url, self.config.client_id, class_id);
        self.send_json(reqwest::Method::POST, url, Some(user_list(user_ids)), "add users")
            .await?;
        Ok(())
    }

    async fn remove_users(&self, class_id: &str, user_ids: &[String]) -> Result<()> {
        let url = format!("{}{}/{}/removeuser", self.config.class_url, self.config.client_id, class_id);
        self.send_json(reqwest::Method::POST, url, Some(user_list(user_ids)), "remove users")
            .await?;
        Ok(())
    }

    async fn delete_class(&self, class_id: &str) -> Result<()> {
        let url = format!("{}{}/{}", self.config.class_url, self.config.client_id, class_id);
        self.send_json(reqwest::Method::DELETE, url, None, "delete class").await?;
        Ok(())
    }
}
