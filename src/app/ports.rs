use crate::domain::payment::GatewayOrder;
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;

// Payment gateway
#[async_trait]
pub trait PaymentGatewayPort: Send + Sync {
    /// Public key handed to the checkout widget.
    fn key_id(&self) -> &str;
    async fn create_order(&self, amount_minor: i64, currency: &str, receipt: &str) -> Result<GatewayOrder>;
    fn verify_payment_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool;
    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool;
}

// Live video
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveUser {
    pub name: String,
    pub email: String,
    pub client_user_id: String,
    pub role: String,
    pub time_zone: String,
    pub permission: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingOptions {
    pub record: bool,
    pub auto_record: bool,
    pub recording_control: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct ParticipantControl {
    pub write: bool,
    pub audio: bool,
    pub video: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSchedule {
    pub title: String,
    pub start_time: String,
    pub end_date: String,
    pub duration: u32,
    pub lang: String,
    pub time_zone_id: String,
    pub description: String,
    #[serde(rename = "type")]
    pub class_type: String,
    pub access: String,
    pub login: bool,
    pub layout: String,
    pub status: String,
    pub recording: RecordingOptions,
    pub participant_control: ParticipantControl,
    pub schedule: Vec<u32>,
    pub total_classes: u32,
}

/// Provider ids plus fully-qualified room links.
#[derive(Clone, Debug)]
pub struct ScheduledClass {
    pub class_id: String,
    pub host_link: String,
    pub common_host_link: String,
    pub common_moderator_link: String,
    pub common_participant_link: String,
}

#[async_trait]
pub trait LiveVideoPort: Send + Sync {
    /// Register a user with the provider, returning the provider's user id.
    async fn create_user(&self, user: &LiveUser) -> Result<String>;
    async fn schedule_class(&self, host_user_id: &str, class: &ClassSchedule) -> Result<ScheduledClass>;
    async fn add_users(&self, class_id: &str, user_ids: &[String]) -> Result<()>;
    async fn remove_users(&self, class_id: &str, user_ids: &[String]) -> Result<()>;
    async fn delete_class(&self, class_id: &str) -> Result<()>;
}

// Messaging
#[async_trait]
pub trait SmsPort: Send + Sync {
    async fn send(&self, phone_number: &str, message: &str) -> Result<()>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PushReport {
    pub success: usize,
    pub failure: usize,
}

#[async_trait]
pub trait PushPort: Send + Sync {
    async fn send(&self, registration_ids: &[String], title: &str, body: &str) -> Result<PushReport>;
}
