use crate::error::{ClassroomError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub fees: FeeConfig,
    pub razorpay: RazorpayConfig,
    pub merithub: MeritHubConfig,
    pub sms: SmsConfig,
    pub push: PushConfig,
    pub auth: AuthConfig,
    pub branding: BrandingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/classroom.db".to_string(),
        }
    }
}

/// Fixed charges added on top of every priced item.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
    pub internet_charges: Decimal,
    pub platform_fee: Decimal,
    pub gst_percentage: Decimal,
    pub currency: String,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            internet_charges: Decimal::new(1000, 2),
            platform_fee: Decimal::new(1000, 2),
            gst_percentage: Decimal::new(18, 0),
            currency: "INR".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RazorpayConfig {
    pub base_url: String,
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: String,
}

impl Default for RazorpayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.razorpay.com/v1".to_string(),
            key_id: String::new(),
            key_secret: String::new(),
            webhook_secret: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MeritHubConfig {
    pub base_url: String,
    pub class_url: String,
    pub room_url: String,
    pub client_id: String,
    pub secret_key: String,
    pub time_zone: String,
}

impl Default for MeritHubConfig {
    fn default() -> Self {
        Self {
            base_url: "https://serviceaccount1.meritgraph.com/v1/".to_string(),
            class_url: "https://class1.meritgraph.com/v1/".to_string(),
            room_url: "https://live.merithub.com/info/room/".to_string(),
            client_id: String::new(),
            secret_key: String::new(),
            time_zone: "Asia/Kolkata".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmsConfig {
    pub base_url: String,
    pub api_key: String,
    pub sender: String,
    pub brand: String,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.textlocal.in/send/".to_string(),
            api_key: String::new(),
            sender: String::new(),
            brand: "Classroom".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    pub endpoint: String,
    pub server_key: String,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://fcm.googleapis.com/fcm/send".to_string(),
            server_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    /// OTP validity in seconds (TOTP step)
    pub otp_step_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_hours: 24 * 7,
            otp_step_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrandingConfig {
    pub name: String,
    pub image: String,
}

impl Default for BrandingConfig {
    fn default() -> Self {
        Self {
            name: "Classroom".to_string(),
            image: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub addr: Option<String>,
}

impl AppConfig {
    /// Load configuration from a TOML file (optional) and apply environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = path.unwrap_or(DEFAULT_CONFIG_PATH);
        let mut config = if Path::new(config_path).exists() {
            let config_content = fs::read_to_string(config_path).map_err(|e| {
                ClassroomError::Config(format!(
                    "Failed to read config file '{}': {}",
                    config_path, e
                ))
            })?;
            info!("Loaded configuration from {}", config_path);
            toml::from_str::<AppConfig>(&config_content)?
        } else {
            if path.is_some() {
                return Err(ClassroomError::Config(format!(
                    "Config file '{}' does not exist",
                    config_path
                )));
            }
            warn!("No {} found, using defaults", config_path);
            AppConfig::default()
        };

        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        override_string(&mut self.database.path, "DATABASE_PATH");
        override_string(&mut self.razorpay.key_id, "RAZORPAY_KEY_ID");
        override_string(&mut self.razorpay.key_secret, "RAZORPAY_KEY_SECRET");
        override_string(&mut self.razorpay.webhook_secret, "RAZORPAY_WEBHOOK_SECRET");
        override_string(&mut self.merithub.client_id, "MERITHUB_CLIENT_ID");
        override_string(&mut self.merithub.secret_key, "MERITHUB_SECRET_KEY");
        override_string(&mut self.sms.api_key, "TEXTLOCAL_API_KEY");
        override_string(&mut self.sms.sender, "TEXTLOCAL_SENDER");
        override_string(&mut self.push.server_key, "FCM_SERVER_KEY");
        override_string(&mut self.auth.jwt_secret, "JWT_SECRET");

        if let Ok(port) = env::var("PORT") {
            match port.parse() {
                Ok(p) => self.server.port = p,
                Err(_) => warn!("Ignoring invalid PORT value '{}'", port),
            }
        }
        if let Ok(addr) = env::var("METRICS_ADDR") {
            self.metrics.addr = Some(addr);
        }
    }

    /// Secrets the server cannot run without.
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.is_empty() {
            return Err(ClassroomError::Config("JWT_SECRET is not set".to_string()));
        }
        if self.razorpay.key_secret.is_empty() {
            warn!("RAZORPAY_KEY_SECRET is not set; payment verification will fail");
        }
        Ok(())
    }
}

fn override_string(target: &mut String, var: &str) {
    if let Ok(value) = env::var(var) {
        if !value.is_empty() {
            *target = value;
        }
    }
}
