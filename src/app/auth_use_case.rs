use crate::app::ports::SmsPort;
use crate::domain::user::{normalize_phone, NewUser, OtpChallenge, OtpPurpose, Role, User};
use crate::error::{ClassroomError, Result};
use crate::infra::jwt::TokenIssuer;
use crate::infra::totp::Totp;
use crate::storage::Storage;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

const INVALID_OTP: &str = "Invalid OTP or Expired, Resend again";
/// Wrong codes tolerated per challenge before it is burned.
const MAX_OTP_FAILURES: u32 = 5;

#[derive(Debug, Clone, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub phone_number: String,
    pub full_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyOtpRequest {
    pub otp: String,
    pub reference_key: String,
    pub registration_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OtpSent {
    pub message: &'static str,
    pub reference_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginTokens {
    pub access: String,
    pub message: &'static str,
    pub role: Role,
}

/// Phone-number login: an SMS one-time password exchanged for a bearer token.
pub struct AuthUseCase {
    storage: Arc<dyn Storage>,
    sms: Arc<dyn SmsPort>,
    tokens: Arc<TokenIssuer>,
    totp: Totp,
    step_secs: u64,
    brand: String,
}

impl AuthUseCase {
    pub fn new(
        storage: Arc<dyn Storage>,
        sms: Arc<dyn SmsPort>,
        tokens: Arc<TokenIssuer>,
        step_secs: u64,
        brand: String,
    ) -> Self {
        Self {
            storage,
            sms,
            tokens,
            totp: Totp::new(step_secs),
            step_secs: step_secs.max(1),
            brand,
        }
    }

    pub async fn signup(&self, request: SignupRequest) -> Result<OtpSent> {
        let new_user = NewUser::student(&request.email, &request.phone_number, &request.full_name).validated()?;
        if self.storage.find_user_by_email(&new_user.email).await?.is_some() {
            return Err(ClassroomError::invalid("email", "Email is already in use."));
        }
        if self.storage.find_user_by_phone(&new_user.phone_number).await?.is_some() {
            return Err(ClassroomError::invalid("phone_number", "Phone number is already in use."));
        }
        let user = self.storage.create_user(&new_user).await?;
        info!("Student {} signed up", user.id);
        let reference_key = self.send_otp(&user, OtpPurpose::Signup).await?;
        Ok(OtpSent {
            message: "Please verify OTP sent to your phone number",
            reference_key,
        })
    }

    pub async fn login(&self, phone_number: &str) -> Result<OtpSent> {
        let user = self.active_user(phone_number).await?;
        Ok(OtpSent {
            message: "OTP sent to your phone number",
            reference_key: self.send_otp(&user, OtpPurpose::Login).await?,
        })
    }

    pub async fn resend(&self, phone_number: &str) -> Result<OtpSent> {
        let user = self.active_user(phone_number).await?;
        Ok(OtpSent {
            message: "OTP resent to your phone number",
            reference_key: self.send_otp(&user, OtpPurpose::Login).await?,
        })
    }

    /// Check the code against its challenge; a challenge can be used once.
    pub async fn verify(&self, request: VerifyOtpRequest) -> Result<LoginTokens> {
        let now = Utc::now();
        let challenge = self
            .storage
            .get_otp(request.reference_key.trim())
            .await?
            .filter(|c| !c.consumed && c.expires_at > now)
            .ok_or_else(|| ClassroomError::invalid("otp", INVALID_OTP))?;

        let unix_now = u64::try_from(now.timestamp()).unwrap_or_default();
        if !self.totp.verify(&challenge.secret, &request.otp, unix_now) {
            let failures = self
                .storage
                .record_otp_failure(&challenge.token, MAX_OTP_FAILURES)
                .await?;
            warn!(
                "Wrong OTP for user {} ({}/{} attempts)",
                challenge.user_id, failures, MAX_OTP_FAILURES
            );
            return Err(ClassroomError::invalid("otp", INVALID_OTP));
        }
        if !self.storage.consume_otp(&challenge.token).await? {
            return Err(ClassroomError::invalid("otp", INVALID_OTP));
        }

        let user = self
            .storage
            .get_user(challenge.user_id)
            .await?
            .ok_or_else(|| ClassroomError::invalid("otp", INVALID_OTP))?;
        if let Some(registration_id) = request.registration_id.as_deref().filter(|r| !r.trim().is_empty()) {
            self.storage.register_device(user.id, registration_id.trim()).await?;
        }

        info!("User {} verified via {} OTP", user.id, challenge.purpose.as_str());
        Ok(LoginTokens {
            access: self.tokens.issue(&user)?,
            message: "Phone verified",
            role: user.role,
        })
    }

    async fn active_user(&self, phone_number: &str) -> Result<User> {
        let phone_number = normalize_phone(phone_number)?;
        let user = self
            .storage
            .find_user_by_phone(&phone_number)
            .await?
            .ok_or_else(|| ClassroomError::invalid("phone_number", "User with this phone number does not exist."))?;
        if !user.is_active {
            return Err(ClassroomError::invalid(
                "phone_number",
                "This account is inactive. Please contact the admin for activation.",
            ));
        }
        Ok(user)
    }

    /// Store a fresh challenge and text the code. Returns the opaque reference key.
    async fn send_otp(&self, user: &User, purpose: OtpPurpose) -> Result<String> {
        let now = Utc::now();
        let secret = Totp::generate_secret();
        let code = self
            .totp
            .code_at(&secret, u64::try_from(now.timestamp()).unwrap_or_default());
        let challenge = OtpChallenge {
            token: uuid::Uuid::new_v4().simple().to_string(),
            user_id: user.id,
            secret,
            purpose,
            // the verify window accepts one step either side
            expires_at: now + Duration::seconds(i64::try_from(self.step_secs * 2).unwrap_or(600)),
            consumed: false,
        };
        self.storage.save_otp(&challenge).await?;

        let message = otp_message(purpose, &code, &self.brand, self.step_secs / 60);
        if let Err(e) = self.sms.send(&user.phone_number, &message).await {
            warn!("Failed to send OTP to user {}: {}", user.id, e);
        }
        Ok(challenge.token)
    }
}

fn otp_message(purpose: OtpPurpose, code: &str, brand: &str, minutes: u64) -> String {
    let kind = match purpose {
        OtpPurpose::Signup => "Registration",
        OtpPurpose::Login => "Login",
    };
    format!(
        "{code} is Your {kind} OTP for {brand}. It is valid for {minutes} minutes. \
         Please do not share it with anyone. Team {brand}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Outbox {
        messages: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl SmsPort for Outbox {
        async fn send(&self, phone_number: &str, message: &str) -> Result<()> {
            self.messages
                .lock()
                .unwrap()
                .push((phone_number.to_string(), message.to_string()));
            Ok(())
        }
    }

    fn setup() -> (AuthUseCase, Arc<SqliteStorage>, Arc<Outbox>) {
        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let outbox = Arc::new(Outbox::default());
        let use_case = AuthUseCase::new(
            storage.clone(),
            outbox.clone(),
            Arc::new(TokenIssuer::new(b"test-secret", 1)),
            300,
            "Classroom".into(),
        );
        (use_case, storage, outbox)
    }

    fn code_for(use_case: &AuthUseCase, challenge: &OtpChallenge) -> String {
        use_case
            .totp
            .code_at(&challenge.secret, u64::try_from(Utc::now().timestamp()).unwrap_or_default())
    }

    fn code_from(message: &str) -> String {
        message.split_whitespace().next().unwrap().to_string()
    }

    #[test]
    fn test_otp_message() {
        let msg = otp_message(OtpPurpose::Login, "123456", "Classroom", 5);
        assert!(msg.starts_with("123456 is Your Login OTP for Classroom. It is valid for 5 minutes."));
    }

    #[tokio::test]
    async fn test_signup_then_verify() {
        let (use_case, _, outbox) = setup();
        let sent = use_case
            .signup(SignupRequest {
                email: "new@example.com".into(),
                phone_number: "9876543210".into(),
                full_name: "New Student".into(),
            })
            .await
            .unwrap();
        assert_eq!(sent.message, "Please verify OTP sent to your phone number");

        let (phone, message) = outbox.messages.lock().unwrap()[0].clone();
        assert_eq!(phone, "+919876543210");
        assert!(message.contains("Registration OTP"));

        let tokens = use_case
            .verify(VerifyOtpRequest {
                otp: code_from(&message),
                reference_key: sent.reference_key.clone(),
                registration_id: None,
            })
            .await
            .unwrap();
        assert_eq!(tokens.message, "Phone verified");
        assert_eq!(tokens.role, Role::Student);

        // second use of the same challenge fails
        let err = use_case
            .verify(VerifyOtpRequest {
                otp: code_from(&message),
                reference_key: sent.reference_key,
                registration_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ClassroomError::Validation { ref field, .. } if field == "otp"));
    }

    #[tokio::test]
    async fn test_login_requires_existing_user() {
        let (use_case, storage, _) = setup();
        let err = use_case.login("9876500000").await.unwrap_err();
        assert!(
            matches!(err, ClassroomError::Validation { ref message, .. } if message == "User with this phone number does not exist.")
        );

        storage
            .create_user(&NewUser::student("x@example.com", "9876500000", "X"))
            .await
            .unwrap();
        assert_eq!(use_case.login("9876500000").await.unwrap().message, "OTP sent to your phone number");
        assert_eq!(
            use_case.resend("+919876500000").await.unwrap().message,
            "OTP resent to your phone number"
        );
    }

    #[tokio::test]
    async fn test_wrong_code_rejected() {
        let (use_case, storage, _) = setup();
        storage
            .create_user(&NewUser::student("y@example.com", "9876511111", "Y"))
            .await
            .unwrap();
        let sent = use_case.login("9876511111").await.unwrap();
        let challenge = storage.get_otp(&sent.reference_key).await.unwrap().unwrap();
        let right = code_for(&use_case, &challenge);
        let wrong = if right == "000000" { "111111" } else { "000000" };

        let err = use_case
            .verify(VerifyOtpRequest {
                otp: wrong.into(),
                reference_key: sent.reference_key,
                registration_id: Some("device-token".into()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ClassroomError::Validation { ref message, .. } if message == INVALID_OTP));
    }

    #[tokio::test]
    async fn test_challenge_burned_after_repeated_wrong_codes() {
        let (use_case, storage, _) = setup();
        storage
            .create_user(&NewUser::student("z@example.com", "9876522222", "Z"))
            .await
            .unwrap();
        let sent = use_case.login("9876522222").await.unwrap();
        let challenge = storage.get_otp(&sent.reference_key).await.unwrap().unwrap();
        let right = code_for(&use_case, &challenge);
        let wrong = if right == "000000" { "111111" } else { "000000" };

        for _ in 0..MAX_OTP_FAILURES {
            let err = use_case
                .verify(VerifyOtpRequest {
                    otp: wrong.into(),
                    reference_key: sent.reference_key.clone(),
                    registration_id: None,
                })
                .await
                .unwrap_err();
            assert!(matches!(err, ClassroomError::Validation { ref message, .. } if message == INVALID_OTP));
        }
        assert!(storage.get_otp(&sent.reference_key).await.unwrap().unwrap().consumed);

        // the right code no longer works either
        let err = use_case
            .verify(VerifyOtpRequest {
                otp: right,
                reference_key: sent.reference_key,
                registration_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ClassroomError::Validation { ref field, .. } if field == "otp"));
    }
}
