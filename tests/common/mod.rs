#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use classroom::api::{create_server, AppState, Services};
use classroom::app::ports::{ClassSchedule, LiveUser, LiveVideoPort, PushPort, PushReport, ScheduledClass, SmsPort};
use classroom::config::AppConfig;
use classroom::domain::user::{NewUser, Role, User};
use classroom::error::Result;
use classroom::infra::razorpay::RazorpayClient;
use classroom::storage::{SqliteStorage, Storage};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const KEY_SECRET: &str = "test_key_secret";
pub const WEBHOOK_SECRET: &str = "test_webhook_secret";

#[derive(Default)]
pub struct Outbox {
    pub messages: Mutex<Vec<(String, String)>>,
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

impl Outbox {
    /// The code is the first word of the most recent message.
    pub fn last_code(&self) -> String {
        let messages = self.messages.lock().unwrap();
        let (_, text) = messages.last().expect("no SMS sent");
        text.split_whitespace().next().unwrap().to_string()
    }
}

pub struct NoPush;

#[async_trait]
impl PushPort for NoPush {
    async fn send(&self, registration_ids: &[String], _title: &str, _body: &str) -> Result<PushReport> {
        Ok(PushReport {
            success: registration_ids.len(),
            failure: 0,
        })
    }
}

pub struct NoVideo;

#[async_trait]
impl LiveVideoPort for NoVideo {
    async fn create_user(&self, user: &LiveUser) -> Result<String> {
        Ok(format!("merit-{}", user.client_user_id))
    }

    async fn schedule_class(&self, _host_user_id: &str, _class: &ClassSchedule) -> Result<ScheduledClass> {
        Ok(ScheduledClass {
            class_id: "class-1".into(),
            host_link: "https://live.example/host".into(),
            common_host_link: "https://live.example/common-host".into(),
            common_moderator_link: "https://live.example/moderator".into(),
            common_participant_link: "https://live.example/participant".into(),
        })
    }

    async fn add_users(&self, _class_id: &str, _user_ids: &[String]) -> Result<()> {
        Ok(())
    }

    async fn remove_users(&self, _class_id: &str, _user_ids: &[String]) -> Result<()> {
        Ok(())
    }

    async fn delete_class(&self, _class_id: &str) -> Result<()> {
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub storage: Arc<SqliteStorage>,
    pub outbox: Arc<Outbox>,
    pub razorpay: MockServer,
}

impl TestApp {
    /// In-memory database and a mock Razorpay that hands out `order_test_1`.
    pub async fn spawn() -> Self {
        let razorpay = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(|req: &wiremock::Request| {
                let body: Value = serde_json::from_slice(&req.body).unwrap();
                ResponseTemplate::new(200).set_body_json(json!({
                    "id": "order_test_1",
                    "amount": body["amount"],
                    "currency": body["currency"],
                    "status": "created"
                }))
            })
            .mount(&razorpay)
            .await;

        let mut config = AppConfig::default();
        config.auth.jwt_secret = "integration-secret".into();
        config.razorpay.base_url = razorpay.uri();
        config.razorpay.key_id = "rzp_test_key".into();
        config.razorpay.key_secret = KEY_SECRET.into();
        config.razorpay.webhook_secret = WEBHOOK_SECRET.into();

        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let outbox = Arc::new(Outbox::default());
        let services = Services {
            gateway: Arc::new(RazorpayClient::new(config.razorpay.clone()).unwrap()),
            video: Arc::new(NoVideo),
            sms: outbox.clone(),
            push: Arc::new(NoPush),
        };
        let state = AppState::new(&config, storage.clone() as Arc<dyn Storage>, services);

        Self {
            router: create_server(state.clone()),
            state,
            storage,
            outbox,
            razorpay,
        }
    }

    pub async fn admin(&self) -> (User, String) {
        let user = self
            .storage
            .create_user(&NewUser {
                email: "admin@example.com".into(),
                phone_number: "+919000000001".into(),
                full_name: "Admin".into(),
                role: Role::Admin,
                is_staff: true,
            })
            .await
            .unwrap();
        let token = self.state.tokens.issue(&user).unwrap();
        (user, token)
    }

    pub async fn student(&self, email: &str, phone: &str) -> (User, String) {
        let user = self
            .storage
            .create_user(&NewUser::student(email, phone, "Student").validated().unwrap())
            .await
            .unwrap();
        let token = self.state.tokens.issue(&user).unwrap();
        (user, token)
    }

    pub async fn request(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
        };
        (status, body)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(token), Some(body)).await
    }
}
