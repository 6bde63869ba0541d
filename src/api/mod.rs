//! HTTP surface: JSON routes over the application use cases.
//!
//! | Prefix                 | Caller  | Routes |
//! |------------------------|---------|--------|
//! | `/api/auth`            | anyone  | `signup`, `login`, `resend-otp`, `verify-otp`, `me` |
//! | `/api`                 | anyone  | published `courses`, `test-series` |
//! | `/api`                 | student | `batches/*`, `student/*` purchases, `fees`, `devices` |
//! | `/api/payments`        | student | purchases, `verify-payment`, `apply-coupon`, pricing, `student-transactions` |
//! | `/api/admin`           | admin   | catalog, `product-orders`, coupons, enrollments, `fees`, transactions, live classes, notifications |
//! | `/api/webhooks`        | signed  | `razorpay`, `merithub` |

use crate::app::auth_use_case::AuthUseCase;
use crate::app::catalog_use_case::CatalogUseCase;
use crate::app::coupon_use_case::CouponUseCase;
use crate::app::enrollment_use_case::EnrollmentUseCase;
use crate::app::live_class_use_case::LiveClassUseCase;
use crate::app::notification_use_case::NotificationUseCase;
use crate::app::payment_use_case::PaymentUseCase;
use crate::app::ports::{LiveVideoPort, PaymentGatewayPort, PushPort, SmsPort};
use crate::config::AppConfig;
use crate::error::Result;
use crate::infra::fcm::FcmPush;
use crate::infra::jwt::TokenIssuer;
use crate::infra::merithub::MeritHubClient;
use crate::infra::razorpay::RazorpayClient;
use crate::infra::textlocal::TextlocalSms;
use crate::storage::Storage;
use axum::http::{header, Method};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod error;
pub mod extract;

mod admin;
mod auth;
mod catalog;
mod payment;
mod student;
mod webhook;

/// Outbound services the use cases talk to.
#[derive(Clone)]
pub struct Services {
    pub gateway: Arc<dyn PaymentGatewayPort>,
    pub video: Arc<dyn LiveVideoPort>,
    pub sms: Arc<dyn SmsPort>,
    pub push: Arc<dyn PushPort>,
}

impl Services {
    /// Production adapters built from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            gateway: Arc::new(RazorpayClient::new(config.razorpay.clone())?),
            video: Arc::new(MeritHubClient::new(config.merithub.clone())?),
            sms: Arc::new(TextlocalSms::new(config.sms.clone())),
            push: Arc::new(FcmPush::new(config.push.clone())),
        })
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub tokens: Arc<TokenIssuer>,
    pub auth: Arc<AuthUseCase>,
    pub catalog: Arc<CatalogUseCase>,
    pub coupons: Arc<CouponUseCase>,
    pub enrollments: Arc<EnrollmentUseCase>,
    pub live_classes: Arc<LiveClassUseCase>,
    pub notifications: Arc<NotificationUseCase>,
    pub payments: Arc<PaymentUseCase>,
}

impl AppState {
    pub fn new(config: &AppConfig, storage: Arc<dyn Storage>, services: Services) -> Self {
        let tokens = Arc::new(TokenIssuer::new(
            config.auth.jwt_secret.as_bytes(),
            config.auth.token_ttl_hours,
        ));
        Self {
            auth: Arc::new(AuthUseCase::new(
                storage.clone(),
                services.sms,
                tokens.clone(),
                config.auth.otp_step_secs,
                config.sms.brand.clone(),
            )),
            catalog: Arc::new(CatalogUseCase::new(storage.clone())),
            coupons: Arc::new(CouponUseCase::new(storage.clone())),
            enrollments: Arc::new(EnrollmentUseCase::new(storage.clone(), config.fees.clone())),
            live_classes: Arc::new(LiveClassUseCase::new(
                storage.clone(),
                services.video,
                config.merithub.time_zone.clone(),
            )),
            notifications: Arc::new(NotificationUseCase::new(storage.clone(), services.push)),
            payments: Arc::new(PaymentUseCase::new(
                storage.clone(),
                services.gateway,
                config.fees.clone(),
                config.branding.clone(),
            )),
            storage,
            tokens,
        }
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "classroom",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Build the router with every route mounted.
pub fn create_server(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let api = Router::new()
        .nest("/auth", auth::routes())
        .nest("/admin", admin::routes())
        .nest("/payments", payment::routes())
        .nest("/webhooks", webhook::routes())
        .merge(catalog::routes())
        .merge(student::routes());

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn start_server(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let app = create_server(state);
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!("Classroom API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
