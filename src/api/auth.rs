use crate::api::extract::{AuthUser, JsonBody};
use crate::api::AppState;
use crate::app::auth_use_case::{LoginTokens, OtpSent, SignupRequest, VerifyOtpRequest};
use crate::domain::user::User;
use crate::error::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

#[derive(Deserialize)]
struct PhoneRequest {
    phone_number: String,
}

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/resend-otp", post(resend_otp))
        .route("/verify-otp", post(verify_otp))
        .route("/me", get(me))
}

async fn signup(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<SignupRequest>,
) -> Result<(StatusCode, Json<OtpSent>)> {
    Ok((StatusCode::CREATED, Json(state.auth.signup(request).await?)))
}

async fn login(State(state): State<AppState>, JsonBody(request): JsonBody<PhoneRequest>) -> Result<Json<OtpSent>> {
    Ok(Json(state.auth.login(&request.phone_number).await?))
}

async fn resend_otp(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<PhoneRequest>,
) -> Result<Json<OtpSent>> {
    Ok(Json(state.auth.resend(&request.phone_number).await?))
}

async fn verify_otp(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<VerifyOtpRequest>,
) -> Result<Json<LoginTokens>> {
    Ok(Json(state.auth.verify(request).await?))
}

async fn me(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}
