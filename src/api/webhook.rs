use crate::api::AppState;
use crate::error::{ClassroomError, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

const RAZORPAY_SIGNATURE: &str = "x-razorpay-signature";

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/razorpay", post(razorpay))
        .route("/merithub", post(merithub))
}

/// The signature covers the raw bytes, so the body is not parsed up front.
async fn razorpay(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<Value>> {
    let signature = headers.get(RAZORPAY_SIGNATURE).and_then(|v| v.to_str().ok());
    let outcome = state.payments.handle_webhook(&body, signature).await?;
    Ok(Json(json!({ "message": outcome.message() })))
}

async fn merithub(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>> {
    let payload: Value = serde_json::from_slice(&body).map_err(|_| ClassroomError::non_field("Invalid payload."))?;
    let ack = state.live_classes.handle_webhook(payload).await?;
    Ok(Json(json!({ "message": ack })))
}
