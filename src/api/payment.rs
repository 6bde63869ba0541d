use crate::api::extract::{AuthUser, JsonBody};
use crate::api::AppState;
use crate::app::payment_use_case::Quote;
use crate::domain::payment::{CheckoutPayload, PurchaseTarget, Transaction, TransactionSummary};
use crate::domain::pricing::FeeBreakdown;
use crate::error::Result;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
struct PurchaseCourseRequest {
    course_id: i64,
    coupon_code: Option<String>,
}

#[derive(Deserialize)]
struct PurchaseBatchRequest {
    batch_id: i64,
    installment_number: u32,
}

#[derive(Deserialize)]
struct PurchaseTestSeriesRequest {
    test_series_id: i64,
}

#[derive(Deserialize)]
struct ApplyCouponRequest {
    course_id: i64,
    coupon_code: String,
}

#[derive(Deserialize)]
struct VerifyPaymentRequest {
    razorpay_order_id: String,
    razorpay_payment_id: String,
    razorpay_signature: String,
}

#[derive(Serialize)]
struct Verified {
    status: &'static str,
    transaction: Transaction,
}

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/purchase-course", post(purchase_course))
        .route("/purchase-batch", post(purchase_batch))
        .route("/purchase-test-series", post(purchase_test_series))
        .route("/verify-payment", post(verify_payment))
        .route("/apply-coupon", post(apply_coupon))
        .route("/course-pricing/:id", get(course_pricing))
        .route("/batch-pricing/:id/installment/:n", get(batch_pricing))
        .route("/test-series-pricing/:id", get(test_series_pricing))
        .route("/student-transactions", get(student_transactions))
}

async fn purchase_course(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(request): JsonBody<PurchaseCourseRequest>,
) -> Result<Json<CheckoutPayload>> {
    // a blank code means no coupon
    let coupon = request.coupon_code.as_deref().filter(|c| !c.trim().is_empty());
    let checkout = state
        .payments
        .initiate(&user, PurchaseTarget::Course(request.course_id), coupon)
        .await?;
    Ok(Json(checkout))
}

async fn purchase_batch(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(request): JsonBody<PurchaseBatchRequest>,
) -> Result<Json<CheckoutPayload>> {
    let target = PurchaseTarget::Batch {
        batch_id: request.batch_id,
        installment: request.installment_number,
    };
    Ok(Json(state.payments.initiate(&user, target, None).await?))
}

async fn purchase_test_series(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(request): JsonBody<PurchaseTestSeriesRequest>,
) -> Result<Json<CheckoutPayload>> {
    let target = PurchaseTarget::TestSeries(request.test_series_id);
    Ok(Json(state.payments.initiate(&user, target, None).await?))
}

async fn verify_payment(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    JsonBody(request): JsonBody<VerifyPaymentRequest>,
) -> Result<Json<Verified>> {
    let transaction = state
        .payments
        .verify(
            &request.razorpay_order_id,
            &request.razorpay_payment_id,
            &request.razorpay_signature,
        )
        .await?;
    Ok(Json(Verified {
        status: "Payment verified successfully.",
        transaction,
    }))
}

async fn apply_coupon(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(request): JsonBody<ApplyCouponRequest>,
) -> Result<Json<Quote>> {
    let quote = state
        .payments
        .apply_coupon(&user, request.course_id, &request.coupon_code)
        .await?;
    Ok(Json(quote))
}

/// List price before any coupon.
async fn course_pricing(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<FeeBreakdown>> {
    let quote = state.payments.quote(&user, PurchaseTarget::Course(id), None).await?;
    Ok(Json(quote.breakdown))
}

/// Installment pricing depends on what the caller has already paid.
async fn batch_pricing(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((id, n)): Path<(i64, u32)>,
) -> Result<Json<Quote>> {
    let target = PurchaseTarget::Batch {
        batch_id: id,
        installment: n,
    };
    Ok(Json(state.payments.quote(&user, target, None).await?))
}

async fn test_series_pricing(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<FeeBreakdown>> {
    let quote = state.payments.quote(&user, PurchaseTarget::TestSeries(id), None).await?;
    Ok(Json(quote.breakdown))
}

async fn student_transactions(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<TransactionSummary>>> {
    Ok(Json(state.payments.student_transactions(&user).await?))
}
