//! Staff-only management routes. Every handler takes an [`AdminUser`].

use crate::api::extract::{AdminUser, JsonBody};
use crate::api::AppState;
use crate::app::enrollment_use_case::{AddStudentRequest, BulkEnrollRequest, OfflineFeeRequest};
use crate::domain::catalog::{Batch, BatchInput, Course, CourseInput, TestSeries, TestSeriesInput};
use crate::domain::coupon::{Coupon, CouponInput};
use crate::domain::enrollment::{BatchPurchaseOrder, Enrollment};
use crate::domain::live_class::LiveClass;
use crate::domain::notification::{NotificationRequest, NotificationView, PushNotification};
use crate::domain::payment::{DeliveryStatus, ProductOrderSummary, Transaction, TransactionSummary};
use crate::error::{ClassroomError, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
struct BatchFilter {
    batch: Option<i64>,
}

#[derive(Deserialize)]
struct DeliveryFilter {
    delivery_status: Option<String>,
}

#[derive(Deserialize)]
struct DeliveryUpdate {
    #[serde(default)]
    delivery_status: String,
}

#[derive(Deserialize)]
struct ScheduleRequest {
    batch_id: i64,
    title: String,
}

#[derive(Deserialize)]
struct RemoveStudentsRequest {
    #[serde(default)]
    student_ids: Vec<i64>,
}

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/courses", get(list_courses).post(create_course))
        .route("/courses/:id", get(get_course).put(update_course).delete(delete_course))
        .route("/courses/:id/toggle-publish", patch(toggle_course))
        .route("/batches", get(list_batches).post(create_batch))
        .route("/batches/:id", get(get_batch).put(update_batch).delete(delete_batch))
        .route("/batches/:id/toggle-publish", patch(toggle_batch))
        .route("/test-series", get(list_test_series).post(create_test_series))
        .route(
            "/test-series/:id",
            get(get_test_series).put(update_test_series).delete(delete_test_series),
        )
        .route("/test-series/:id/toggle-publish", patch(toggle_test_series))
        .route("/product-orders", get(list_product_orders))
        .route("/product-orders/:id", get(get_product_order))
        .route("/product-orders/:id/update-status", patch(update_delivery_status))
        .route("/coupons", get(list_coupons).post(create_coupon))
        .route("/coupons/:id", get(get_coupon).put(update_coupon).delete(delete_coupon))
        .route("/enrollments", get(list_enrollments).post(bulk_enroll))
        .route("/enrollments/add-student", post(add_student))
        .route("/enrollments/:id", get(get_enrollment).delete(delete_enrollment))
        .route("/enrollments/:id/approve", post(approve_enrollment))
        .route("/enrollments/:id/reject", post(reject_enrollment))
        .route("/fees", post(record_offline_fee))
        .route("/transactions", get(list_transactions))
        .route("/transactions/:id", get(get_transaction))
        .route("/live-classes", get(list_live_classes).post(schedule_live_class))
        .route("/live-classes/:class_id", delete(cancel_live_class))
        .route("/live-classes/:class_id/remove-students", post(remove_students))
        .route("/notifications", get(list_notifications).post(send_notification))
}

fn message(text: impl Into<String>) -> Json<Value> {
    Json(json!({ "message": text.into() }))
}

// Courses

async fn list_courses(State(state): State<AppState>, _admin: AdminUser) -> Result<Json<Vec<Course>>> {
    Ok(Json(state.catalog.list_courses(false).await?))
}

async fn create_course(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    JsonBody(input): JsonBody<CourseInput>,
) -> Result<(StatusCode, Json<Course>)> {
    Ok((StatusCode::CREATED, Json(state.catalog.create_course(&admin, input).await?)))
}

async fn get_course(State(state): State<AppState>, _admin: AdminUser, Path(id): Path<i64>) -> Result<Json<Course>> {
    Ok(Json(state.catalog.get_course(id).await?))
}

async fn update_course(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
    JsonBody(input): JsonBody<CourseInput>,
) -> Result<Json<Course>> {
    Ok(Json(state.catalog.update_course(id, input).await?))
}

async fn delete_course(State(state): State<AppState>, _admin: AdminUser, Path(id): Path<i64>) -> Result<StatusCode> {
    state.catalog.delete_course(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_course(State(state): State<AppState>, _admin: AdminUser, Path(id): Path<i64>) -> Result<Json<Value>> {
    Ok(message(state.catalog.toggle_course_publish(id).await?))
}

// Batches

async fn list_batches(State(state): State<AppState>, _admin: AdminUser) -> Result<Json<Vec<Batch>>> {
    Ok(Json(state.catalog.list_batches(false).await?))
}

async fn create_batch(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    JsonBody(input): JsonBody<BatchInput>,
) -> Result<(StatusCode, Json<Batch>)> {
    Ok((StatusCode::CREATED, Json(state.catalog.create_batch(&admin, input).await?)))
}

async fn get_batch(State(state): State<AppState>, _admin: AdminUser, Path(id): Path<i64>) -> Result<Json<Batch>> {
    Ok(Json(state.catalog.get_batch(id).await?))
}

async fn update_batch(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
    JsonBody(input): JsonBody<BatchInput>,
) -> Result<Json<Batch>> {
    Ok(Json(state.catalog.update_batch(id, input).await?))
}

async fn delete_batch(State(state): State<AppState>, _admin: AdminUser, Path(id): Path<i64>) -> Result<StatusCode> {
    state.catalog.delete_batch(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_batch(State(state): State<AppState>, _admin: AdminUser, Path(id): Path<i64>) -> Result<Json<Value>> {
    Ok(message(state.catalog.toggle_batch_publish(id).await?))
}

// Test series

async fn list_test_series(State(state): State<AppState>, _admin: AdminUser) -> Result<Json<Vec<TestSeries>>> {
    Ok(Json(state.catalog.list_test_series(false).await?))
}

async fn create_test_series(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    JsonBody(input): JsonBody<TestSeriesInput>,
) -> Result<(StatusCode, Json<TestSeries>)> {
    let series = state.catalog.create_test_series(&admin, input).await?;
    Ok((StatusCode::CREATED, Json(series)))
}

async fn get_test_series(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<TestSeries>> {
    Ok(Json(state.catalog.get_test_series(id).await?))
}

async fn update_test_series(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
    JsonBody(input): JsonBody<TestSeriesInput>,
) -> Result<Json<TestSeries>> {
    Ok(Json(state.catalog.update_test_series(id, input).await?))
}

async fn delete_test_series(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    state.catalog.delete_test_series(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_test_series(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    Ok(message(state.catalog.toggle_test_series_publish(id).await?))
}

// Printed test series deliveries

async fn list_product_orders(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(filter): Query<DeliveryFilter>,
) -> Result<Json<Vec<ProductOrderSummary>>> {
    let status = filter
        .delivery_status
        .as_deref()
        .map(str::parse::<DeliveryStatus>)
        .transpose()?;
    Ok(Json(state.catalog.list_product_orders(status).await?))
}

async fn get_product_order(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<ProductOrderSummary>> {
    Ok(Json(state.catalog.get_product_order(id).await?))
}

async fn update_delivery_status(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
    JsonBody(update): JsonBody<DeliveryUpdate>,
) -> Result<Json<Value>> {
    let order = state.catalog.update_delivery_status(id, &update.delivery_status).await?;
    Ok(Json(json!({
        "message": "Delivery status updated successfully.",
        "delivery_status": order.order.delivery_status,
    })))
}

// Coupons

async fn list_coupons(State(state): State<AppState>, _admin: AdminUser) -> Result<Json<Vec<Coupon>>> {
    Ok(Json(state.coupons.list().await?))
}

async fn create_coupon(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    JsonBody(input): JsonBody<CouponInput>,
) -> Result<(StatusCode, Json<Coupon>)> {
    Ok((StatusCode::CREATED, Json(state.coupons.create(&admin, input).await?)))
}

async fn get_coupon(State(state): State<AppState>, _admin: AdminUser, Path(id): Path<i64>) -> Result<Json<Coupon>> {
    Ok(Json(state.coupons.get(id).await?))
}

async fn update_coupon(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
    JsonBody(input): JsonBody<CouponInput>,
) -> Result<Json<Coupon>> {
    Ok(Json(state.coupons.update(id, input).await?))
}

async fn delete_coupon(State(state): State<AppState>, _admin: AdminUser, Path(id): Path<i64>) -> Result<StatusCode> {
    state.coupons.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Enrollments

async fn list_enrollments(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(filter): Query<BatchFilter>,
) -> Result<Json<Vec<Enrollment>>> {
    Ok(Json(state.enrollments.list(filter.batch).await?))
}

async fn bulk_enroll(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    JsonBody(request): JsonBody<BulkEnrollRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let ids = state.enrollments.bulk_enroll(&admin, request).await?;
    Ok((StatusCode::CREATED, Json(json!({ "enrollments": ids }))))
}

async fn add_student(
    State(state): State<AppState>,
    _admin: AdminUser,
    JsonBody(request): JsonBody<AddStudentRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let (user, enrollment) = state.enrollments.add_student(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "user_id": user.id,
            "enrollment_id": enrollment.id,
            "message": "Student created and enrolled."
        })),
    ))
}

async fn get_enrollment(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<Enrollment>> {
    Ok(Json(state.enrollments.get(id).await?))
}

async fn delete_enrollment(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    state.enrollments.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn approve_enrollment(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let enrollment = state.enrollments.approve(&admin, id).await?;
    Ok(Json(json!({ "message": "Enrollment approved.", "enrollment": enrollment })))
}

async fn reject_enrollment(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    state.enrollments.reject(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn record_offline_fee(
    State(state): State<AppState>,
    _admin: AdminUser,
    JsonBody(request): JsonBody<OfflineFeeRequest>,
) -> Result<(StatusCode, Json<BatchPurchaseOrder>)> {
    let order = state.enrollments.record_offline_fee(request).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

// Transactions

async fn list_transactions(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<TransactionSummary>>> {
    Ok(Json(state.payments.list_transactions().await?))
}

async fn get_transaction(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<Transaction>> {
    Ok(Json(state.payments.get_transaction(id).await?))
}

// Live classes

async fn list_live_classes(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(filter): Query<BatchFilter>,
) -> Result<Json<Vec<LiveClass>>> {
    let batch = filter
        .batch
        .ok_or_else(|| ClassroomError::invalid("batch", "This field is required."))?;
    Ok(Json(state.live_classes.list(batch).await?))
}

async fn schedule_live_class(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    JsonBody(request): JsonBody<ScheduleRequest>,
) -> Result<(StatusCode, Json<LiveClass>)> {
    let class = state
        .live_classes
        .schedule(&admin, request.batch_id, &request.title)
        .await?;
    Ok((StatusCode::CREATED, Json(class)))
}

async fn cancel_live_class(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(class_id): Path<String>,
) -> Result<StatusCode> {
    state.live_classes.cancel(&class_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_students(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(class_id): Path<String>,
    JsonBody(request): JsonBody<RemoveStudentsRequest>,
) -> Result<Json<Value>> {
    state
        .live_classes
        .remove_students(&class_id, &request.student_ids)
        .await?;
    Ok(message("Students removed from the class."))
}

// Notifications

async fn list_notifications(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<NotificationView>>> {
    Ok(Json(state.notifications.list().await?))
}

async fn send_notification(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    JsonBody(request): JsonBody<NotificationRequest>,
) -> Result<(StatusCode, Json<PushNotification>)> {
    let notification = state.notifications.send(&admin, request).await?;
    Ok((StatusCode::CREATED, Json(notification)))
}
