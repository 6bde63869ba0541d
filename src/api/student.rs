use crate::api::extract::{AuthUser, JsonBody};
use crate::api::AppState;
use crate::app::catalog_use_case::{CatalogView, StudentBatch};
use crate::domain::catalog::{Course, TestSeries};
use crate::app::enrollment_use_case::FeeSchedule;
use crate::domain::enrollment::Enrollment;
use crate::domain::live_class::{Attendance, LiveClass};
use crate::domain::notification::Device;
use crate::error::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

#[derive(Deserialize)]
struct JoinRequest {
    batch: i64,
}

#[derive(Deserialize)]
struct TestSeriesFilter {
    is_digital: Option<bool>,
}

#[derive(Deserialize)]
struct DeviceRequest {
    registration_id: String,
}

/// Routes for the signed-in student.
pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/batches/available", get(available_batches))
        .route("/batches/purchased", get(purchased_batches))
        .route("/batches/join", post(join_batch))
        .route("/batches/:id", get(get_batch))
        .route("/batches/:id/live-classes", get(live_classes))
        .route("/batches/:id/attendance", get(attendance))
        .route("/student/available-courses", get(available_courses))
        .route("/student/purchased-courses", get(purchased_courses))
        .route("/student/available-test-series", get(available_test_series))
        .route("/student/purchased-test-series", get(purchased_test_series))
        .route("/fees", get(fee_schedule))
        .route("/devices", post(register_device))
}

async fn available_batches(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<StudentBatch>>> {
    Ok(Json(state.catalog.student_batches(&user, CatalogView::Available).await?))
}

async fn purchased_batches(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<StudentBatch>>> {
    Ok(Json(state.catalog.student_batches(&user, CatalogView::Purchased).await?))
}

async fn available_courses(State(state): State<AppState>, AuthUser(user): AuthUser) -> Result<Json<Vec<Course>>> {
    Ok(Json(state.catalog.student_courses(&user, CatalogView::Available).await?))
}

async fn purchased_courses(State(state): State<AppState>, AuthUser(user): AuthUser) -> Result<Json<Vec<Course>>> {
    Ok(Json(state.catalog.student_courses(&user, CatalogView::Purchased).await?))
}

async fn available_test_series(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(filter): Query<TestSeriesFilter>,
) -> Result<Json<Vec<TestSeries>>> {
    let series = state
        .catalog
        .student_test_series(&user, CatalogView::Available, filter.is_digital)
        .await?;
    Ok(Json(series))
}

async fn purchased_test_series(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(filter): Query<TestSeriesFilter>,
) -> Result<Json<Vec<TestSeries>>> {
    let series = state
        .catalog
        .student_test_series(&user, CatalogView::Purchased, filter.is_digital)
        .await?;
    Ok(Json(series))
}

async fn get_batch(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<StudentBatch>> {
    Ok(Json(state.catalog.student_batch(&user, id).await?))
}

async fn join_batch(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(request): JsonBody<JoinRequest>,
) -> Result<(StatusCode, Json<Enrollment>)> {
    let enrollment = state.enrollments.join_request(&user, request.batch).await?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}

async fn live_classes(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<LiveClass>>> {
    Ok(Json(state.live_classes.student_classes(&user, id).await?))
}

async fn attendance(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Attendance>>> {
    Ok(Json(state.live_classes.student_attendance(&user, id).await?))
}

async fn fee_schedule(State(state): State<AppState>, AuthUser(user): AuthUser) -> Result<Json<FeeSchedule>> {
    Ok(Json(state.enrollments.fee_schedule(&user).await?))
}

async fn register_device(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(request): JsonBody<DeviceRequest>,
) -> Result<(StatusCode, Json<Device>)> {
    let device = state.notifications.register_device(&user, &request.registration_id).await?;
    Ok((StatusCode::CREATED, Json(device)))
}
