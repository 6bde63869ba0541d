use crate::api::AppState;
use crate::domain::catalog::{Course, TestSeries};
use crate::error::Result;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

/// Published catalog, readable without signing in.
pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/courses", get(list_courses))
        .route("/courses/:id", get(get_course))
        .route("/test-series", get(list_test_series))
        .route("/test-series/:id", get(get_test_series))
}

async fn list_courses(State(state): State<AppState>) -> Result<Json<Vec<Course>>> {
    Ok(Json(state.catalog.list_courses(true).await?))
}

async fn get_course(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Course>> {
    Ok(Json(state.catalog.published_course(id).await?))
}

async fn list_test_series(State(state): State<AppState>) -> Result<Json<Vec<TestSeries>>> {
    Ok(Json(state.catalog.list_test_series(true).await?))
}

async fn get_test_series(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<TestSeries>> {
    Ok(Json(state.catalog.published_test_series(id).await?))
}
