use crate::error::{ClassroomError, NON_FIELD_ERRORS};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

impl ClassroomError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ClassroomError::Validation { .. } | ClassroomError::Signature(_) => StatusCode::BAD_REQUEST,
            ClassroomError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ClassroomError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ClassroomError::NotFound(_) => StatusCode::NOT_FOUND,
            ClassroomError::Conflict(_) => StatusCode::CONFLICT,
            ClassroomError::Gateway { .. } | ClassroomError::Http(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// `(field, message)` pair shown to the client.
    fn client_detail(&self) -> (String, String) {
        match self {
            ClassroomError::Validation { field, message } => (field.clone(), message.clone()),
            ClassroomError::NotFound(m)
            | ClassroomError::PermissionDenied(m)
            | ClassroomError::Unauthorized(m)
            | ClassroomError::Conflict(m)
            | ClassroomError::Signature(m) => {
                let message = if m.is_empty() { default_message(self) } else { m.clone() };
                (NON_FIELD_ERRORS.to_string(), message)
            }
            ClassroomError::Gateway { service, .. } => (
                NON_FIELD_ERRORS.to_string(),
                format!("Upstream service {service} is unavailable. Please try again."),
            ),
            _ => (NON_FIELD_ERRORS.to_string(), default_message(self)),
        }
    }
}

fn default_message(err: &ClassroomError) -> String {
    match err {
        ClassroomError::NotFound(_) => "Not found.",
        ClassroomError::PermissionDenied(_) => "You do not have permission to perform this action.",
        ClassroomError::Unauthorized(_) => "Authentication credentials were not provided.",
        ClassroomError::Http(_) => "Upstream service is unavailable. Please try again.",
        _ => "A server error occurred.",
    }
    .to_string()
}

impl IntoResponse for ClassroomError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        let (field, message) = self.client_detail();
        (status, Json(json!({ "error": { field: message }, "status": false }))).into_response()
    }
}
