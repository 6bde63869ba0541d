use crate::api::AppState;
use crate::domain::user::User;
use crate::error::ClassroomError;
use async_trait::async_trait;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;

/// Caller authenticated by a `Bearer` access token.
pub struct AuthUser(pub User);

/// Staff administrator.
pub struct AdminUser(pub User);

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ClassroomError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or_else(|| {
            ClassroomError::Unauthorized("Authentication credentials were not provided.".to_string())
        })?;
        let claims = state.tokens.verify(token)?;
        let user = state
            .storage
            .get_user(claims.user_id()?)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| ClassroomError::Unauthorized("User not found".to_string()))?;
        Ok(AuthUser(user))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ClassroomError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(ClassroomError::PermissionDenied(
                "You do not have permission to perform this action.".to_string(),
            ));
        }
        Ok(AdminUser(user))
    }
}

/// JSON body whose rejections use the API error shape.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ClassroomError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(ClassroomError::non_field(rejection.body_text())),
        }
    }
}
