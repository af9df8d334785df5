use axum::{
    body::Bytes,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use super::ErrorBody;
use crate::auth::{AuthService, User};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    /// 3-32 characters of letters, digits, `_` or `-`. Matched case-insensitively.
    pub username: String,
    /// At least 8 characters.
    pub password: String,
}

#[utoipa::path(
    post,
    path = "/v1/users",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = User),
        (status = 400, description = "Invalid username or password", body = ErrorBody),
        (status = 409, description = "Username taken", body = ErrorBody),
        (status = 500, description = "Internal error", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn register(service: Extension<Arc<AuthService>>, body: Bytes) -> Response {
    match service.register(&body).await {
        Ok(user) => (StatusCode::CREATED, Json(user)).into_response(),
        Err(err) => err.into_response(),
    }
}
