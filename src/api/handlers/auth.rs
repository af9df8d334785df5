//! Login, logout and session endpoints.

use axum::{
    body::Bytes,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use super::{cookie_headers, session_key, ClientAddr, ErrorBody};
use crate::auth::{AuthService, User};

/// Documented shape of the login body; parsing happens in the service.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    /// Keep the session for 30 days instead of 2 hours.
    #[serde(default)]
    pub remember: bool,
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in, session cookie set", body = User),
        (status = 400, description = "Malformed request", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 429, description = "Too many failed attempts", body = ErrorBody),
        (status = 500, description = "Internal error", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login(
    client: ClientAddr,
    service: Extension<Arc<AuthService>>,
    body: Bytes,
) -> Response {
    let login = match service.login(&body, &client.0).await {
        Ok(login) => login,
        Err(err) => return err.into_response(),
    };

    match cookie_headers(&login.cookie) {
        Ok(headers) => (StatusCode::OK, headers, Json(login.user)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session ended and cookie cleared"),
        (status = 500, description = "Internal error", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn logout(headers: HeaderMap, service: Extension<Arc<AuthService>>) -> Response {
    let key = session_key(&headers);
    let cleared = match service.log_out(key.as_deref()).await {
        Ok(cookie) => cookie,
        Err(err) => return err.into_response(),
    };

    match cookie_headers(&cleared) {
        Ok(headers) => (StatusCode::NO_CONTENT, headers).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = User),
        (status = 401, description = "No valid session", body = ErrorBody),
        (status = 500, description = "Internal error", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn session(
    client: ClientAddr,
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
) -> Response {
    let key = session_key(&headers);
    match service.check_request_auth(key.as_deref(), &client.0).await {
        Ok(user) => (StatusCode::OK, Json(user)).into_response(),
        Err(err) => err.into_response(),
    }
}
