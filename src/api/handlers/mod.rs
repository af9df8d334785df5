//! Request handlers and the glue between HTTP and [`AuthService`].

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{
        header::{COOKIE, SET_COOKIE},
        request::Parts,
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, net::SocketAddr, sync::Arc};
use tracing::{debug, error};
use utoipa::ToSchema;

use crate::auth::{session::session_key_from_cookie_header, AuthError, AuthService, SessionCookie};

pub mod auth;
pub mod health;
pub mod users;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Conflict => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Internal details stay in the logs.
        let message = if let Self::Internal(err) = &self {
            error!("Request failed: {err:#}");
            "internal error".to_string()
        } else {
            debug!("Request rejected: {self}");
            self.to_string()
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

/// Address used to key login throttling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

impl<S: Send + Sync> FromRequestParts<S> for ClientAddr {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        let trust_proxy_headers = parts
            .extensions
            .get::<Arc<AuthService>>()
            .is_some_and(|service| service.config().trust_proxy_headers());

        Ok(Self(client_addr(
            &parts.headers,
            peer,
            trust_proxy_headers,
        )))
    }
}

/// Resolve the client address from the peer, or from proxy headers when trusted.
pub(crate) fn client_addr(
    headers: &HeaderMap,
    peer: Option<String>,
    trust_proxy_headers: bool,
) -> String {
    if trust_proxy_headers {
        if let Some(forwarded) = forwarded_client_ip(headers) {
            return forwarded;
        }
    }
    peer.unwrap_or_else(|| "unknown".to_string())
}

/// `X-Real-IP` as set by the proxy, else the last `X-Forwarded-For` hop.
///
/// Earlier `X-Forwarded-For` entries come from the client and are ignored.
fn forwarded_client_ip(headers: &HeaderMap) -> Option<String> {
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if real_ip.is_some() {
        return real_ip.map(str::to_string);
    }
    headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .last()
        .map(str::to_string)
}

/// Session key from the request cookies, if any.
pub(crate) fn session_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(session_key_from_cookie_header)
        .map(str::to_string)
}

/// Headers carrying a `Set-Cookie` directive.
pub(crate) fn cookie_headers(cookie: &SessionCookie) -> Result<HeaderMap, AuthError> {
    let value = HeaderValue::from_str(&cookie.header_value())
        .map_err(|err| anyhow::anyhow!("invalid session cookie header: {err}"))?;
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, value);
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn error_kinds_map_to_status_codes() {
        let cases = [
            (AuthError::BadRequest("x".to_string()), StatusCode::BAD_REQUEST),
            (AuthError::Unauthorized, StatusCode::UNAUTHORIZED),
            (AuthError::Conflict, StatusCode::CONFLICT),
            (AuthError::RateLimited, StatusCode::TOO_MANY_REQUESTS),
            (
                AuthError::Internal(anyhow!("db down")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn proxy_headers_ignored_unless_trusted() {
        let map = headers(&[("x-forwarded-for", "198.51.100.1")]);
        assert_eq!(
            client_addr(&map, Some("10.0.0.1".to_string()), false),
            "10.0.0.1"
        );
        assert_eq!(
            client_addr(&map, Some("10.0.0.1".to_string()), true),
            "198.51.100.1"
        );
    }

    #[test]
    fn forwarded_for_takes_hop_added_by_proxy() {
        let map = headers(&[("x-forwarded-for", "10.9.3.1, 198.51.100.7")]);
        assert_eq!(forwarded_client_ip(&map).as_deref(), Some("198.51.100.7"));

        let map = headers(&[
            ("x-forwarded-for", "10.9.3.1"),
            ("x-forwarded-for", "198.51.100.7, "),
        ]);
        assert_eq!(forwarded_client_ip(&map).as_deref(), Some("198.51.100.7"));
    }

    #[test]
    fn real_ip_wins_over_forwarded_for() {
        let map = headers(&[
            ("x-forwarded-for", "10.9.3.1, 198.51.100.7"),
            ("x-real-ip", "198.51.100.9"),
        ]);
        assert_eq!(forwarded_client_ip(&map).as_deref(), Some("198.51.100.9"));
        assert_eq!(forwarded_client_ip(&HeaderMap::new()), None);
    }

    #[test]
    fn missing_peer_is_unknown() {
        assert_eq!(client_addr(&HeaderMap::new(), None, true), "unknown");
    }

    #[test]
    fn session_key_from_any_cookie_header() {
        let map = headers(&[("cookie", "theme=dark"), ("cookie", "__session=abc")]);
        assert_eq!(session_key(&map).as_deref(), Some("abc"));
        assert_eq!(session_key(&HeaderMap::new()), None);
    }

    #[test]
    fn cookie_headers_set_cookie() -> anyhow::Result<()> {
        let map = cookie_headers(&SessionCookie::clear(false))?;
        let value = map.get(SET_COOKIE).map(HeaderValue::to_str).transpose()?;
        assert_eq!(
            value,
            Some("__session=; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Path=/; HttpOnly; SameSite=Lax")
        );
        Ok(())
    }
}
