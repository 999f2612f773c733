//! Session middleware for routes that need a logged-in user

use super::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::auth::CookieCodec;

/// Username of the verified session, set by [`require_session`]
#[derive(Debug, Clone)]
pub struct CurrentUser(pub String);

/// Find the session cookie among the request's `Cookie` headers
pub fn session_cookie(headers: &HeaderMap, codec: &CookieCodec) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| codec.find_in_header(value))
        .map(str::to_string)
}

/// Authentication middleware
///
/// Verifies the session cookie and stores the username as a [`CurrentUser`]
/// extension. Requests without a valid session get `401` with the reason,
/// if any ("Session expired, please login").
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let cookie = session_cookie(request.headers(), state.sessions.codec());
    let check = state.sessions.verify(cookie.as_deref()).await;

    match check.username() {
        Some(username) => {
            request
                .extensions_mut()
                .insert(CurrentUser(username.to_string()));
            next.run(request).await
        }
        None => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": "Login required",
                "reason": check.reason(),
            })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_session_cookie_across_headers() {
        let codec = CookieCodec::new("session", b"secret");
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("theme=dark"));
        headers.append(header::COOKIE, HeaderValue::from_static("lang=en; session=abc.def"));

        assert_eq!(session_cookie(&headers, &codec).as_deref(), Some("abc.def"));
    }

    #[test]
    fn test_no_session_cookie() {
        let codec = CookieCodec::new("session", b"secret");
        let headers = HeaderMap::new();
        assert_eq!(session_cookie(&headers, &codec), None);
    }
}
