//! HTTP route handlers for the API

use super::auth::{session_cookie, CurrentUser};
use super::AppState;
use crate::auth::NewUser;
use crate::error::CoreError;
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

fn message_response(message: impl Into<String>) -> Response {
    Json(serde_json::json!({ "message": message.into() })).into_response()
}

/// Log a storage or hashing failure and answer 500
fn internal_error(context: &str, e: CoreError) -> Response {
    tracing::error!("{}: {}", context, e);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

// ============================================================================
// Health Check
// ============================================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// ============================================================================
// Registration
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub fullname: String,
    pub question: String,
    pub answer: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Response {
    let username = req.username.clone();
    let user = NewUser {
        username: req.username,
        fullname: req.fullname,
        password: req.password,
        question: req.question,
        answer: req.answer,
    };

    match state.credentials.insert_user(user).await {
        Ok(()) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "message": "User created successfully!" })),
        )
            .into_response(),
        Err(CoreError::Conflict(..)) => error_response(
            StatusCode::CONFLICT,
            format!(
                "The username: '{}' is already registered, please try again.",
                username
            ),
        ),
        Err(CoreError::Validation(msg)) => error_response(StatusCode::BAD_REQUEST, msg),
        Err(e) => internal_error("Failed to register user", e),
    }
}

// ============================================================================
// Login / Logout / Status
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Response {
    let cookie = session_cookie(&headers, state.sessions.codec());
    let check = state.sessions.verify(cookie.as_deref()).await;
    if let Some(username) = check.username() {
        return Json(serde_json::json!({
            "message": "Already logged in",
            "username": username,
        }))
        .into_response();
    }

    match state
        .credentials
        .verify_password(&req.username, &req.password)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            return error_response(StatusCode::UNAUTHORIZED, "Incorrect credentials!");
        }
        Err(e) => return internal_error("Login check failed", e),
    }

    match state.sessions.issue(&req.username, &req.password).await {
        Ok(set_cookie) => (
            [(header::SET_COOKIE, set_cookie)],
            Json(serde_json::json!({
                "message": format!("Hello {}!", req.username),
                "username": req.username,
            })),
        )
            .into_response(),
        Err(e) => internal_error("Failed to create session", e),
    }
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let cookie = session_cookie(&headers, state.sessions.codec());
    let check = state.sessions.verify(cookie.as_deref()).await;
    if !check.is_valid() {
        return message_response("Not logged in");
    }

    match state.sessions.clear(cookie.as_deref()).await {
        Ok(_) => (
            [(header::SET_COOKIE, state.sessions.codec().removal_header())],
            Json(serde_json::json!({ "message": "Logged out successfully!" })),
        )
            .into_response(),
        Err(e) => internal_error("Failed to clear session", e),
    }
}

pub async fn session_status(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let cookie = session_cookie(&headers, state.sessions.codec());
    let check = state.sessions.verify(cookie.as_deref()).await;

    Json(serde_json::json!({
        "logged_in": check.is_valid(),
        "username": check.username(),
        "message": check.reason(),
    }))
    .into_response()
}

// ============================================================================
// Password Reset
// ============================================================================

const ALREADY_LOGGED_IN: &str = "Already logged in, please log out to reset password.";

#[derive(Debug, Deserialize)]
pub struct ResetQuestionQuery {
    pub username: String,
}

pub async fn reset_question(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ResetQuestionQuery>,
) -> Response {
    let cookie = session_cookie(&headers, state.sessions.codec());
    if state.sessions.verify(cookie.as_deref()).await.is_valid() {
        return error_response(StatusCode::CONFLICT, ALREADY_LOGGED_IN);
    }

    match state.credentials.secret_question(&query.username).await {
        Ok(Some(question)) => Json(serde_json::json!({
            "username": query.username,
            "question": question,
        }))
        .into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            format!("The username: '{}' is not registered", query.username),
        ),
        Err(e) => internal_error("Failed to look up secret question", e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub username: String,
    pub answer: String,
    pub new_password: String,
}

pub async fn reset_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ResetPasswordRequest>,
) -> Response {
    let cookie = session_cookie(&headers, state.sessions.codec());
    if state.sessions.verify(cookie.as_deref()).await.is_valid() {
        return error_response(StatusCode::CONFLICT, ALREADY_LOGGED_IN);
    }

    match state.credentials.username_exists(&req.username).await {
        Ok(true) => {}
        Ok(false) => {
            return error_response(
                StatusCode::NOT_FOUND,
                format!("The username: '{}' is not registered", req.username),
            );
        }
        Err(e) => return internal_error("Failed to look up user", e),
    }

    match state
        .credentials
        .verify_secret_answer(&req.username, &req.answer)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "The answer to the secret question is incorrect.",
            );
        }
        Err(e) => return internal_error("Secret answer check failed", e),
    }

    match state
        .credentials
        .update_password_hash(&req.username, &req.new_password)
        .await
    {
        Ok(()) => message_response("Password is reset!"),
        Err(CoreError::Validation(msg)) => error_response(StatusCode::BAD_REQUEST, msg),
        Err(e) => internal_error("Failed to reset password", e),
    }
}

// ============================================================================
// Feeling Lucky
// ============================================================================

pub async fn lucky_draw(
    State(state): State<AppState>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
) -> Response {
    let Some(selector) = &state.lucky else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Lucky draw unavailable: no cities imported",
        );
    };

    match selector.draw(&username).await {
        Ok(draw) => Json(draw).into_response(),
        Err(e @ CoreError::NotFound(..)) => {
            tracing::error!("City table is missing a tracked index: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "City lookup failed")
        }
        Err(e) if e.is_storage_fault() => {
            tracing::error!("Lucky draw failed for {}: {}", username, e);
            error_response(StatusCode::SERVICE_UNAVAILABLE, "Lucky draw unavailable")
        }
        Err(e) => internal_error("Lucky draw failed", e),
    }
}
