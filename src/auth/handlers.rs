use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    routing::{get, patch, post},
    Json, Router,
};
use tracing::{info, instrument};

use crate::{
    auth::{
        dto::{
            AuthResponse, CheckResponse, LoginRequest, MessageResponse, ProfileUpdateRequest,
            RegisterRequest,
        },
        extractors::{clear_cookie, cookie_headers, session_cookie, AuthUser},
        services,
    },
    error::ApiError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/check", get(check))
        .route("/auth/logout", post(logout))
        .route("/auth/profile", patch(update_profile))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, HeaderMap, Json<AuthResponse>), ApiError> {
    let Json(payload) = payload?;
    let out = services::register(&state, payload).await?;
    let headers = cookie_headers(session_cookie(&out.token, state.config.cookie_secure))?;
    Ok((
        StatusCode::CREATED,
        headers,
        Json(AuthResponse {
            message: "User registered successfully",
            user: out.user,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(HeaderMap, Json<AuthResponse>), ApiError> {
    let Json(payload) = payload?;
    let out = services::login(&state, payload).await?;
    let headers = cookie_headers(session_cookie(&out.token, state.config.cookie_secure))?;
    Ok((
        headers,
        Json(AuthResponse {
            message: "Login successful",
            user: out.user,
        }),
    ))
}

#[instrument(skip_all, fields(user_id = %claims.sub))]
pub async fn check(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<CheckResponse>, ApiError> {
    let user = services::current_user(&state, claims.sub).await?;
    Ok(Json(CheckResponse {
        is_authenticated: true,
        user,
    }))
}

/// Drops the client's cookie. The token itself stays valid until it expires.
#[instrument(skip(state))]
pub async fn logout(
    State(state): State<AppState>,
) -> Result<(HeaderMap, Json<MessageResponse>), ApiError> {
    let headers = cookie_headers(clear_cookie(state.config.cookie_secure))?;
    info!("session cookie cleared");
    Ok((
        headers,
        Json(MessageResponse {
            message: "Logged out successfully",
        }),
    ))
}

#[instrument(skip_all, fields(user_id = %claims.sub))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    payload: Result<Json<ProfileUpdateRequest>, JsonRejection>,
) -> Result<(HeaderMap, Json<AuthResponse>), ApiError> {
    let Json(payload) = payload?;
    let out = services::update_profile(&state, claims.sub, payload).await?;
    let headers = cookie_headers(session_cookie(&out.token, state.config.cookie_secure))?;
    Ok((
        headers,
        Json(AuthResponse {
            message: "Profile updated",
            user: out.user,
        }),
    ))
}
