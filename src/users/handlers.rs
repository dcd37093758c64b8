use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{
        ProfileRequest, RefreshRequest, RegisterRequest, TokenRequest, TokenResponse,
        UserResponse,
    },
    services,
};
use crate::{
    auth::{AuthUser, TokenPair},
    error::{AppError, AppResult},
    extract::ApiJson,
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/create", post(create_user))
        .route("/token", post(create_token))
        .route("/token/refresh", post(refresh_token))
        .route("/me", get(get_me).put(put_me).patch(patch_me))
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            token: pair.access,
            refresh_token: pair.refresh,
        }
    }
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    let user = services::register(&state, &payload.email, &payload.password, payload.name).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, payload))]
pub async fn create_token(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<TokenRequest>,
) -> AppResult<Json<TokenResponse>> {
    let pair = services::authenticate(&state, &payload.email, &payload.password).await?;
    Ok(Json(pair.into()))
}

#[instrument(skip(state, payload))]
pub async fn refresh_token(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RefreshRequest>,
) -> AppResult<Json<TokenResponse>> {
    let pair = services::refresh(&state, &payload.refresh_token).await?;
    Ok(Json(pair.into()))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<UserResponse>> {
    let user = services::get_self(&state, auth).await?;
    Ok(Json(user.into()))
}

/// Full update: email and password are required.
#[instrument(skip(state, payload))]
pub async fn put_me(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(payload): ApiJson<ProfileRequest>,
) -> AppResult<Json<UserResponse>> {
    let email = payload
        .email
        .ok_or_else(|| AppError::field("email", "this field is required"))?;
    let password = payload
        .password
        .ok_or_else(|| AppError::field("password", "this field is required"))?;
    let user =
        services::update_self(&state, auth, Some(email), Some(password), payload.name).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn patch_me(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(payload): ApiJson<ProfileRequest>,
) -> AppResult<Json<UserResponse>> {
    let user =
        services::update_self(&state, auth, payload.email, payload.password, payload.name).await?;
    Ok(Json(user.into()))
}
