use axum::{extract::State, http::StatusCode, Json};
use shared::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::{credentials, error::AppError, routes::extract::ApiJson, state::AppState};

/// Create an account
/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let id = credentials::register(&state.db, &req).await?;
    tracing::info!("Registered user {}", id);
    Ok((StatusCode::CREATED, Json(RegisterResponse { id })))
}

/// Exchange email and password for a bearer token
/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let user = credentials::verify(&state.db, &req.email, &req.password)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    let token = state.tokens.issue(user.id, &user.email)?;
    tracing::info!("User {} logged in", user.id);

    Ok(Json(LoginResponse {
        token,
        user: user.summary(),
    }))
}
