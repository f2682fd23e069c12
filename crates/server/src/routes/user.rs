use axum::{extract::State, Json};
use shared::{Profile, ProfileUpdate, SuccessResponse};

use crate::{
    error::AppError,
    routes::extract::{ApiJson, AuthUser},
    state::AppState,
};

/// GET /api/user/profile
pub async fn get_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Profile>, AppError> {
    let profile = state
        .db
        .get_user_by_id(user.id)
        .await?
        .map(Profile::from)
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(Json(profile))
}

/// PUT /api/user/profile
pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> Result<Json<SuccessResponse>, AppError> {
    // Names are stored trimmed, as at registration
    let update = ProfileUpdate {
        first_name: update.first_name.map(|n| n.trim().to_string()),
        last_name: update.last_name.map(|n| n.trim().to_string()),
        ..update
    };
    if !state.db.update_profile(user.id, &update).await? {
        return Err(AppError::NotFound("User not found".to_string()));
    }
    tracing::info!("Updated profile for user {}", user.id);
    Ok(Json(SuccessResponse::ok()))
}
