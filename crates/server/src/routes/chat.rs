use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use shared::{
    validate::MAX_TITLE_LEN, AppendHistoryRequest, ChatSession, CreateSessionRequest,
    CreatedResponse, HistoryEntry, SuccessResponse,
};

use crate::{
    error::AppError,
    routes::extract::{ApiJson, AuthUser},
    state::AppState,
};

pub const DEFAULT_SESSION_TITLE: &str = "New Chat";

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

impl HistoryQuery {
    /// `?sessionId=` with no value is treated the same as omitting it.
    fn session_id(&self) -> Result<Option<i64>, AppError> {
        match self.session_id.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| AppError::BadRequest(format!("Invalid sessionId '{}'", raw))),
        }
    }
}

/// Trimmed title capped at `MAX_TITLE_LEN` characters, or the default when blank.
fn session_title(raw: Option<&str>) -> String {
    match raw.map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => title.chars().take(MAX_TITLE_LEN).collect(),
        None => DEFAULT_SESSION_TITLE.to_string(),
    }
}

/// GET /api/chat/sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<ChatSession>>, AppError> {
    let sessions = state.db.get_chat_sessions_for_user(user.id).await?;
    Ok(Json(sessions))
}

/// POST /api/chat/sessions
pub async fn create_session(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateSessionRequest>,
) -> Result<Json<CreatedResponse>, AppError> {
    let title = session_title(req.title.as_deref());
    let id = state.db.create_chat_session(user.id, &title).await?;
    tracing::info!("User {} created chat session {}", user.id, id);
    Ok(Json(CreatedResponse { id }))
}

/// GET /api/chat/history?sessionId=
///
/// Without a session id every entry the user owns comes back as one timeline,
/// sessions interleaved by creation time.
pub async fn get_history(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryEntry>>, AppError> {
    let session_id = query.session_id()?;
    let entries = state.db.get_history_for_user(user.id, session_id).await?;
    Ok(Json(entries))
}

/// POST /api/chat/history
pub async fn append_history(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<AppendHistoryRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    if let Some(session_id) = req.session_id {
        let owner = state.db.get_chat_session_owner(session_id).await?;
        if owner != Some(user.id) {
            return Err(AppError::NotFound("Chat session not found".to_string()));
        }
    }

    state
        .db
        .append_history(user.id, req.session_id, req.role, &req.content)
        .await?;
    Ok(Json(SuccessResponse::ok()))
}
