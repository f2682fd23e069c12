//! Typed client for the medchat REST API.

use async_trait::async_trait;
use reqwest::{multipart, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    AppendHistoryRequest, ChatSession, CreateSessionRequest, CreatedResponse, ErrorResponse,
    HistoryEntry, LoginRequest, LoginResponse, MedicalReport, Profile, ProfileUpdate,
    RegisterRequest, RegisterResponse, SuccessResponse, REPORT_ANALYSIS_FIELD, REPORT_FILE_FIELD,
};

use crate::controller::ChatBackend;
use crate::outbox::HistorySink;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not logged in; run 'medchat login'")]
    NotLoggedIn,
    #[error("authentication required: {0}")]
    Unauthenticated(String),
    #[error("session token rejected: {0}")]
    Forbidden(String),
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ApiError {
    /// Transport failures and server-side errors may succeed on a later try;
    /// auth and validation failures will not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transport(_) => true,
            ApiError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, builder: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        let token = self.token.as_deref().ok_or(ApiError::NotLoggedIn)?;
        Ok(builder.bearer_auth(token))
    }

    async fn check(resp: Response) -> Result<Response, ApiError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let text = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&text)
            .map(|e| e.error)
            .unwrap_or(text);

        Err(match status {
            StatusCode::UNAUTHORIZED => ApiError::Unauthenticated(message),
            StatusCode::FORBIDDEN => ApiError::Forbidden(message),
            other => ApiError::Status {
                status: other.as_u16(),
                message,
            },
        })
    }

    async fn json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, ApiError> {
        let resp = Self::check(builder.send().await?).await?;
        Ok(resp.json().await?)
    }

    pub async fn register(&self, req: &RegisterRequest) -> Result<RegisterResponse, ApiError> {
        Self::json(self.http.post(self.url("/api/auth/register")).json(req)).await
    }

    pub async fn login(&self, req: &LoginRequest) -> Result<LoginResponse, ApiError> {
        Self::json(self.http.post(self.url("/api/auth/login")).json(req)).await
    }

    pub async fn profile(&self) -> Result<Profile, ApiError> {
        Self::json(self.authed(self.http.get(self.url("/api/user/profile")))?).await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<(), ApiError> {
        let builder = self.authed(self.http.put(self.url("/api/user/profile")))?;
        let _: SuccessResponse = Self::json(builder.json(update)).await?;
        Ok(())
    }

    pub async fn list_sessions(&self) -> Result<Vec<ChatSession>, ApiError> {
        Self::json(self.authed(self.http.get(self.url("/api/chat/sessions")))?).await
    }

    pub async fn create_session(&self, title: &str) -> Result<i64, ApiError> {
        let req = CreateSessionRequest {
            title: Some(title.to_string()),
        };
        let builder = self.authed(self.http.post(self.url("/api/chat/sessions")))?;
        let created: CreatedResponse = Self::json(builder.json(&req)).await?;
        Ok(created.id)
    }

    pub async fn history(&self, session_id: Option<i64>) -> Result<Vec<HistoryEntry>, ApiError> {
        let mut builder = self.authed(self.http.get(self.url("/api/chat/history")))?;
        if let Some(id) = session_id {
            builder = builder.query(&[("sessionId", id)]);
        }
        Self::json(builder).await
    }

    pub async fn append_history(&self, req: &AppendHistoryRequest) -> Result<(), ApiError> {
        let builder = self.authed(self.http.post(self.url("/api/chat/history")))?;
        let _: SuccessResponse = Self::json(builder.json(req)).await?;
        Ok(())
    }

    pub async fn upload_report(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        mime_type: &str,
        analysis: &str,
    ) -> Result<(), ApiError> {
        let part = multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime_type)?;
        let form = multipart::Form::new()
            .part(REPORT_FILE_FIELD, part)
            .text(REPORT_ANALYSIS_FIELD, analysis.to_string());

        let builder = self.authed(self.http.post(self.url("/api/reports/upload")))?;
        let _: SuccessResponse = Self::json(builder.multipart(form)).await?;
        Ok(())
    }

    pub async fn list_reports(&self) -> Result<Vec<MedicalReport>, ApiError> {
        Self::json(self.authed(self.http.get(self.url("/api/reports")))?).await
    }
}

#[async_trait]
impl HistorySink for ApiClient {
    async fn append(&self, req: &AppendHistoryRequest) -> Result<(), ApiError> {
        self.append_history(req).await
    }
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn create_session(&self, title: &str) -> Result<i64, ApiError> {
        ApiClient::create_session(self, title).await
    }

    async fn history(&self, session_id: Option<i64>) -> Result<Vec<HistoryEntry>, ApiError> {
        ApiClient::history(self, session_id).await
    }

    async fn list_sessions(&self) -> Result<Vec<ChatSession>, ApiError> {
        ApiClient::list_sessions(self).await
    }
}
