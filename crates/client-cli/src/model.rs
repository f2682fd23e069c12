//! Language-model collaborator. The controller only sees `ModelClient`;
//! `GeminiClient` talks to the Generative Language REST API.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use shared::Role;
use std::path::Path;
use std::time::Duration;

use crate::config::ModelConfig;

pub const MEDICAL_SYSTEM_PROMPT: &str = "You are a careful medical information assistant. \
Explain symptoms, conditions, medications and test results in plain language. \
You do not diagnose or prescribe. Encourage the user to consult a qualified clinician, \
and tell them to contact emergency services immediately for urgent symptoms such as \
chest pain, difficulty breathing or signs of stroke.";

pub const REPORT_ANALYSIS_PROMPT: &str = "Analyze this medical report. Summarize the key \
findings, list any values outside their reference ranges, explain what they may indicate \
in plain language, and suggest questions the patient could ask their doctor. \
Do not give a diagnosis.";

/// One turn of the conversation sent to the model
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model API key is not configured; run 'medchat config set api_key <KEY>'")]
    MissingApiKey,
    #[error("model request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("model API returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("model returned no text")]
    EmptyResponse,
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, turns: &[Turn], system: &str) -> Result<String, ModelError>;

    async fn analyze(
        &self,
        bytes: &[u8],
        mime_type: &str,
        instructions: &str,
    ) -> Result<String, ModelError>;
}

// ============================================================================
// Gemini wire format
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            inline_data: None,
        }
    }
}

fn chat_request(turns: &[Turn], system: &str) -> GenerateRequest {
    let contents = turns
        .iter()
        .map(|turn| Content {
            role: Some(
                match turn.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                }
                .to_string(),
            ),
            parts: vec![Part::text(&turn.content)],
        })
        .collect();

    GenerateRequest {
        system_instruction: (!system.is_empty()).then(|| Content {
            role: None,
            parts: vec![Part::text(system)],
        }),
        contents,
    }
}

fn file_request(bytes: &[u8], mime_type: &str, instructions: &str) -> GenerateRequest {
    GenerateRequest {
        system_instruction: None,
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![
                Part {
                    text: None,
                    inline_data: Some(InlineData {
                        mime_type: mime_type.to_string(),
                        data: STANDARD.encode(bytes),
                    }),
                },
                Part::text(instructions),
            ],
        }],
    }
}

fn response_text(resp: GenerateResponse) -> Result<String, ModelError> {
    let text: String = resp
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ModelError::EmptyResponse);
    }
    Ok(text)
}

/// MIME type for a report file, judged by extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn from_config(config: &ModelConfig) -> Result<Self, ModelError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or(ModelError::MissingApiKey)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    async fn call(&self, body: &GenerateRequest) -> Result<String, ModelError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let resp = self
            .http
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response_text(resp.json().await?)
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate(&self, turns: &[Turn], system: &str) -> Result<String, ModelError> {
        self.call(&chat_request(turns, system)).await
    }

    async fn analyze(
        &self,
        bytes: &[u8],
        mime_type: &str,
        instructions: &str,
    ) -> Result<String, ModelError> {
        self.call(&file_request(bytes, mime_type, instructions)).await
    }
}
