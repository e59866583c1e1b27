//! Client for the remote interpretation / illustration service.
//!
//! One POST per call, `{ type, payload }` in and `{ result }` or `{ error }`
//! out. Failures are returned once; nothing is retried.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info};

use crate::{db, AppError, AppResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpretationStyle {
    #[default]
    Psychologist,
    Freud,
    Mystic,
    Bestie,
}

impl FromStr for InterpretationStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "psychologist" => Ok(Self::Psychologist),
            "freud" => Ok(Self::Freud),
            "mystic" => Ok(Self::Mystic),
            "bestie" => Ok(Self::Bestie),
            other => Err(format!("unknown interpretation style: {other}")),
        }
    }
}

impl fmt::Display for InterpretationStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Psychologist => "psychologist",
            Self::Freud => "freud",
            Self::Mystic => "mystic",
            Self::Bestie => "bestie",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum AiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("service returned {status}: {message}")]
    Service { status: u16, message: String },
    #[error("service response has no result")]
    MissingResult,
    #[error("image payload is not valid base64: {0}")]
    InvalidImage(#[from] base64::DecodeError),
    #[error("failed to store generated image: {0}")]
    Write(#[from] std::io::Error),
}

impl From<AiError> for AppError {
    fn from(error: AiError) -> Self {
        match error {
            AiError::Http(err) => AppError::from(err),
            AiError::Service { status, message } => AppError::new("AI/SERVICE", message)
                .with_context("status", status.to_string()),
            AiError::MissingResult => {
                AppError::new("AI/NO_RESULT", "The dream service returned nothing.")
            }
            AiError::InvalidImage(err) => {
                AppError::new("AI/INVALID_IMAGE", "The generated image could not be decoded.")
                    .with_context("error", err.to_string())
            }
            AiError::Write(err) => AppError::from(err).with_context("operation", "ai_image_write"),
        }
    }
}

#[derive(Serialize)]
struct AiRequest {
    #[serde(rename = "type")]
    kind: &'static str,
    payload: Value,
}

#[derive(Deserialize)]
struct AiResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AiClient {
    client: Client,
    endpoint: String,
}

impl AiClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub async fn interpret(
        &self,
        title: &str,
        content: &str,
        tags: &[String],
        style: InterpretationStyle,
    ) -> AppResult<String> {
        let payload = json!({
            "title": title,
            "content": content,
            "tags": tags,
            "style": style,
        });
        let text = self
            .call("interpretation", payload, "Interpretation failed")
            .await?;
        info!(target: "dream_journal", event = "ai_interpretation_received", chars = text.len());
        Ok(text)
    }

    /// Request an illustration and write it as `dream-<id>.png` in `images_dir`.
    pub async fn generate_image(
        &self,
        description: &str,
        dream_id: Option<i64>,
        images_dir: &Path,
    ) -> AppResult<PathBuf> {
        let encoded = self
            .call("image", json!({ "description": description }), "Image generation failed")
            .await?;
        let bytes = STANDARD.decode(encoded.trim()).map_err(AiError::from)?;

        let id_part = dream_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| format!("new-{}", Utc::now().timestamp_millis()));
        let path = images_dir.join(format!("dream-{id_part}.png"));
        db::write_atomic(&path, &bytes).map_err(AiError::from)?;

        info!(target: "dream_journal", event = "ai_image_saved", path = %path.display(), bytes = bytes.len());
        Ok(path)
    }

    async fn call(
        &self,
        kind: &'static str,
        payload: Value,
        fallback_message: &str,
    ) -> Result<String, AiError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&AiRequest { kind, payload })
            .send()
            .await
            .map_err(|err| {
                error!(target: "dream_journal", event = "ai_request_failed", kind, error = %err);
                AiError::from(err)
            })?;
        let status = response.status();
        let body = response.text().await?;
        parse_response(status.as_u16(), status.is_success(), &body, fallback_message).map_err(
            |err| {
                error!(target: "dream_journal", event = "ai_request_failed", kind, error = %err);
                err
            },
        )
    }
}

fn parse_response(
    status: u16,
    success: bool,
    body: &str,
    fallback_message: &str,
) -> Result<String, AiError> {
    let parsed: Option<AiResponse> = serde_json::from_str(body).ok();
    if !success {
        let message = parsed
            .and_then(|r| r.error)
            .unwrap_or_else(|| fallback_message.to_string());
        return Err(AiError::Service { status, message });
    }
    parsed
        .and_then(|r| r.result)
        .ok_or(AiError::MissingResult)
}
