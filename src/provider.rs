use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::RuntimeConfig;
use crate::retry::{FailureKind, WorkError, classify_api_failure};

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// One generation call. Never retries; the controller owns retry policy.
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, WorkError>;
}

pub fn validate_model_name(model_name: &str) -> Result<()> {
    let trimmed = model_name.trim();
    if trimmed.starts_with("gemini") && !trimmed.contains(char::is_whitespace) {
        return Ok(());
    }
    Err(anyhow::anyhow!(
        "model '{}' is not a Gemini model id (expected e.g. '{}')",
        model_name,
        DEFAULT_GEMINI_MODEL
    ))
}

pub fn env_present(key: &str) -> bool {
    std::env::var(key)
        .map(|v| !v.trim().is_empty())
        .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
}

impl GeminiClient {
    pub fn new(
        api_key: String,
        model: String,
        base_url: String,
        temperature: f32,
        request_timeout: Duration,
    ) -> Result<Self> {
        validate_model_name(&model)?;
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed to build HTTP client for Gemini provider")?;
        Ok(Self {
            http,
            api_key,
            model,
            base_url,
            temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

pub fn resolve_model(cfg: &RuntimeConfig, api_key: &str) -> Result<Arc<dyn LanguageModel>> {
    let client = GeminiClient::new(
        api_key.to_string(),
        cfg.model.clone(),
        cfg.gemini_base_url.clone(),
        cfg.temperature,
        cfg.request_timeout,
    )?;
    Ok(Arc::new(client))
}

#[async_trait]
impl LanguageModel for GeminiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, system: &str, prompt: &str) -> Result<String, WorkError> {
        let request = build_generate_request(system, prompt, self.temperature);
        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "calling Gemini");

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| WorkError::from_transport("Gemini", &err))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| WorkError::from_transport("Gemini", &err))?;

        if !status.is_success() {
            return Err(gemini_api_error(status.as_u16(), &body));
        }
        extract_text(&body)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<RequestContent>,
    pub contents: Vec<RequestContent>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
pub struct RequestContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
    pub parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
pub struct RequestPart {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct GenerationConfig {
    pub temperature: f32,
}

pub fn build_generate_request(system: &str, prompt: &str, temperature: f32) -> GenerateContentRequest {
    let system_instruction = (!system.trim().is_empty()).then(|| RequestContent {
        role: None,
        parts: vec![RequestPart {
            text: system.to_string(),
        }],
    });
    GenerateContentRequest {
        system_instruction,
        contents: vec![RequestContent {
            role: Some("user"),
            parts: vec![RequestPart {
                text: prompt.to_string(),
            }],
        }],
        generation_config: GenerationConfig { temperature },
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    status: Option<String>,
}

/// Pull the text out of a successful `generateContent` body.
///
/// Blocked prompts and safety stops are fatal: the same prompt would be
/// blocked again. An empty candidate is treated as a transient overload.
pub fn extract_text(body: &str) -> Result<String, WorkError> {
    let parsed = serde_json::from_str::<GenerateContentResponse>(body)
        .map_err(|err| WorkError::fatal(format!("invalid Gemini response: {err}")))?;

    if let Some(reason) = parsed
        .prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.block_reason.as_deref())
    {
        return Err(WorkError::fatal(format!("Gemini blocked the prompt: {reason}")));
    }

    let Some(candidate) = parsed.candidates.first() else {
        return Err(WorkError::overloaded("Gemini returned no candidates"));
    };

    let text = candidate
        .content
        .as_ref()
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|part| part.text.as_deref())
                .collect::<Vec<&str>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return match candidate.finish_reason.as_deref() {
            Some(reason @ ("SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT")) => Err(
                WorkError::fatal(format!("Gemini stopped generation: {reason}")),
            ),
            _ => Err(WorkError::overloaded("Gemini returned an empty response")),
        };
    }
    Ok(text)
}

pub fn gemini_api_error(http_status: u16, body: &str) -> WorkError {
    let (message, rpc_status) = match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(envelope) => (envelope.error.message, envelope.error.status),
        Err(_) => (body.chars().take(200).collect::<String>(), None),
    };
    let kind = classify_api_failure(http_status, rpc_status.as_deref(), &message);
    if kind == FailureKind::Fatal {
        tracing::error!(http_status, status = ?rpc_status, "Gemini rejected the request");
    }
    WorkError::new(kind, format!("Gemini API {http_status}: {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_body_matches_generate_content_shape() {
        let request = build_generate_request("be brief", "analyse kettles", 0.1);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["systemInstruction"]["parts"][0]["text"], json!("be brief"));
        assert_eq!(value["contents"][0]["role"], json!("user"));
        assert_eq!(value["contents"][0]["parts"][0]["text"], json!("analyse kettles"));
        assert!((value["generationConfig"]["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);

        let bare = serde_json::to_value(build_generate_request(" ", "hi", 0.0)).unwrap();
        assert!(bare.get("systemInstruction").is_none());
    }

    #[test]
    fn text_parts_are_concatenated() {
        let body = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hello, "}, {"text": "world"}]},
                "finishReason": "STOP"
            }]
        })
        .to_string();
        assert_eq!(extract_text(&body).unwrap(), "Hello, world");
    }

    #[test]
    fn blocked_and_empty_responses_are_classified() {
        let blocked = json!({"promptFeedback": {"blockReason": "SAFETY"}}).to_string();
        assert_eq!(extract_text(&blocked).unwrap_err().kind, FailureKind::Fatal);

        let safety = json!({"candidates": [{"finishReason": "SAFETY"}]}).to_string();
        assert_eq!(extract_text(&safety).unwrap_err().kind, FailureKind::Fatal);

        let empty = json!({"candidates": [{"content": {"parts": []}, "finishReason": "STOP"}]})
            .to_string();
        assert_eq!(extract_text(&empty).unwrap_err().kind, FailureKind::Overloaded);

        assert_eq!(extract_text("{}").unwrap_err().kind, FailureKind::Overloaded);
        assert_eq!(extract_text("not json").unwrap_err().kind, FailureKind::Fatal);
    }

    #[test]
    fn api_errors_use_rpc_status() {
        let body = json!({"error": {"code": 429, "message": "Resource has been exhausted (e.g. check quota).", "status": "RESOURCE_EXHAUSTED"}}).to_string();
        let err = gemini_api_error(429, &body);
        assert_eq!(err.kind, FailureKind::RateLimited);
        assert!(err.message.starts_with("Gemini API 429: Resource has been exhausted"));

        let body = json!({"error": {"code": 503, "message": "The model is overloaded. Please try again later.", "status": "UNAVAILABLE"}}).to_string();
        assert_eq!(gemini_api_error(503, &body).kind, FailureKind::Overloaded);

        let body = json!({"error": {"code": 400, "message": "API key not valid. Please pass a valid API key.", "status": "INVALID_ARGUMENT"}}).to_string();
        assert_eq!(gemini_api_error(400, &body).kind, FailureKind::Fatal);

        assert_eq!(gemini_api_error(504, "<html>gateway</html>").kind, FailureKind::Overloaded);
    }

    #[test]
    fn model_names_must_be_gemini_ids() {
        assert!(validate_model_name("gemini-2.0-flash").is_ok());
        assert!(validate_model_name("gpt-4o").is_err());
        assert!(validate_model_name("gemini flash").is_err());
    }
}
