/// Web search via the Serper API.
///
/// Search is only used by the full and quick scopes; emergency runs never
/// touch the network beyond the model.
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::retry::{WorkError, classify_api_failure};

pub const DEFAULT_SERPER_BASE_URL: &str = "https://google.serper.dev";

/// Characters kept per snippet when building evidence text.
const MAX_SNIPPET_CHARS: usize = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceBundle {
    pub query: String,
    pub results: Vec<SearchResult>,
}

impl EvidenceBundle {
    /// Numbered plain-text digest for inclusion in a prompt.
    pub fn to_prompt_text(&self) -> String {
        if self.results.is_empty() {
            return format!("No web results found for \"{}\".", self.query);
        }
        let mut out = format!("Query: {}\n", self.query);
        for (index, result) in self.results.iter().enumerate() {
            out.push_str(&format!(
                "[{}] {} ({})\n{}\n",
                index + 1,
                result.title,
                result.url,
                truncate_chars(&result.snippet, MAX_SNIPPET_CHARS)
            ));
        }
        out
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut out = trimmed.chars().take(max_chars).collect::<String>();
    out.push_str("...");
    out
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, num_results: usize) -> Result<EvidenceBundle, WorkError>;
}

#[derive(Debug, Clone)]
pub struct SerperClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl SerperClient {
    pub fn new(api_key: String, base_url: String, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed to build HTTP client for search provider")?;
        Ok(Self {
            http,
            api_key,
            base_url,
        })
    }
}

#[async_trait]
impl WebSearch for SerperClient {
    async fn search(&self, query: &str, num_results: usize) -> Result<EvidenceBundle, WorkError> {
        let url = format!("{}/search", self.base_url.trim_end_matches('/'));
        tracing::debug!(query, num_results, "running web search");

        let response = self
            .http
            .post(url)
            .header("X-API-KEY", &self.api_key)
            .json(&json!({ "q": query, "num": num_results }))
            .send()
            .await
            .map_err(|err| WorkError::from_transport("search", &err))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| WorkError::from_transport("search", &err))?;

        if !status.is_success() {
            return Err(search_api_error(status.as_u16(), &body));
        }

        parse_search_response(query, &body, num_results)
    }
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperHit>,
}

#[derive(Debug, Deserialize)]
struct SerperHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

pub fn parse_search_response(
    query: &str,
    body: &str,
    num_results: usize,
) -> Result<EvidenceBundle, WorkError> {
    let parsed = serde_json::from_str::<SerperResponse>(body)
        .map_err(|err| WorkError::fatal(format!("invalid search response: {err}")))?;
    let results = parsed
        .organic
        .into_iter()
        .filter(|hit| !hit.link.trim().is_empty())
        .take(num_results.max(1))
        .map(|hit| SearchResult {
            title: hit.title,
            url: hit.link,
            snippet: hit.snippet,
        })
        .collect();
    Ok(EvidenceBundle {
        query: query.to_string(),
        results,
    })
}

/// Serper reports errors as `{"message": "...", "statusCode": N}`.
pub fn search_api_error(http_status: u16, body: &str) -> WorkError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| truncate_chars(body, 200));
    let kind = classify_api_failure(http_status, None, &message);
    WorkError::new(kind, format!("search API {http_status}: {message}"))
}
