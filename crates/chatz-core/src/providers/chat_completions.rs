//! OpenAI-compatible Chat Completions client.

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;

use super::shared::{ProviderError, ProviderResult, USER_AGENT, classify_reqwest_error};
use super::sse::{DeltaEventStream, DeltaStream};
use crate::config::ApiProfile;
use crate::core::conversation::Message;

const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

/// Sampling temperature sent with every request.
pub const DEFAULT_TEMPERATURE: f32 = 1.0;

/// Chat completions endpoint configuration.
#[derive(Debug, Clone)]
pub struct ChatCompletionsConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub extra_headers: HeaderMap,
}

impl ChatCompletionsConfig {
    /// Builds a client configuration from a named API profile.
    ///
    /// # Errors
    /// Returns an error if the profile has no API key or the CSRF header
    /// name/value is not a valid HTTP header.
    pub fn from_profile(profile: &ApiProfile) -> Result<Self> {
        let api_key = profile
            .resolved_api_key()
            .context("API key is not configured (set api_key or CHATZ_API_KEY)")?;

        let mut extra_headers = HeaderMap::new();
        // Without a token the header is left off entirely.
        if profile.include_csrf_token
            && let Some(token) = profile.resolved_csrf_token()
        {
            let name = HeaderName::from_bytes(profile.csrf_header.as_bytes())
                .with_context(|| format!("Invalid CSRF header name '{}'", profile.csrf_header))?;
            let value = HeaderValue::from_str(&token).context("Invalid CSRF token value")?;
            extra_headers.insert(name, value);
        }

        Ok(Self {
            base_url: profile.api_endpoint.clone(),
            api_key,
            model: profile.model_name.clone(),
            temperature: DEFAULT_TEMPERATURE,
            extra_headers,
        })
    }

    /// Full URL of the completions endpoint.
    pub fn completions_url(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            CHAT_COMPLETIONS_PATH
        )
    }
}

/// Streaming chat completions client.
pub struct ChatCompletionsClient {
    config: ChatCompletionsConfig,
    http: reqwest::Client,
}

impl ChatCompletionsClient {
    pub fn new(config: ChatCompletionsConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, http }
    }

    /// Posts the conversation and returns the assembled delta stream.
    ///
    /// # Errors
    /// Returns a transport/timeout error if the request cannot be sent and
    /// an HTTP status error (with the response body) for non-2xx replies.
    pub async fn send_messages_stream(&self, messages: &[Message]) -> ProviderResult<DeltaEventStream> {
        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            stream: true,
            temperature: self.config.temperature,
        };

        let url = self.config.completions_url();
        tracing::debug!(url = %url, model = %self.config.model, messages = messages.len(), "sending chat completion request");

        let response = self
            .http
            .post(&url)
            .headers(build_headers(&self.config.api_key, &self.config.extra_headers))
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "chat completion request failed");
            return Err(ProviderError::http_status(status.as_u16(), &error_body));
        }

        Ok(Box::pin(DeltaStream::new(response.bytes_stream())))
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    temperature: f32,
}

pub(crate) fn build_headers(api_key: &str, extra_headers: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "Authorization",
        HeaderValue::from_str(&format!("Bearer {api_key}"))
            .unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    headers.insert("content-type", HeaderValue::from_static("application/json"));

    for (name, value) in extra_headers {
        headers.insert(name, value.clone());
    }

    headers
}
