//! Model discovery via the OpenAI-compatible `/models` endpoint.

use std::time::Duration;

use serde::Deserialize;

use super::chat_completions::{ChatCompletionsConfig, build_headers};
use super::shared::{
    ProviderError, ProviderErrorKind, ProviderResult, USER_AGENT, classify_reqwest_error,
};

const MODELS_PATH: &str = "/models";
const MODELS_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

/// Lists the model ids the endpoint advertises, in response order.
///
/// # Errors
/// Returns an error on transport failure, non-2xx status, an unparseable
/// body, or an empty model list.
pub async fn fetch_available_models(config: &ChatCompletionsConfig) -> ProviderResult<Vec<String>> {
    let url = format!("{}{}", config.base_url.trim_end_matches('/'), MODELS_PATH);
    let http = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(MODELS_TIMEOUT)
        .build()
        .map_err(|e| classify_reqwest_error(&e))?;

    let response = http
        .get(&url)
        .headers(build_headers(&config.api_key, &config.extra_headers))
        .send()
        .await
        .map_err(|e| classify_reqwest_error(&e))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| classify_reqwest_error(&e))?;
    if !status.is_success() {
        return Err(ProviderError::http_status(status.as_u16(), &body));
    }

    let parsed: ModelsResponse = serde_json::from_str(&body).map_err(|e| {
        ProviderError::new(
            ProviderErrorKind::Parse,
            format!("Failed to parse models response: {e}"),
        )
    })?;

    let models: Vec<String> = parsed
        .data
        .into_iter()
        .map(|m| m.id)
        .filter(|id| !id.is_empty())
        .collect();
    if models.is_empty() {
        return Err(ProviderError::new(
            ProviderErrorKind::Parse,
            "No models found in API response",
        ));
    }

    tracing::debug!(count = models.len(), "fetched available models");
    Ok(models)
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderMap;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config(base_url: String) -> ChatCompletionsConfig {
        ChatCompletionsConfig {
            base_url,
            api_key: "sk-test".to_string(),
            model: "unused".to_string(),
            temperature: 1.0,
            extra_headers: HeaderMap::new(),
        }
    }

    #[tokio::test]
    async fn test_fetch_models_lists_ids() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "data": [
                    { "id": "gpt-4o", "object": "model" },
                    { "id": "gpt-4o-mini", "object": "model" }
                ]
            })))
            .mount(&server)
            .await;

        let models = fetch_available_models(&config(format!("{}/v1/", server.uri())))
            .await
            .unwrap();
        assert_eq!(models, vec!["gpt-4o", "gpt-4o-mini"]);
    }

    #[tokio::test]
    async fn test_fetch_models_empty_list_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&server)
            .await;

        let err = fetch_available_models(&config(server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No models found in API response");
    }

    #[tokio::test]
    async fn test_fetch_models_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let err = fetch_available_models(&config(server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "API Error: 403 - forbidden");
    }
}
