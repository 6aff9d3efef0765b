// relay-core/src/providers/openai.rs
use super::{ProviderAdapter, ProviderId};
use crate::config::DEFAULT_TIMEOUT_MS;
use crate::errors::{RelayError, Result};
use crate::models::chat::{ChatCompletionRequest, ChatCompletionResponse, Usage};
use async_trait::async_trait;
use reqwest::{Client, header};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Adapter for any backend that speaks the OpenAI `chat/completions` dialect.
#[derive(Clone)]
pub struct OpenAiCompatibleAdapter {
    provider: ProviderId,
    base_url: String,
    api_key: String,
    timeout: Duration,
    extra_headers: BTreeMap<String, String>,
    http_client: Client,
}

#[derive(Deserialize, Debug, Default)]
struct CompletionPayload {
    #[serde(default)]
    choices: Option<Vec<CompletionChoice>>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
}

#[derive(Deserialize, Debug)]
struct CompletionChoice {
    #[serde(default)]
    message: Option<CompletionMessage>,
}

#[derive(Deserialize, Debug)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct CompletionUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

/// Formats headers for logging, excluding Authorization.
fn format_headers_for_log(headers: &header::HeaderMap) -> String {
    let fields: Vec<String> = headers
        .iter()
        .filter(|(name, _)| *name != header::AUTHORIZATION)
        .map(|(name, value)| {
            format!(
                "\"{}\": \"{}\"",
                name.as_str(),
                value.to_str().unwrap_or("<invalid header value>")
            )
        })
        .collect();
    format!("{{{}}}", fields.join(", "))
}

impl OpenAiCompatibleAdapter {
    pub fn new(
        provider: ProviderId,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        http_client: Client,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            provider,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            extra_headers: BTreeMap::new(),
            http_client,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout = Duration::from_millis(timeout_ms);
        self
    }

    pub fn with_extra_headers(mut self, extra_headers: BTreeMap<String, String>) -> Self {
        self.extra_headers = extra_headers;
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    /// Builds the JSON body. Optional sampling parameters are omitted when unset.
    pub fn build_payload(&self, request: &ChatCompletionRequest) -> Value {
        let mut payload = json!({
            "model": request.model,
            "messages": request.messages,
        });
        if let Some(temperature) = request.temperature {
            payload["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }
        payload
    }

    /// Bearer auth plus the backend-specific extra headers. Headers that are
    /// not valid HTTP are skipped with a warning.
    pub fn build_headers(&self) -> header::HeaderMap {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        match header::HeaderValue::from_str(&format!("Bearer {}", self.api_key)) {
            Ok(value) => {
                headers.insert(header::AUTHORIZATION, value);
            }
            Err(_) => warn!(provider = %self.provider, "API key contains invalid header characters; sending without Authorization."),
        }
        for (key, value) in &self.extra_headers {
            match (
                header::HeaderName::from_bytes(key.as_bytes()),
                header::HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(val)) => {
                    headers.insert(name, val);
                }
                _ => warn!(provider = %self.provider, header = %key, "Skipping invalid extra header."),
            }
        }
        headers
    }

    /// Turns a 2xx body into a response, failing on empty completions.
    pub fn parse_response(
        &self,
        request: &ChatCompletionRequest,
        response_body: &str,
        latency_ms: u64,
    ) -> Result<ChatCompletionResponse> {
        let payload: CompletionPayload =
            serde_json::from_str(response_body).map_err(|e| RelayError::InvalidResponse {
                provider: self.provider,
                message: format!("{}: {}", e, response_body),
            })?;

        let content = payload
            .choices
            .and_then(|choices| choices.into_iter().next())
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(RelayError::ProviderEmptyResponse {
                provider: self.provider,
            })?;

        Ok(ChatCompletionResponse {
            content,
            model: request.model.clone(),
            provider: self.provider,
            usage: payload.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            latency_ms,
        })
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleAdapter {
    fn id(&self) -> ProviderId {
        self.provider
    }

    async fn chat(&self, request: &ChatCompletionRequest) -> Result<ChatCompletionResponse> {
        let started = Instant::now();
        let endpoint = self.endpoint();
        let headers = self.build_headers();
        let payload = self.build_payload(request);

        debug!(
            provider = %self.provider,
            endpoint = %endpoint,
            model = %request.model,
            num_messages = request.messages.len(),
            headers = %format_headers_for_log(&headers),
            "Sending chat completion request."
        );
        trace!(payload = %payload, "Request payload");

        let call = async {
            let response = self
                .http_client
                .post(&endpoint)
                .headers(headers)
                .json(&payload)
                .send()
                .await
                .map_err(|source| RelayError::Network {
                    provider: self.provider,
                    source,
                })?;
            let status = response.status();
            let body = response.text().await.map_err(|source| RelayError::Network {
                provider: self.provider,
                source,
            })?;
            Ok::<_, RelayError>((status, body))
        };

        // Dropping the in-flight future on expiry aborts the request.
        let (status, body) = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| {
                warn!(provider = %self.provider, timeout_ms = self.timeout_ms(), "Chat completion timed out.");
                RelayError::Timeout {
                    provider: self.provider,
                    timeout_ms: self.timeout_ms(),
                }
            })??;

        if !status.is_success() {
            return Err(RelayError::ProviderHttp {
                provider: self.provider,
                status: status.as_u16(),
                body,
            });
        }
        trace!(body = %body, "Response body");

        let latency_ms = started.elapsed().as_millis() as u64;
        let response = self.parse_response(request, &body, latency_ms)?;
        info!(
            provider = %self.provider,
            model = %response.model,
            latency_ms = response.latency_ms,
            "Chat completion received."
        );
        Ok(response)
    }

    async fn healthcheck(&self) -> bool {
        let url = format!("{}/models", self.base_url);
        let call = self.http_client.get(&url).headers(self.build_headers()).send();
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(response)) => response.status().is_success(),
            Ok(Err(e)) => {
                debug!(provider = %self.provider, error = %e, "Healthcheck request failed.");
                false
            }
            Err(_) => {
                debug!(provider = %self.provider, "Healthcheck timed out.");
                false
            }
        }
    }
}
