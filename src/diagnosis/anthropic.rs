use serde::{Deserialize, Serialize};

use super::{Diagnoser, Diagnosis, FailureContext, build_prompt};
use crate::config::{LlmConfig, Secret};
use crate::http::{self, retry::with_retry};

const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

/// Messages API client used to diagnose failures.
pub struct AnthropicClient {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: Secret,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    /// # Errors
    /// Returns an error if no API key is configured or the HTTP client cannot
    /// be built.
    pub fn from_config(cfg: &LlmConfig) -> anyhow::Result<Self> {
        let api_key = cfg
            .api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("LLM API key not configured (ANTHROPIC_API_KEY)"))?;
        let client = http::build_client(http::LLM_TIMEOUT_SECS)?;
        Ok(Self::new(client, &cfg.base_url, api_key, &cfg.model, cfg.max_tokens))
    }

    pub fn new(
        http: reqwest::blocking::Client,
        base_url: &str,
        api_key: Secret,
        model: &str,
        max_tokens: u32,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            max_tokens,
        }
    }

    /// Send one user prompt and return the concatenated text of the reply.
    ///
    /// # Errors
    /// Returns an error if the API is unreachable, rejects the request, or
    /// replies without any text.
    pub fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };
        let resp: MessagesResponse = with_retry("LLM completion", || {
            let resp = self
                .http
                .post(&url)
                .header("x-api-key", self.api_key.expose())
                .header("anthropic-version", API_VERSION)
                .json(&body)
                .send()
                .map_err(|e| anyhow::anyhow!("could not reach LLM API at {url}: {e}"))?;
            let resp = http::require_success(resp, "LLM API", "ANTHROPIC_API_KEY")?;
            resp.json::<MessagesResponse>()
                .map_err(|e| anyhow::anyhow!("invalid response from LLM API: {e}"))
        })?;

        let text: String = resp
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();
        if text.trim().is_empty() {
            anyhow::bail!("LLM API returned no text");
        }
        Ok(text)
    }
}

impl Diagnoser for AnthropicClient {
    fn diagnose(&self, context: &FailureContext) -> anyhow::Result<Diagnosis> {
        let prompt = build_prompt(context);
        tracing::debug!(model = %self.model, chars = prompt.len(), "sending diagnosis prompt");
        let text = self.complete(&prompt)?;
        Ok(Diagnosis::from_response(&text))
    }
}
