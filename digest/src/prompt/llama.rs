use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use crate::{digest_config::InferenceSettings, HttpClient};

const COMPLETION_PATH: &str = "completion";

/// Prompt in, generated text out
#[allow(async_fn_in_trait)]
pub trait CompletionService {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    n_predict: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    content: String,
}

#[derive(Debug, Deserialize)]
struct CompletionErrorBody {
    error: CompletionError,
}

#[derive(Debug, Deserialize)]
struct CompletionError {
    message: String,
}

/// Client for a local llama.cpp style server exposing `POST /completion`
#[derive(Debug, Clone)]
pub struct LlamaClient {
    http_client: HttpClient,
    endpoint: String,
    n_predict: u32,
    timeout: Duration,
}

impl LlamaClient {
    pub fn new(http_client: HttpClient, settings: &InferenceSettings) -> Self {
        LlamaClient {
            http_client,
            endpoint: format!(
                "{}/{}",
                settings.endpoint.trim_end_matches('/'),
                COMPLETION_PATH
            ),
            n_predict: settings.n_predict,
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }
}

impl CompletionService for LlamaClient {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        let resp = self
            .http_client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&CompletionRequest {
                prompt,
                n_predict: self.n_predict,
            })
            .send()
            .await
            .context("Completion request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return match serde_json::from_str::<CompletionErrorBody>(&body) {
                Ok(CompletionErrorBody { error }) => {
                    Err(anyhow!("Completion API error ({}): {}", status, error.message))
                }
                Err(_) => Err(anyhow!("Completion API returned {}: {}", status, body)),
            };
        }

        let body = resp.json::<serde_json::Value>().await?;
        let parsed = serde_json::from_value::<CompletionResponse>(body.clone())
            .context(format!("Could not parse completion response: {}", body))?;

        Ok(parsed.content.trim().to_string())
    }
}
