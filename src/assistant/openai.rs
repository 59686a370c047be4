//! OpenAI Assistants API client.
//!
//! Implements [`AssistantBackend`] against the `/v1/threads` family of
//! endpoints (Assistants v2).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::assistant::backend::{
    AssistantBackend, BackendError, RunState, ThreadMessage,
};

/// Header required to opt in to the Assistants v2 API surface.
const ASSISTANTS_BETA_HEADER: &str = "assistants=v2";

/// OpenAI Assistants API client.
#[derive(Debug)]
pub struct OpenAiAssistantClient {
    client: reqwest::Client,
    api_key: String,
    assistant_id: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MessageListResponse {
    #[serde(default)]
    data: Vec<ThreadMessage>,
}

impl OpenAiAssistantClient {
    pub fn new(api_key: String, assistant_id: String) -> Result<Self, BackendError> {
        if api_key.trim().is_empty() {
            return Err(BackendError::InvalidApiKey(
                "API key must not be empty".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| BackendError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            assistant_id,
            base_url: "https://api.openai.com".to_string(),
        })
    }

    /// Override the API base URL. Must be https except for loopback hosts.
    pub fn with_base_url(mut self, url: String) -> Result<Self, BackendError> {
        let parsed = url::Url::parse(&url)
            .map_err(|e| BackendError::InvalidBaseUrl(format!("invalid URL \"{url}\": {e}")))?;
        let host = parsed.host_str().unwrap_or("");
        let is_loopback =
            host == "localhost" || host == "127.0.0.1" || host == "::1" || host == "[::1]";
        if parsed.scheme() != "https" && !is_loopback {
            return Err(BackendError::InvalidBaseUrl(format!(
                "base URL must use https scheme (or http for localhost), got \"{}\"",
                parsed.scheme()
            )));
        }
        self.base_url = url.trim_end_matches('/').to_string();
        Ok(self)
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    async fn post(&self, path: &str, body: Value) -> Result<reqwest::Response, BackendError> {
        self.client
            .post(self.api_url(path))
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("openai-beta", ASSISTANTS_BETA_HEADER)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, BackendError> {
        self.client
            .get(self.api_url(path))
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("openai-beta", ASSISTANTS_BETA_HEADER)
            .send()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))
    }
}

/// Map a non-success response to a typed API error with the body attached.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable>".to_string());
    Err(BackendError::Api {
        status: status.as_u16(),
        message: extract_api_error(&body),
    })
}

/// Pull the error message out of an OpenAI error envelope, falling back to
/// the raw body.
fn extract_api_error(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")?
                .get("message")?
                .as_str()
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| body.to_string())
}

async fn parse_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, BackendError> {
    response
        .json::<T>()
        .await
        .map_err(|e| BackendError::Http(format!("failed to parse response: {e}")))
}

#[async_trait]
impl AssistantBackend for OpenAiAssistantClient {
    async fn create_thread(&self) -> Result<String, BackendError> {
        let response = self.post("threads", json!({})).await?;
        let thread: IdResponse = parse_json(check_status(response).await?).await?;
        Ok(thread.id)
    }

    async fn add_message(&self, thread_id: &str, text: &str) -> Result<(), BackendError> {
        let body = json!({
            "role": "user",
            "content": text,
        });
        let response = self.post(&format!("threads/{thread_id}/messages"), body).await?;
        check_status(response).await?;
        Ok(())
    }

    async fn start_run(&self, thread_id: &str) -> Result<String, BackendError> {
        let body = json!({
            "assistant_id": self.assistant_id,
        });
        let response = self.post(&format!("threads/{thread_id}/runs"), body).await?;
        let run: IdResponse = parse_json(check_status(response).await?).await?;
        Ok(run.id)
    }

    async fn run_status(&self, thread_id: &str, run_id: &str) -> Result<RunState, BackendError> {
        let response = self.get(&format!("threads/{thread_id}/runs/{run_id}")).await?;
        parse_json(check_status(response).await?).await
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, BackendError> {
        let response = self.get(&format!("threads/{thread_id}/messages")).await?;
        let list: MessageListResponse = parse_json(check_status(response).await?).await?;
        Ok(list.data)
    }
}
