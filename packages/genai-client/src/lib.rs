//! Pure text generation REST clients.
//!
//! Two small clients with no domain logic: Google Gemini `generateContent`
//! and Azure OpenAI chat completions. Both take a prompt and return plain
//! text.
//!
//! # Example
//!
//! ```rust,ignore
//! use genai_client::GeminiClient;
//!
//! let client = GeminiClient::new(api_key).with_model("gemini-1.5-flash");
//! let text = client.generate("Write a short post about our new menu").await?;
//! ```

pub mod error;
pub mod types;

pub use error::{GenAiError, Result};
pub use types::*;

use std::time::{Duration, Instant};

use reqwest::Client;
use tracing::{debug, warn};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
const AZURE_API_VERSION: &str = "2024-02-15-preview";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

async fn check_status(response: reqwest::Response, provider: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_text = response.text().await.unwrap_or_default();
    warn!(provider, status = %status, error = %error_text, "Generation API error");
    Err(GenAiError::Api {
        status: status.as_u16(),
        message: error_text,
    })
}

/// Gemini `generateContent` client.
#[derive(Clone)]
pub struct GeminiClient {
    http_client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http_client: http_client(DEFAULT_TIMEOUT),
            api_key: api_key.into(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    /// Create from environment variables `GEMINI_API_KEY` and optional `GEMINI_MODEL`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| GenAiError::Config("GEMINI_API_KEY not set".into()))?;
        let client = Self::new(api_key);
        Ok(match std::env::var("GEMINI_MODEL") {
            Ok(model) if !model.is_empty() => client.with_model(model),
            _ => client,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http_client = http_client(timeout);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    /// Send a raw request and return the decoded response.
    pub async fn generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let response = self
            .http_client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(request)
            .send()
            .await?;

        let response = check_status(response, "gemini").await?;
        response
            .json()
            .await
            .map_err(|e| GenAiError::Parse(e.to_string()))
    }

    /// Generate text for a single prompt.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(GenAiError::Config("prompt is empty".into()));
        }

        let start = Instant::now();
        let request = GenerateContentRequest::prompt(prompt).temperature(0.7);
        let text = self
            .generate_content(&request)
            .await?
            .text()
            .ok_or_else(|| GenAiError::Parse("No text in Gemini response".into()))?;

        debug!(
            model = %self.model,
            duration_ms = start.elapsed().as_millis(),
            "Gemini generation"
        );
        Ok(text)
    }
}

/// Azure OpenAI chat completions client for a single deployment.
#[derive(Clone)]
pub struct AzureOpenAiClient {
    http_client: Client,
    endpoint: String,
    api_key: String,
    deployment: String,
}

impl std::fmt::Debug for AzureOpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureOpenAiClient")
            .field("endpoint", &self.endpoint)
            .field("deployment", &self.deployment)
            .finish_non_exhaustive()
    }
}

impl AzureOpenAiClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        deployment: impl Into<String>,
    ) -> Self {
        let endpoint: String = endpoint.into();
        Self {
            http_client: http_client(DEFAULT_TIMEOUT),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            deployment: deployment.into(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http_client = http_client(timeout);
        self
    }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions",
            self.endpoint, self.deployment
        )
    }

    /// Generate text for a single user prompt.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(GenAiError::Config("prompt is empty".into()));
        }

        let request = ChatRequest {
            messages: vec![
                ChatMessage::system("You write concise, friendly copy for local businesses."),
                ChatMessage::user(prompt),
            ],
            temperature: Some(0.7),
            max_tokens: Some(800),
        };

        let response = self
            .http_client
            .post(self.url())
            .query(&[("api-version", AZURE_API_VERSION)])
            .header("api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let response = check_status(response, "azure_openai").await?;
        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenAiError::Parse(e.to_string()))?;

        chat.choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| GenAiError::Parse("No response from Azure OpenAI".into()))
    }
}
