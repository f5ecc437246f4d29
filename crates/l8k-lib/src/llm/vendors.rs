//! HTTP completion clients for the supported LLM vendors
//!
//! Supported vendors:
//! - `openai`: OpenAI chat completions (or any compatible endpoint via `--llm-api-url`)
//! - `openai-azure`: Azure OpenAI deployments
//! - `anthropic`: Anthropic messages API
//! - `gemini`: Google Gemini `generateContent`

use super::{ChatMessage, CompletionClient, Role, TEMPERATURE};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENAI_DEFAULT_MODEL: &str = "gpt-4o";
const AZURE_API_VERSION: &str = "2024-06-01";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_DEFAULT_MODEL: &str = "claude-3-5-sonnet-20240620";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 4096;
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_DEFAULT_MODEL: &str = "gemini-2.0-flash";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vendor {
    OpenAi,
    OpenAiAzure,
    Anthropic,
    Gemini,
}

impl Vendor {
    pub const ALL: [Vendor; 4] = [
        Vendor::OpenAi,
        Vendor::OpenAiAzure,
        Vendor::Anthropic,
        Vendor::Gemini,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::OpenAi => "openai",
            Vendor::OpenAiAzure => "openai-azure",
            Vendor::Anthropic => "anthropic",
            Vendor::Gemini => "gemini",
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vendor {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Vendor::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| {
                let supported: Vec<_> = Vendor::ALL.iter().map(Vendor::as_str).collect();
                anyhow::anyhow!(
                    "unsupported LLM vendor: {}. Supported vendors: {}",
                    s,
                    supported.join(", ")
                )
            })
    }
}

/// Credentials and endpoint selection for the completion client
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: String,
    pub api_url: Option<String>,
    pub vendor: String,
    pub model: Option<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: None,
            vendor: Vendor::OpenAi.as_str().to_string(),
            model: None,
        }
    }
}

/// Build the completion client for the configured vendor
pub fn create_client(settings: &LlmSettings) -> Result<Arc<dyn CompletionClient>> {
    let vendor: Vendor = settings.vendor.parse()?;
    if settings.api_key.trim().is_empty() {
        bail!("an LLM API key is required for vendor {} (--llm-api-key)", vendor);
    }

    let http = Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")?;

    let api_url = settings
        .api_url
        .as_deref()
        .filter(|url| !url.trim().is_empty())
        .map(normalize_base_url)
        .transpose()?;
    let model = settings.model.clone().filter(|m| !m.trim().is_empty());
    let api_key = settings.api_key.clone();

    debug!(vendor = %vendor, model = ?model, "Creating LLM client");

    let client: Arc<dyn CompletionClient> = match vendor {
        Vendor::OpenAi => Arc::new(OpenAiClient {
            http,
            endpoint: format!(
                "{}/chat/completions",
                api_url.as_deref().unwrap_or(OPENAI_BASE_URL)
            ),
            auth: OpenAiAuth::Bearer(api_key),
            model: model.unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string()),
        }),
        Vendor::OpenAiAzure => {
            let base =
                api_url.context("vendor openai-azure requires an API URL (--llm-api-url)")?;
            let deployment =
                model.context("vendor openai-azure requires a deployment name (--llm-model)")?;
            Arc::new(OpenAiClient {
                http,
                endpoint: format!(
                    "{}/openai/deployments/{}/chat/completions?api-version={}",
                    base, deployment, AZURE_API_VERSION
                ),
                auth: OpenAiAuth::ApiKey(api_key),
                model: deployment,
            })
        }
        Vendor::Anthropic => Arc::new(AnthropicClient {
            http,
            base_url: api_url.unwrap_or_else(|| ANTHROPIC_BASE_URL.to_string()),
            api_key,
            model: model.unwrap_or_else(|| ANTHROPIC_DEFAULT_MODEL.to_string()),
        }),
        Vendor::Gemini => Arc::new(GeminiClient {
            http,
            base_url: api_url.unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            api_key,
            model: model.unwrap_or_else(|| GEMINI_DEFAULT_MODEL.to_string()),
        }),
    };

    Ok(client)
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let url = Url::parse(raw.trim()).with_context(|| format!("Invalid LLM API URL: {}", raw))?;
    Ok(url.as_str().trim_end_matches('/').to_string())
}

async fn send_json<T: serde::de::DeserializeOwned>(
    builder: RequestBuilder,
    body: &impl Serialize,
) -> Result<T> {
    let response = builder
        .json(body)
        .send()
        .await
        .context("Failed to send LLM request")?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("LLM API error ({}): {}", status, body);
    }

    response.json().await.context("Failed to parse LLM response")
}

enum OpenAiAuth {
    Bearer(String),
    ApiKey(String),
}

/// OpenAI chat completions, also used for Azure deployments
struct OpenAiClient {
    http: Client,
    endpoint: String,
    auth: OpenAiAuth,
    model: String,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize, Deserialize)]
struct OpenAiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        user_text: &str,
    ) -> Result<String> {
        let mut messages = vec![OpenAiMessage {
            role: "system",
            content: system_prompt,
        }];
        messages.extend(history.iter().map(|m| OpenAiMessage {
            role: m.role.as_str(),
            content: &m.content,
        }));
        messages.push(OpenAiMessage {
            role: Role::User.as_str(),
            content: user_text,
        });

        let request = OpenAiRequest {
            model: &self.model,
            messages,
            temperature: TEMPERATURE,
        };

        let builder = self.http.post(&self.endpoint);
        let builder = match &self.auth {
            OpenAiAuth::Bearer(key) => builder.bearer_auth(key),
            OpenAiAuth::ApiKey(key) => builder.header("api-key", key),
        };

        let response: OpenAiResponse = send_json(builder, &request).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("no response from LLM")
    }
}

struct AnthropicClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[async_trait]
impl CompletionClient for AnthropicClient {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        user_text: &str,
    ) -> Result<String> {
        let mut messages: Vec<_> = history
            .iter()
            .map(|m| OpenAiMessage {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect();
        messages.push(OpenAiMessage {
            role: Role::User.as_str(),
            content: user_text,
        });

        let request = AnthropicRequest {
            model: &self.model,
            max_tokens: ANTHROPIC_MAX_TOKENS,
            system: system_prompt,
            messages,
            temperature: TEMPERATURE,
        };

        let builder = self
            .http
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION);

        let response: AnthropicResponse = send_json(builder, &request).await?;
        let text: String = response
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect();
        if text.is_empty() {
            bail!("no response from LLM");
        }
        Ok(text)
    }
}

struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    system_instruction: GeminiContent,
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

impl GeminiContent {
    fn text(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![GeminiPart {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[async_trait]
impl CompletionClient for GeminiClient {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        user_text: &str,
    ) -> Result<String> {
        let mut contents: Vec<_> = history
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                };
                GeminiContent::text(Some(role), &m.content)
            })
            .collect();
        contents.push(GeminiContent::text(Some("user"), user_text));

        let request = GeminiRequest {
            system_instruction: GeminiContent::text(None, system_prompt),
            contents,
            generation_config: GeminiGenerationConfig {
                temperature: TEMPERATURE,
            },
        };

        let builder = self
            .http
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, self.model
            ))
            .query(&[("key", &self.api_key)]);

        let response: GeminiResponse = send_json(builder, &request).await?;
        let text: String = response
            .candidates
            .into_iter()
            .next()
            .map(|c| c.content.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();
        if text.is_empty() {
            bail!("no response from LLM");
        }
        Ok(text)
    }
}
