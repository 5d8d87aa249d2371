//! Descriptive text about tour sites from a chat-completion API.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use utoipa::ToSchema;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const OPENAI_MODEL: &str = "gpt-4o-mini";
const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

const GUIDE_SYSTEM_PROMPT: &str = "You are a friendly local tour guide for Cheongju, South Korea. \
    Describe each listed site in two or three sentences for a visitor, in the order given.";

#[derive(Debug, Error)]
pub enum GuideError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("chat completion returned no choices")]
    EmptyReply,

    #[error("no sites to describe")]
    NoSites,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[derive(Debug, Clone)]
pub struct ChatClientParams {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

pub struct ChatClient {
    params: ChatClientParams,
    client: reqwest::Client,
}

impl ChatClient {
    pub fn new(params: ChatClientParams) -> Result<Self, GuideError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(params.timeout)
            .build()?;
        Ok(Self { params, client })
    }

    /// Sends the ordered messages and returns the first reply.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, GuideError> {
        let url = format!(
            "{}{}",
            self.params.base_url.trim_end_matches('/'),
            CHAT_COMPLETIONS_PATH
        );
        debug!("POST {} ({} messages)", url, messages.len());

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.params.api_key)
            .json(&ChatRequest {
                model: &self.params.model,
                messages,
            })
            .send()
            .await?;

        let status = response.status();
        info!("Chat API responded: status={}", status);
        if !status.is_success() {
            let text = response.text().await?;
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .ok()
                .and_then(|b| b.error)
                .map(|e| e.message)
                .unwrap_or(text);
            return Err(GuideError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(GuideError::EmptyReply)
    }

    /// Asks for short visitor descriptions of the given sites.
    pub async fn describe_sites(&self, names: &[String]) -> Result<String, GuideError> {
        self.complete(&site_prompt(names)?).await
    }
}

/// Messages asking for descriptions of `names`, in order.
///
/// ```
/// use tour_routing::guide::{site_prompt, Role};
///
/// let messages = site_prompt(&["Jungang Park".to_string()]).unwrap();
/// assert_eq!(messages[0].role, Role::System);
/// assert!(messages[1].content.contains("1. Jungang Park"));
/// ```
pub fn site_prompt(names: &[String]) -> Result<Vec<ChatMessage>, GuideError> {
    if names.is_empty() {
        return Err(GuideError::NoSites);
    }
    let listing = names
        .iter()
        .enumerate()
        .map(|(i, n)| format!("{}. {}", i + 1, n))
        .collect::<Vec<_>>()
        .join("\n");
    Ok(vec![
        ChatMessage::system(GUIDE_SYSTEM_PROMPT),
        ChatMessage::user(format!("Tour stops:\n{}", listing)),
    ])
}
