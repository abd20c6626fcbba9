//! Chat-completion capability, bound to GigaChat.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use url::Url;
use uuid::Uuid;

use crate::constants::{CHAT_MAX_TOKENS, CHAT_TEMPERATURE, GIGACHAT_MODEL};
use crate::error::ComicError;

/// Something that can turn a prompt into text.
#[async_trait]
pub trait ChatCapability: Send + Sync {
    /// Fetches a fresh access token.
    async fn authenticate(&self) -> Result<String, ComicError>;

    /// Runs one completion with a token from [`ChatCapability::authenticate`].
    async fn complete(
        &self,
        token: &str,
        prompt: &str,
        settings: &CompletionSettings,
    ) -> Result<String, ComicError>;
}

/// Model and sampling parameters for one completion.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionSettings {
    /// Model name
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Response length cap
    pub max_tokens: u32,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            model: GIGACHAT_MODEL.to_string(),
            temperature: CHAT_TEMPERATURE,
            max_tokens: CHAT_MAX_TOKENS,
        }
    }
}

/// Where and how to reach GigaChat.
#[derive(Clone, Debug)]
pub struct ChatSettings {
    /// base64 `client_id:client_secret`, `None` means every token fetch fails
    pub credentials: Option<String>,
    /// OAuth endpoint
    pub auth_url: Url,
    /// Chat completions endpoint
    pub api_url: Url,
    /// OAuth scope
    pub scope: String,
    /// Accept certificates that don't chain to a public root
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: String,
}

/// GigaChat over HTTPS.
#[derive(Clone, Debug)]
pub struct GigaChatClient {
    client: Client,
    settings: ChatSettings,
}

impl GigaChatClient {
    /// Builds the HTTP client; fails only if TLS setup fails.
    pub fn new(settings: ChatSettings) -> Result<Self, ComicError> {
        let client = Client::builder()
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .build()?;
        Ok(Self { client, settings })
    }
}

#[async_trait]
impl ChatCapability for GigaChatClient {
    async fn authenticate(&self) -> Result<String, ComicError> {
        let Some(credentials) = self.settings.credentials.as_deref() else {
            error!("Gigachat credentials not found. Set the GIGACHAT_CREDENTIALS environment variable.");
            return Err(ComicError::Auth("credentials not configured".to_string()));
        };

        let response = self
            .client
            .post(self.settings.auth_url.clone())
            .header(AUTHORIZATION, format!("Basic {credentials}"))
            .header("RqUID", Uuid::new_v4().to_string())
            .form(&[("scope", self.settings.scope.as_str())])
            .send()
            .await
            .map_err(|err| ComicError::Auth(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Error getting token: {} - {}", status, body);
            return Err(ComicError::Auth(format!("{status} - {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| ComicError::Auth(err.to_string()))?;
        token
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ComicError::Auth("response had no access_token".to_string()))
    }

    async fn complete(
        &self,
        token: &str,
        prompt: &str,
        settings: &CompletionSettings,
    ) -> Result<String, ComicError> {
        let body = CompletionRequest {
            model: &settings.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        };
        debug!("Requesting completion from {}", self.settings.api_url);

        let response = self
            .client
            .post(self.settings.api_url.clone())
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Error requesting the GIGACHAT API: {} - {}", status, body);
            return Err(ComicError::RemoteCall(format!("{status} - {body}")));
        }

        let parsed: CompletionResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ComicError::RemoteCall("completion had no choices".to_string()))?;
        info!("Generated text: {}", content);
        Ok(content)
    }
}
