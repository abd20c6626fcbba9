//! Telegram front end: every text message becomes a comic.
//!
//! Talks to the Bot API directly with `reqwest`, long-polling `getUpdates`
//! and handling one update at a time.

use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::constants::{
    BOT_ERROR_MESSAGE, BOT_FAILURE_MESSAGE, BOT_WELCOME_MESSAGE, COMIC_FILE_NAME,
    TELEGRAM_POLL_BACKOFF_SECONDS, TELEGRAM_POLL_TIMEOUT_SECONDS,
};
use crate::error::ComicError;
use crate::pipeline::ComicPipeline;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

/// One incoming update.
#[derive(Clone, Debug, Deserialize)]
pub struct Update {
    /// Monotonic id, the next poll starts after it
    pub update_id: i64,
    /// Present for new messages; other update kinds are ignored
    #[serde(default)]
    pub message: Option<Message>,
}

/// A chat message.
#[derive(Clone, Debug, Deserialize)]
pub struct Message {
    /// Id within the chat
    pub message_id: i64,
    /// Where it was sent
    pub chat: Chat,
    /// Text body, absent for photos, stickers and the like
    #[serde(default)]
    pub text: Option<String>,
}

/// The chat a message belongs to.
#[derive(Clone, Debug, Deserialize)]
pub struct Chat {
    /// Chat id
    pub id: i64,
}

#[derive(Debug, Serialize)]
struct GetUpdates<'a> {
    offset: i64,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

/// What a message asks for.
#[derive(Debug, PartialEq, Eq)]
enum Request<'a> {
    Welcome,
    Comic(&'a str),
    Ignore,
}

/// `/start` and `/help` (optionally `@botname`-suffixed) get the welcome text,
/// any other text is drawn.
fn classify(text: Option<&str>) -> Request<'_> {
    let Some(text) = text else {
        return Request::Ignore;
    };
    let command = text
        .split_whitespace()
        .next()
        .map(|word| word.split('@').next().unwrap_or(word));
    match command {
        Some("/start") | Some("/help") => Request::Welcome,
        _ if text.trim().is_empty() => Request::Ignore,
        _ => Request::Comic(text),
    }
}

/// Bot API client bound to one token and pipeline.
pub struct TelegramBot {
    client: Client,
    base_url: Url,
    pipeline: ComicPipeline,
    offset: i64,
    poll_timeout: u64,
}

impl TelegramBot {
    /// `api_url` is the Bot API root, e.g. `https://api.telegram.org`.
    pub fn new(api_url: &str, token: &str, pipeline: ComicPipeline) -> Result<Self, ComicError> {
        let base_url = Url::parse(&format!("{}/bot{}/", api_url.trim_end_matches('/'), token))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(TELEGRAM_POLL_TIMEOUT_SECONDS + 30))
            .build()?;
        Ok(Self {
            client,
            base_url,
            pipeline,
            offset: 0,
            poll_timeout: TELEGRAM_POLL_TIMEOUT_SECONDS,
        })
    }

    /// Overrides the long-poll timeout.
    pub fn with_poll_timeout(mut self, seconds: u64) -> Self {
        self.poll_timeout = seconds;
        self
    }

    async fn parse<T: DeserializeOwned>(
        method: &str,
        response: reqwest::Response,
    ) -> Result<T, ComicError> {
        let status = response.status();
        let body: ApiResponse<T> = response.json().await?;
        match body.result {
            Some(result) if body.ok => Ok(result),
            _ => Err(ComicError::RemoteCall(format!(
                "{method} returned {status}: {}",
                body.description.unwrap_or_default()
            ))),
        }
    }

    async fn call<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<T, ComicError> {
        let url = self.base_url.join(method)?;
        let response = self.client.post(url).json(body).send().await?;
        Self::parse(method, response).await
    }

    /// Fetches pending updates and moves the offset past them.
    pub async fn get_updates(&mut self) -> Result<Vec<Update>, ComicError> {
        let updates: Vec<Update> = self
            .call(
                "getUpdates",
                &GetUpdates {
                    offset: self.offset,
                    timeout: self.poll_timeout,
                    allowed_updates: &["message"],
                },
            )
            .await?;
        if let Some(last) = updates.iter().map(|update| update.update_id).max() {
            self.offset = last + 1;
        }
        Ok(updates)
    }

    /// Replies to `message` with `text`.
    pub async fn reply_to(&self, message: &Message, text: &str) -> Result<(), ComicError> {
        let _: serde_json::Value = self
            .call(
                "sendMessage",
                &json!({
                    "chat_id": message.chat.id,
                    "text": text,
                    "reply_parameters": {"message_id": message.message_id},
                }),
            )
            .await?;
        Ok(())
    }

    /// Uploads the image at `path` to `chat_id`.
    pub async fn send_photo(&self, chat_id: i64, path: &Path) -> Result<(), ComicError> {
        let bytes = tokio::fs::read(path).await?;
        let part = Part::bytes(bytes)
            .file_name(COMIC_FILE_NAME)
            .mime_str("image/png")?;
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("photo", part);
        let url = self.base_url.join("sendPhoto")?;
        let response = self.client.post(url).multipart(form).send().await?;
        let _: serde_json::Value = Self::parse("sendPhoto", response).await?;
        Ok(())
    }

    async fn draw_and_send(&self, message: &Message, text: &str) -> Result<(), ComicError> {
        match self.pipeline.generate_comic(text).await {
            Ok(comic) => self.send_photo(message.chat.id, &comic.path).await,
            Err(err) if err.is_generation_failure() => {
                warn!("No comic for chat {}: {}", message.chat.id, err);
                self.reply_to(message, BOT_FAILURE_MESSAGE).await
            }
            Err(err) => Err(err),
        }
    }

    /// Answers one message.
    pub async fn handle_message(&self, message: &Message) -> Result<(), ComicError> {
        match classify(message.text.as_deref()) {
            Request::Ignore => {
                debug!("Ignoring message {} without text", message.message_id);
                Ok(())
            }
            Request::Welcome => self.reply_to(message, BOT_WELCOME_MESSAGE).await,
            Request::Comic(text) => {
                info!("Comic requested in chat {}", message.chat.id);
                if let Err(err) = self.draw_and_send(message, text).await {
                    error!("Error processing message: {}", err);
                    self.reply_to(message, BOT_ERROR_MESSAGE).await?;
                }
                Ok(())
            }
        }
    }

    /// One poll and every update it returned. Returns how many were handled.
    pub async fn poll_once(&mut self) -> Result<usize, ComicError> {
        let updates = self.get_updates().await?;
        for update in &updates {
            if let Some(message) = &update.message
                && let Err(err) = self.handle_message(message).await
            {
                error!("Failed to answer update {}: {}", update.update_id, err);
            }
        }
        Ok(updates.len())
    }
}

/// Polls until Ctrl-C.
pub async fn run(api_url: &str, token: &str, pipeline: ComicPipeline) -> Result<(), anyhow::Error> {
    let mut bot = TelegramBot::new(api_url, token, pipeline)?;
    info!("Starting Telegram bot...");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, stopping bot");
                break;
            }
            result = bot.poll_once() => {
                if let Err(err) = result {
                    error!("Polling failed: {}", err);
                    tokio::time::sleep(Duration::from_secs(TELEGRAM_POLL_BACKOFF_SECONDS)).await;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use image::{DynamicImage, RgbImage};
    use wiremock::matchers::{body_partial_json, header_regex, method, path};
    use wiremock::{Match, Mock, MockServer, ResponseTemplate};

    use crate::pipeline::CaptionFont;
    use crate::services::{
        ChatCapability, CompletionSettings, ImageSynthesizer, SynthesisRequest,
    };

    struct OneFrame;

    #[async_trait]
    impl ChatCapability for OneFrame {
        async fn authenticate(&self) -> Result<String, ComicError> {
            Ok("token".to_string())
        }

        async fn complete(
            &self,
            _token: &str,
            _prompt: &str,
            _settings: &CompletionSettings,
        ) -> Result<String, ComicError> {
            Ok("Frame 1: A cat.".to_string())
        }
    }

    struct Blank;

    #[async_trait]
    impl ImageSynthesizer for Blank {
        async fn synthesize(
            &self,
            request: &SynthesisRequest,
        ) -> Result<DynamicImage, ComicError> {
            Ok(DynamicImage::ImageRgb8(RgbImage::new(
                request.width,
                request.height,
            )))
        }
    }

    fn bot(
        server: &MockServer,
        dir: &tempfile::TempDir,
        synthesizer: Option<Arc<dyn ImageSynthesizer>>,
    ) -> TelegramBot {
        let pipeline = ComicPipeline::new(
            Arc::new(OneFrame),
            synthesizer,
            CaptionFont::system_default(),
            dir.path().to_path_buf(),
        );
        TelegramBot::new(&server.uri(), "TOKEN", pipeline)
            .expect("bot")
            .with_poll_timeout(0)
    }

    fn message(text: Option<&str>) -> Message {
        Message {
            message_id: 7,
            chat: Chat { id: 42 },
            text: text.map(str::to_string),
        }
    }

    /// Byte search over the raw body; multipart uploads aren't valid UTF-8.
    struct BodyBytesContain(&'static [u8]);

    impl Match for BodyBytesContain {
        fn matches(&self, request: &wiremock::Request) -> bool {
            request
                .body
                .windows(self.0.len())
                .any(|window| window == self.0)
        }
    }

    fn ok(result: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": result}))
    }

    #[test]
    fn commands_and_text() {
        assert_eq!(classify(Some("/start")), Request::Welcome);
        assert_eq!(classify(Some("/help@comic_bot")), Request::Welcome);
        assert_eq!(classify(Some("A cat.")), Request::Comic("A cat."));
        assert_eq!(classify(Some("  ")), Request::Ignore);
        assert_eq!(classify(None), Request::Ignore);
    }

    #[tokio::test]
    async fn start_gets_the_welcome() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .and(body_partial_json(json!({
                "chat_id": 42,
                "text": BOT_WELCOME_MESSAGE,
                "reply_parameters": {"message_id": 7}
            })))
            .respond_with(ok(json!({"message_id": 8})))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        bot(&server, &dir, None)
            .handle_message(&message(Some("/start")))
            .await
            .expect("handled");
    }

    #[tokio::test]
    async fn text_gets_a_photo() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendPhoto"))
            .and(header_regex("content-type", "^multipart/form-data"))
            .and(BodyBytesContain(b"filename=\"comic.png\""))
            .and(BodyBytesContain(b"name=\"chat_id\""))
            .respond_with(ok(json!({"message_id": 9})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .respond_with(ok(json!({"message_id": 10})))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        bot(&server, &dir, Some(Arc::new(Blank)))
            .handle_message(&message(Some("A cat sits on a roof.")))
            .await
            .expect("handled");
    }

    #[tokio::test]
    async fn failed_comic_gets_the_failure_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .and(body_partial_json(json!({"text": BOT_FAILURE_MESSAGE})))
            .respond_with(ok(json!({"message_id": 8})))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        bot(&server, &dir, None)
            .handle_message(&message(Some("A cat sits on a roof.")))
            .await
            .expect("handled");
    }

    #[tokio::test]
    async fn upload_failure_gets_the_error_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendPhoto"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"ok": false, "description": "Bad Request: file too big"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .and(body_partial_json(json!({"text": BOT_ERROR_MESSAGE})))
            .respond_with(ok(json!({"message_id": 8})))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        bot(&server, &dir, Some(Arc::new(Blank)))
            .handle_message(&message(Some("A cat.")))
            .await
            .expect("handled");
    }

    #[tokio::test]
    async fn poll_advances_the_offset() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/getUpdates"))
            .and(body_partial_json(json!({"offset": 0})))
            .respond_with(ok(json!([
                {"update_id": 100, "message": {"message_id": 1, "chat": {"id": 42}, "text": "/help"}},
                {"update_id": 101, "edited_message": {"message_id": 1, "chat": {"id": 42}}}
            ])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/getUpdates"))
            .and(body_partial_json(json!({"offset": 102})))
            .respond_with(ok(json!([])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .respond_with(ok(json!({"message_id": 2})))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let mut bot = bot(&server, &dir, None);
        assert_eq!(bot.poll_once().await.expect("first poll"), 2);
        assert_eq!(bot.poll_once().await.expect("second poll"), 0);
    }

    #[tokio::test]
    async fn api_errors_surface() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/getUpdates"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({"ok": false, "description": "Unauthorized"})),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let err = bot(&server, &dir, None)
            .poll_once()
            .await
            .expect_err("should fail");
        assert!(matches!(err, ComicError::RemoteCall(ref msg) if msg.contains("Unauthorized")));
    }
}
