//! Shared constants/setters for things
//!

/// The default place we put intermediate and final images
pub const DEFAULT_TEMP_IMAGE_DIR: &str = "temp_images";

/// File name of the assembled strip inside the temp image dir
pub const COMIC_FILE_NAME: &str = "comic.png";

/// Panels in a scenario are separated by this word.
pub const PANEL_MARKER: &str = "Frame";

/// Hard limit on panels per comic.
pub const MAX_PANELS: usize = 4;

/// Only the first scene of the input is ever drawn.
pub const SCENE_INDEX: usize = 0;

/// What we draw when the chat service can't give us a scenario.
pub const FALLBACK_SCENARIO: &str = "Failed to generate scene description.";

/// Width and height of a rendered panel, in pixels.
pub const PANEL_SIZE: u32 = 512;

/// Diffusion sampling steps per panel.
pub const INFERENCE_STEPS: u32 = 40;

/// Classifier-free guidance scale per panel.
pub const GUIDANCE_SCALE: f32 = 7.5;

/// Caption font size, in pixels.
pub const CAPTION_FONT_SIZE: f32 = 30.0;

/// Gap between the caption and the bottom-left corner of the panel.
pub const CAPTION_MARGIN: f32 = 10.0;

/// How far the caption shadow is pushed right and down.
pub const CAPTION_SHADOW_OFFSET: (f32, f32) = (2.0, 2.0);

/// Shadow alpha, 128 out of 255.
pub const CAPTION_SHADOW_OPACITY: f32 = 128.0 / 255.0;

/// Font file tried first for captions.
pub const DEFAULT_FONT_PATH: &str = "arial.ttf";

/// GigaChat OAuth endpoint.
pub const GIGACHAT_AUTH_URL: &str = "https://ngw.devices.sberbank.ru:9443/api/v2/oauth";

/// GigaChat chat completions endpoint.
pub const GIGACHAT_API_URL: &str = "https://gigachat.devices.sberbank.ru/api/v1/chat/completions";

/// GigaChat model used for scenarios.
pub const GIGACHAT_MODEL: &str = "GigaChat";

/// OAuth scope requested for personal API access.
pub const GIGACHAT_SCOPE: &str = "GIGACHAT_API_PERS";

/// Sampling temperature for scenario generation.
pub const CHAT_TEMPERATURE: f32 = 0.7;

/// Token ceiling for one scenario.
pub const CHAT_MAX_TOKENS: u32 = 1024;

/// Stable Diffusion web UI listening address.
pub const DEFAULT_DIFFUSION_URL: &str = "http://127.0.0.1:7860/";

/// Checkpoint requested from the diffusion server at startup.
pub const DEFAULT_DIFFUSION_MODEL: &str = "stabilityai/stable-diffusion-2-1";

/// Telegram Bot API base.
pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Long-poll timeout passed to `getUpdates`.
pub const TELEGRAM_POLL_TIMEOUT_SECONDS: u64 = 30;

/// Pause after a failed poll before trying again.
pub const TELEGRAM_POLL_BACKOFF_SECONDS: u64 = 5;

/// Reply to `/start` and `/help`.
pub const BOT_WELCOME_MESSAGE: &str = "Hello! Send me some text, and I will make a comic out of it.";

/// Reply when the pipeline produced nothing.
pub const BOT_FAILURE_MESSAGE: &str = "Failed to generate the comic.";

/// Reply when something unexpected broke.
pub const BOT_ERROR_MESSAGE: &str = "An error occurred while processing your request.";

/// Shown on the web error page when the pipeline fails.
pub const WEB_FAILURE_MESSAGE: &str = "Failed to generate comic.";
