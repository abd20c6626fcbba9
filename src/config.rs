//! Config handling

use std::sync::Arc;

use tracing::log::LevelFilter;
use tracing::{error, info, warn};
use url::Url;

use crate::cli::CliOptions;
use crate::error::ComicError;
use crate::pipeline::{CaptionFont, ComicPipeline};
use crate::services::{
    ChatSettings, CompletionSettings, DiffusionSettings, GigaChatClient, ImageSynthesizer,
    StableDiffusionClient,
};

/// Sets up logging based on the debug flag
pub fn setup_logging(debug: bool) -> Result<(), Box<std::io::Error>> {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut logger = simple_logger::SimpleLogger::new().with_level(level);
    if !debug {
        logger = logger
            .with_module_level("tracing", LevelFilter::Warn)
            .with_module_level("rustls", LevelFilter::Info)
            .with_module_level("hyper_util", LevelFilter::Info)
            .with_module_level("h2", LevelFilter::Info)
            .with_module_level("reqwest", LevelFilter::Info)
            .with_module_level("usvg", LevelFilter::Warn);
    }
    logger.init().map_err(|err| {
        eprintln!("Failed to initialize logger: {}", err);
        Box::new(std::io::Error::other(err))
    })
}

impl CliOptions {
    /// Chat endpoint settings from the command line and environment.
    pub fn chat_settings(&self) -> Result<ChatSettings, ComicError> {
        Ok(ChatSettings {
            credentials: self
                .chat
                .gigachat_credentials
                .clone()
                .filter(|creds| !creds.trim().is_empty()),
            auth_url: Url::parse(&self.chat.gigachat_auth_url)?,
            api_url: Url::parse(&self.chat.gigachat_api_url)?,
            scope: self.chat.gigachat_scope.clone(),
            accept_invalid_certs: self.chat.gigachat_insecure_tls,
        })
    }

    /// Model and sampling for scenario completions.
    pub fn completion_settings(&self) -> CompletionSettings {
        CompletionSettings {
            model: self.chat.gigachat_model.clone(),
            ..CompletionSettings::default()
        }
    }

    /// Diffusion server settings.
    pub fn diffusion_settings(&self) -> Result<DiffusionSettings, ComicError> {
        DiffusionSettings::new(
            &self.diffusion.diffusion_url,
            &self.diffusion.diffusion_model,
        )
    }
}

/// Loads everything a run needs, once, at startup.
///
/// A diffusion server that can't be reached is logged and the pipeline is
/// built without one, so the front ends still come up.
pub async fn build_pipeline(cli: &CliOptions) -> Result<ComicPipeline, ComicError> {
    let chat_settings = cli.chat_settings()?;
    if chat_settings.credentials.is_none() {
        warn!("GIGACHAT_CREDENTIALS is not set, every scenario will use the fallback text");
    }
    let chat = GigaChatClient::new(chat_settings)?;

    let synthesizer: Option<Arc<dyn ImageSynthesizer>> =
        match StableDiffusionClient::load(&cli.diffusion_settings()?).await {
            Ok(client) => {
                info!("Panels will be drawn with {}", client.checkpoint());
                Some(Arc::new(client))
            }
            Err(err) => {
                error!("Error loading Stable Diffusion pipeline: {}", err);
                None
            }
        };

    let font = CaptionFont::load(&cli.font_path);
    info!("Intermediate images go to {}", cli.temp_dir.display());

    Ok(ComicPipeline::new(
        Arc::new(chat),
        synthesizer,
        font,
        cli.temp_dir.clone(),
    )
    .with_completion(cli.completion_settings())
    .with_seed(cli.diffusion.seed))
}
