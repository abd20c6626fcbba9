//! CLI parser
use clap::{Args, Parser, Subcommand};
use std::num::NonZeroU16;
use std::path::PathBuf;

use anyhow::Context;
use tracing::info;

use crate::pipeline::ComicPipeline;

use crate::constants::{
    DEFAULT_DIFFUSION_MODEL, DEFAULT_DIFFUSION_URL, DEFAULT_FONT_PATH, DEFAULT_TEMP_IMAGE_DIR,
    GIGACHAT_API_URL, GIGACHAT_AUTH_URL, GIGACHAT_MODEL, GIGACHAT_SCOPE, TELEGRAM_API_URL,
};

#[derive(Parser, Debug)]
#[command(name = "comicstrip")]
#[command(about = "Turn a piece of text into a four-panel comic strip")]
/// CLI Options
pub struct CliOptions {
    #[clap(long, global = true, help = "Enable debug logging", env = "COMICSTRIP_DEBUG")]
    /// Enable debug logging. Env: COMICSTRIP_DEBUG
    pub debug: bool,

    #[clap(long, global = true, default_value = DEFAULT_TEMP_IMAGE_DIR, env = "COMICSTRIP_TEMP_DIR")]
    /// Where panels and the finished strip are written, defaults to `temp_images`.
    /// Env: COMICSTRIP_TEMP_DIR
    pub temp_dir: PathBuf,

    #[clap(long, global = true, default_value = DEFAULT_FONT_PATH, env = "COMICSTRIP_FONT_PATH")]
    /// Caption font file; the system sans-serif face is used when it can't be loaded.
    /// Env: COMICSTRIP_FONT_PATH
    pub font_path: PathBuf,

    #[clap(flatten)]
    /// Chat service settings
    pub chat: ChatOptions,

    #[clap(flatten)]
    /// Diffusion server settings
    pub diffusion: DiffusionOptions,

    #[clap(subcommand)]
    /// What to run
    pub command: Command,
}

/// Settings for the scenario chat service
#[derive(Args, Debug, Clone)]
pub struct ChatOptions {
    #[clap(long, global = true, env = "GIGACHAT_CREDENTIALS", hide_env_values = true)]
    /// Client ID and secret, base64 encoded. Env: GIGACHAT_CREDENTIALS
    pub gigachat_credentials: Option<String>,

    #[clap(long, global = true, default_value = GIGACHAT_AUTH_URL, env = "GIGACHAT_AUTH_URL")]
    /// OAuth token endpoint. Env: GIGACHAT_AUTH_URL
    pub gigachat_auth_url: String,

    #[clap(long, global = true, default_value = GIGACHAT_API_URL, env = "GIGACHAT_API_URL")]
    /// Chat completions endpoint. Env: GIGACHAT_API_URL
    pub gigachat_api_url: String,

    #[clap(long, global = true, default_value = GIGACHAT_MODEL, env = "GIGACHAT_MODEL")]
    /// Model name sent with each completion. Env: GIGACHAT_MODEL
    pub gigachat_model: String,

    #[clap(long, global = true, default_value = GIGACHAT_SCOPE, env = "GIGACHAT_SCOPE")]
    /// OAuth scope. Env: GIGACHAT_SCOPE
    pub gigachat_scope: String,

    #[clap(long, global = true, env = "GIGACHAT_INSECURE_TLS")]
    /// Skip TLS certificate checks against the chat service. Env: GIGACHAT_INSECURE_TLS
    pub gigachat_insecure_tls: bool,
}

/// Settings for the Stable Diffusion server
#[derive(Args, Debug, Clone)]
pub struct DiffusionOptions {
    #[clap(long, global = true, default_value = DEFAULT_DIFFUSION_URL, env = "COMICSTRIP_DIFFUSION_URL")]
    /// Base URL of the Stable Diffusion web UI API. Env: COMICSTRIP_DIFFUSION_URL
    pub diffusion_url: String,

    #[clap(long, global = true, default_value = DEFAULT_DIFFUSION_MODEL, env = "COMICSTRIP_DIFFUSION_MODEL")]
    /// Pretrained checkpoint to load at startup. Env: COMICSTRIP_DIFFUSION_MODEL
    pub diffusion_model: String,

    #[clap(long, global = true, env = "COMICSTRIP_SEED")]
    /// Fixed sampling seed, random when unset. Env: COMICSTRIP_SEED
    pub seed: Option<i64>,
}

/// Front ends
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve the web form
    Serve {
        #[clap(long, short, default_value = "5000", env = "COMICSTRIP_PORT")]
        /// http listener, defaults to `5000`.
        /// Env: COMICSTRIP_PORT
        port: NonZeroU16,
        #[clap(
            long,
            short,
            default_value = "127.0.0.1",
            env = "COMICSTRIP_LISTEN_ADDRESS"
        )]
        /// Listen address, defaults to `127.0.0.1`.
        /// Env: COMICSTRIP_LISTEN_ADDRESS
        listen_address: String,
    },
    /// Run the Telegram bot
    Bot {
        #[clap(long, env = "BOT_TOKEN", hide_env_values = true)]
        /// Telegram bot token. Env: BOT_TOKEN
        bot_token: String,
        #[clap(long, default_value = TELEGRAM_API_URL, env = "COMICSTRIP_TELEGRAM_API_URL")]
        /// Telegram Bot API base URL. Env: COMICSTRIP_TELEGRAM_API_URL
        telegram_api_url: String,
    },
    /// Make one comic and print where it was saved
    Generate {
        #[clap(long, short, conflicts_with = "file")]
        /// Input text
        text: Option<String>,
        #[clap(long, short)]
        /// Read the input text from this file
        file: Option<PathBuf>,
    },
}

/// Runs the pipeline once and prints where the strip was saved.
pub async fn generate_once(
    text: Option<String>,
    file: Option<PathBuf>,
    pipeline: &ComicPipeline,
) -> Result<(), anyhow::Error> {
    let text = match (text, file) {
        (Some(text), _) => text,
        (None, Some(path)) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?,
        (None, None) => anyhow::bail!("nothing to draw, pass --text or --file"),
    };
    let comic = pipeline.generate_comic(&text).await?;
    info!(
        "Drew {} of {} panels",
        comic.drawn_panels(),
        comic.panels.len()
    );
    println!("{}", comic.path.display());
    Ok(())
}
