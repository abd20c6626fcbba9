//! Text-to-image capability, bound to a Stable Diffusion web UI server.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose;
use image::DynamicImage;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use url::Url;

use crate::constants::{GUIDANCE_SCALE, INFERENCE_STEPS, PANEL_SIZE};
use crate::error::ComicError;

/// Everything the synthesizer needs for one image.
#[derive(Clone, Debug, PartialEq)]
pub struct SynthesisRequest {
    /// Full text prompt
    pub prompt: String,
    /// Sampling steps
    pub steps: u32,
    /// Classifier-free guidance scale
    pub guidance_scale: f32,
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
    /// Fixed seed, `None` for a random one
    pub seed: Option<i64>,
}

impl SynthesisRequest {
    /// A panel request with the fixed comic parameters.
    pub fn panel(prompt: String, seed: Option<i64>) -> Self {
        Self {
            prompt,
            steps: INFERENCE_STEPS,
            guidance_scale: GUIDANCE_SCALE,
            width: PANEL_SIZE,
            height: PANEL_SIZE,
            seed,
        }
    }
}

/// Something that can paint a picture from a prompt.
#[async_trait]
pub trait ImageSynthesizer: Send + Sync {
    /// Produces one image for the request.
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<DynamicImage, ComicError>;
}

/// Where the diffusion server lives and which checkpoint it should run.
#[derive(Clone, Debug)]
pub struct DiffusionSettings {
    /// Server root, always ending in `/`
    pub base_url: Url,
    /// Pretrained model identifier, e.g. `stabilityai/stable-diffusion-2-1`
    pub model: String,
}

impl DiffusionSettings {
    /// Parses the base URL, making sure relative joins land under it.
    pub fn new(base_url: &str, model: &str) -> Result<Self, ComicError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            base_url,
            model: model.to_string(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SdModel {
    title: String,
    model_name: String,
}

#[derive(Debug, Serialize)]
struct Txt2ImgRequest<'a> {
    prompt: &'a str,
    steps: u32,
    cfg_scale: f32,
    width: u32,
    height: u32,
    seed: i64,
    batch_size: u8,
    n_iter: u8,
}

#[derive(Debug, Deserialize)]
struct Txt2ImgResponse {
    #[serde(default)]
    images: Vec<String>,
}

/// A Stable Diffusion web UI (`/sdapi/v1`) with a checkpoint loaded.
#[derive(Clone, Debug)]
pub struct StableDiffusionClient {
    client: Client,
    base_url: Url,
    checkpoint: String,
}

impl StableDiffusionClient {
    /// Connects to the server and switches it to the configured checkpoint.
    ///
    /// Called once at process start; an error here means the pipeline runs
    /// without a synthesizer.
    pub async fn load(settings: &DiffusionSettings) -> Result<Self, ComicError> {
        let client = Client::new();
        let models_url = settings.base_url.join("sdapi/v1/sd-models")?;
        let response = client.get(models_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ComicError::RemoteCall(format!(
                "listing checkpoints returned {status}"
            )));
        }
        let models: Vec<SdModel> = response.json().await?;
        debug!("Diffusion server offers {} checkpoints", models.len());

        let selected = select_checkpoint(&models, &settings.model).ok_or_else(|| {
            ComicError::RemoteCall(format!(
                "checkpoint {} is not available on the diffusion server",
                settings.model
            ))
        })?;

        let options_url = settings.base_url.join("sdapi/v1/options")?;
        let response = client
            .post(options_url)
            .json(&json!({ "sd_model_checkpoint": selected.title }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ComicError::RemoteCall(format!(
                "switching checkpoint returned {status}"
            )));
        }

        info!(
            "Stable Diffusion pipeline successfully loaded: {} at {}",
            selected.title, settings.base_url
        );
        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            checkpoint: selected.title.clone(),
        })
    }

    /// Title of the loaded checkpoint.
    pub fn checkpoint(&self) -> &str {
        &self.checkpoint
    }
}

#[async_trait]
impl ImageSynthesizer for StableDiffusionClient {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<DynamicImage, ComicError> {
        let body = Txt2ImgRequest {
            prompt: &request.prompt,
            steps: request.steps,
            cfg_scale: request.guidance_scale,
            width: request.width,
            height: request.height,
            seed: request.seed.unwrap_or(-1),
            batch_size: 1,
            n_iter: 1,
        };
        let url = self.base_url.join("sdapi/v1/txt2img")?;
        let response = self.client.post(url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ComicError::RemoteCall(format!(
                "txt2img returned {status}: {text}"
            )));
        }

        let parsed: Txt2ImgResponse = response.json().await?;
        let encoded = parsed
            .images
            .first()
            .ok_or_else(|| ComicError::RemoteCall("txt2img returned no images".to_string()))?;
        let bytes = decode_base64_image(encoded)?;
        Ok(image::load_from_memory(&bytes)?)
    }
}

/// Strips an optional `data:` URL prefix before decoding.
fn decode_base64_image(encoded: &str) -> Result<Vec<u8>, ComicError> {
    let data = match encoded.find(',') {
        Some(idx) => &encoded[idx + 1..],
        None => encoded,
    };
    Ok(general_purpose::STANDARD.decode(data)?)
}

/// Matches a pretrained identifier against the server's checkpoint list.
///
/// Hub-style identifiers (`org/name`) match on the last segment, ignoring
/// case and `-`/`_` differences.
fn select_checkpoint<'a>(models: &'a [SdModel], wanted: &str) -> Option<&'a SdModel> {
    let normalize = |value: &str| value.to_ascii_lowercase().replace(['-', '_', '.'], "");
    let wanted_name = wanted.rsplit('/').next().unwrap_or(wanted);
    let wanted_norm = normalize(wanted_name);
    if wanted_norm.is_empty() {
        return None;
    }

    models
        .iter()
        .find(|model| model.title == wanted || model.model_name == wanted)
        .or_else(|| {
            models.iter().find(|model| {
                normalize(&model.model_name).contains(&wanted_norm)
                    || normalize(&model.title).contains(&wanted_norm)
            })
        })
}
