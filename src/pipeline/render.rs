//! Per-panel image synthesis.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info};

use super::panels::Panel;
use super::temp_files::TempFiles;
use crate::error::ComicError;
use crate::services::{ImageSynthesizer, SynthesisRequest};

/// What happened to one panel.
#[derive(Clone, Debug, PartialEq)]
pub enum PanelOutcome {
    /// Drawn and captioned
    Rendered {
        /// Panel position
        index: usize,
        /// Captioned image
        path: PathBuf,
    },
    /// Drawn, but the caption couldn't be added so the bare image is used
    CaptionFallback {
        /// Panel position
        index: usize,
        /// Uncaptioned image
        path: PathBuf,
        /// Why captioning failed
        reason: String,
    },
    /// Not drawn; the strip goes on without it
    Skipped {
        /// Panel position
        index: usize,
        /// Why synthesis failed
        reason: String,
    },
}

impl PanelOutcome {
    /// Panel position.
    pub fn index(&self) -> usize {
        match self {
            PanelOutcome::Rendered { index, .. }
            | PanelOutcome::CaptionFallback { index, .. }
            | PanelOutcome::Skipped { index, .. } => *index,
        }
    }

    /// The image that goes into the strip, if there is one.
    pub fn image_path(&self) -> Option<&Path> {
        match self {
            PanelOutcome::Rendered { path, .. } | PanelOutcome::CaptionFallback { path, .. } => {
                Some(path)
            }
            PanelOutcome::Skipped { .. } => None,
        }
    }
}

/// The image prompt for a panel's text.
pub fn panel_prompt(caption: &str) -> String {
    format!("comic: {caption}, bright colors, anime")
}

/// Path of the raw panel image.
pub fn rendered_path(temp_dir: &Path, scene_index: usize, panel_index: usize) -> PathBuf {
    temp_dir.join(format!("scene_{scene_index}_panel_{panel_index}.png"))
}

/// Path of the captioned panel image.
pub fn captioned_path(temp_dir: &Path, scene_index: usize, panel_index: usize) -> PathBuf {
    temp_dir.join(format!("scene_{scene_index}_panel_{panel_index}_with_text.png"))
}

/// Draws panels with whichever synthesizer was loaded at startup.
#[derive(Clone)]
pub struct PanelRenderer {
    synthesizer: Option<Arc<dyn ImageSynthesizer>>,
    temp_dir: PathBuf,
    seed: Option<i64>,
}

impl PanelRenderer {
    /// `synthesizer` is `None` when loading failed; every render then fails.
    pub fn new(
        synthesizer: Option<Arc<dyn ImageSynthesizer>>,
        temp_dir: PathBuf,
        seed: Option<i64>,
    ) -> Self {
        Self {
            synthesizer,
            temp_dir,
            seed,
        }
    }

    /// Same renderer with a different seed.
    pub fn with_seed(mut self, seed: Option<i64>) -> Self {
        self.seed = seed;
        self
    }

    /// True if there's a synthesizer to render with.
    pub fn is_loaded(&self) -> bool {
        self.synthesizer.is_some()
    }

    /// Where intermediate images go.
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Synthesizes and saves one panel, tracking the file in `temp_files`.
    pub async fn render(
        &self,
        scene_index: usize,
        panel: &Panel,
        temp_files: &mut TempFiles,
    ) -> Result<PathBuf, ComicError> {
        let Some(synthesizer) = self.synthesizer.as_deref() else {
            error!("Stable Diffusion pipeline is not loaded!");
            return Err(ComicError::SynthesizerUnavailable);
        };

        let prompt = panel_prompt(&panel.caption);
        info!(
            "Generating image for frame {}, scene {}: {}",
            panel.index + 1,
            scene_index + 1,
            prompt
        );
        let request = SynthesisRequest::panel(prompt, self.seed);
        let image = synthesizer.synthesize(&request).await?;

        let path = rendered_path(&self.temp_dir, scene_index, panel.index);
        temp_files.track(&path);
        image.save(&path)?;
        Ok(path)
    }
}
