//! The comic-assembly pipeline: text in, one strip image out.
//!
//! `split → first scene → scenario → ≤4 panels → render + caption each →
//! assemble`, with every intermediate file removed when the run ends.

pub mod overlay;
pub mod panels;
pub mod render;
pub mod scenario;
pub mod scenes;
pub mod strip;
pub mod temp_files;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::constants::{COMIC_FILE_NAME, FALLBACK_SCENARIO, SCENE_INDEX};
use crate::error::ComicError;
use crate::services::{ChatCapability, CompletionSettings, ImageSynthesizer};

pub use overlay::CaptionFont;
pub use panels::{Panel, split_into_panels};
pub use render::{PanelOutcome, PanelRenderer};
pub use scenes::split_into_scenes;
pub use strip::StripSize;
pub use temp_files::TempFiles;

/// A finished comic.
#[derive(Clone, Debug, PartialEq)]
pub struct ComicStrip {
    /// Where the strip image was saved
    pub path: PathBuf,
    /// Strip width in pixels
    pub width: u32,
    /// Strip height in pixels
    pub height: u32,
    /// What happened to each panel, in order. The panel files themselves are
    /// gone by the time this is returned.
    pub panels: Vec<PanelOutcome>,
}

impl ComicStrip {
    /// Panels that made it into the strip.
    pub fn drawn_panels(&self) -> usize {
        self.panels
            .iter()
            .filter(|outcome| outcome.image_path().is_some())
            .count()
    }
}

/// Runs the whole text-to-comic sequence with the services it was built with.
#[derive(Clone)]
pub struct ComicPipeline {
    chat: Arc<dyn ChatCapability>,
    completion: CompletionSettings,
    renderer: PanelRenderer,
    font: CaptionFont,
}

impl ComicPipeline {
    /// `synthesizer` is `None` if it failed to load; runs then end with no images.
    pub fn new(
        chat: Arc<dyn ChatCapability>,
        synthesizer: Option<Arc<dyn ImageSynthesizer>>,
        font: CaptionFont,
        temp_dir: PathBuf,
    ) -> Self {
        Self {
            chat,
            completion: CompletionSettings::default(),
            renderer: PanelRenderer::new(synthesizer, temp_dir, None),
            font,
        }
    }

    /// Overrides the chat model and sampling settings.
    pub fn with_completion(mut self, completion: CompletionSettings) -> Self {
        self.completion = completion;
        self
    }

    /// Pins the image seed so reruns draw the same pictures.
    pub fn with_seed(mut self, seed: Option<i64>) -> Self {
        self.renderer = self.renderer.with_seed(seed);
        self
    }

    /// False if no image synthesizer was loaded at startup.
    pub fn can_draw(&self) -> bool {
        self.renderer.is_loaded()
    }

    /// Directory the strip and intermediates are written to.
    pub fn temp_dir(&self) -> &Path {
        self.renderer.temp_dir()
    }

    /// Turns `text` into a comic strip.
    ///
    /// Only the first scene is drawn, with at most four panels. Panels that
    /// fail to render are left out; the run fails only if none render or the
    /// strip can't be put together.
    #[instrument(skip_all, fields(text_len = text.len()))]
    pub async fn generate_comic(&self, text: &str) -> Result<ComicStrip, ComicError> {
        info!("Received text from user: {}", text);

        let scenes = split_into_scenes(text);
        info!("Text split into {} scenes.", scenes.len());
        let Some(scene) = scenes.first() else {
            warn!("No scenes to draw");
            return Err(ComicError::EmptyResult("no scenes in input".to_string()));
        };

        info!("Generating scenario for scene {}: {}", SCENE_INDEX + 1, scene);
        let scenario =
            match scenario::generate_scenario(self.chat.as_ref(), &self.completion, scene).await {
                Ok(scenario) => {
                    info!("Scenario for scene {} successfully generated.", SCENE_INDEX + 1);
                    scenario
                }
                Err(err) => {
                    error!(
                        "Failed to generate scenario for scene {}: {}",
                        SCENE_INDEX + 1,
                        err
                    );
                    FALLBACK_SCENARIO.to_string()
                }
            };

        let panels = split_into_panels(&scenario);
        info!("Scenario split into {} panels", panels.len());

        let mut temp_files = TempFiles::new();
        let mut outcomes = Vec::with_capacity(panels.len());
        for panel in &panels {
            outcomes.push(self.produce_panel(panel, &mut temp_files).await);
        }

        let images: Vec<&Path> = outcomes
            .iter()
            .filter_map(PanelOutcome::image_path)
            .collect();
        if images.is_empty() {
            warn!("No images were generated!");
            return Err(ComicError::EmptyResult("no images generated".to_string()));
        }

        let output = self.temp_dir().join(COMIC_FILE_NAME);
        let size = strip::assemble_strip(&images, &output)?;
        info!(
            "Comic assembled from {} of {} panels: {}",
            images.len(),
            panels.len(),
            output.display()
        );

        Ok(ComicStrip {
            path: output,
            width: size.width,
            height: size.height,
            panels: outcomes,
        })
    }

    /// Renders then captions one panel. Never fails the run.
    async fn produce_panel(&self, panel: &Panel, temp_files: &mut TempFiles) -> PanelOutcome {
        let frame = panel.index + 1;
        let rendered = match self.renderer.render(SCENE_INDEX, panel, temp_files).await {
            Ok(path) => path,
            Err(err) => {
                warn!(
                    "Failed to generate image for frame {}, scene {}. Skipping frame: {}",
                    frame,
                    SCENE_INDEX + 1,
                    err
                );
                return PanelOutcome::Skipped {
                    index: panel.index,
                    reason: err.to_string(),
                };
            }
        };

        let captioned = render::captioned_path(self.temp_dir(), SCENE_INDEX, panel.index);
        temp_files.track(&captioned);
        match overlay::overlay_caption(&rendered, &panel.caption, &captioned, &self.font) {
            Ok(path) => {
                temp_files.release(&rendered);
                PanelOutcome::Rendered {
                    index: panel.index,
                    path,
                }
            }
            Err(err) => {
                warn!(
                    "Failed to add text to image, using the original image {}: {}",
                    rendered.display(),
                    err
                );
                temp_files.release(&captioned);
                PanelOutcome::CaptionFallback {
                    index: panel.index,
                    path: rendered,
                    reason: err.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::sync::Mutex;

    use crate::services::SynthesisRequest;

    struct ScriptedChat {
        reply: Result<String, ()>,
        scenes: Mutex<Vec<String>>,
    }

    impl ScriptedChat {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                scenes: Mutex::default(),
            })
        }

        fn broken() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(()),
                scenes: Mutex::default(),
            })
        }
    }

    #[async_trait]
    impl ChatCapability for ScriptedChat {
        async fn authenticate(&self) -> Result<String, ComicError> {
            match self.reply {
                Ok(_) => Ok("token".to_string()),
                Err(()) => Err(ComicError::Auth("401".to_string())),
            }
        }

        async fn complete(
            &self,
            _token: &str,
            prompt: &str,
            _settings: &CompletionSettings,
        ) -> Result<String, ComicError> {
            self.scenes
                .lock()
                .expect("lock")
                .push(prompt.to_string());
            self.reply
                .clone()
                .map_err(|()| ComicError::RemoteCall("down".to_string()))
        }
    }

    /// Paints a flat panel; fails for prompts containing `fail_on`.
    struct Painter {
        fail_on: Option<&'static str>,
        prompts: Mutex<Vec<String>>,
    }

    impl Painter {
        fn new(fail_on: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                fail_on,
                prompts: Mutex::default(),
            })
        }
    }

    #[async_trait]
    impl ImageSynthesizer for Painter {
        async fn synthesize(
            &self,
            request: &SynthesisRequest,
        ) -> Result<DynamicImage, ComicError> {
            self.prompts
                .lock()
                .expect("lock")
                .push(request.prompt.clone());
            if self
                .fail_on
                .is_some_and(|needle| request.prompt.contains(needle))
            {
                return Err(ComicError::RemoteCall("out of memory".to_string()));
            }
            Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(
                request.width,
                request.height,
                Rgb([90, 120, 200]),
            )))
        }
    }

    const SCRIPT: &str = "Frame 1: Cat on roof.\nFrame 2: Cat sees moon.\nFrame 3: Cat: Meow!\nFrame 4: Moon shrugs.";

    fn pipeline(
        chat: Arc<dyn ChatCapability>,
        painter: Option<Arc<dyn ImageSynthesizer>>,
        dir: &Path,
    ) -> ComicPipeline {
        ComicPipeline::new(chat, painter, CaptionFont::system_default(), dir.to_path_buf())
    }

    fn leftover_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .expect("read_dir")
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn four_panels_make_a_tall_strip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let chat = ScriptedChat::replying(SCRIPT);
        let painter = Painter::new(None);
        let comic = pipeline(chat.clone(), Some(painter.clone()), dir.path())
            .generate_comic("A cat sits on a roof. It looks at the moon.")
            .await
            .expect("comic");

        assert_eq!(comic.path, dir.path().join(COMIC_FILE_NAME));
        assert_eq!((comic.width, comic.height), (512, 2048));
        assert_eq!(comic.drawn_panels(), 4);
        assert_eq!(leftover_files(dir.path()), vec![COMIC_FILE_NAME.to_string()]);

        // only the first scene goes to the chat service
        let prompts = chat.scenes.lock().expect("lock");
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("A cat sits on a roof."));
        assert!(!prompts[0].contains("moon"));

        let drawn = painter.prompts.lock().expect("lock");
        assert_eq!(drawn[0], "comic: 1: Cat on roof., bright colors, anime");
    }

    #[tokio::test]
    async fn failed_panel_is_left_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        let comic = pipeline(
            ScriptedChat::replying(SCRIPT),
            Some(Painter::new(Some("Meow"))),
            dir.path(),
        )
        .generate_comic("A cat sits on a roof.")
        .await
        .expect("comic");

        assert_eq!(comic.height, 512 * 3);
        assert!(matches!(comic.panels[2], PanelOutcome::Skipped { index: 2, .. }));
        assert_eq!(
            comic.panels.iter().map(PanelOutcome::index).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
        assert_eq!(leftover_files(dir.path()), vec![COMIC_FILE_NAME.to_string()]);
    }

    #[tokio::test]
    async fn chat_failure_draws_the_fallback_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let painter = Painter::new(None);
        let comic = pipeline(ScriptedChat::broken(), Some(painter.clone()), dir.path())
            .generate_comic("A cat sits on a roof.")
            .await
            .expect("comic");

        assert_eq!((comic.width, comic.height), (512, 512));
        let drawn = painter.prompts.lock().expect("lock");
        assert_eq!(
            drawn.as_slice(),
            &[format!("comic: {FALLBACK_SCENARIO}, bright colors, anime")]
        );
    }

    #[tokio::test]
    async fn no_synthesizer_means_no_comic() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pipeline = pipeline(ScriptedChat::replying(SCRIPT), None, dir.path());
        assert!(!pipeline.can_draw());

        let result = pipeline.generate_comic("A cat sits on a roof.").await;
        assert!(matches!(result, Err(ComicError::EmptyResult(_))));
        assert!(leftover_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn every_panel_failing_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = pipeline(
            ScriptedChat::replying(SCRIPT),
            Some(Painter::new(Some("comic"))),
            dir.path(),
        )
        .generate_comic("A cat sits on a roof.")
        .await;
        assert!(matches!(result, Err(ComicError::EmptyResult(_))));
        assert!(leftover_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn blank_input_stops_before_any_call() {
        let dir = tempfile::tempdir().expect("tempdir");
        let chat = ScriptedChat::replying(SCRIPT);
        let result = pipeline(chat.clone(), Some(Painter::new(None)), dir.path())
            .generate_comic("   ")
            .await;
        assert!(matches!(result, Err(ComicError::EmptyResult(_))));
        assert!(chat.scenes.lock().expect("lock").is_empty());
    }
}
