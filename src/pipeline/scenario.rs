//! Scene to four-panel script, via the chat capability.

use tracing::{error, info};

use crate::error::ComicError;
use crate::services::{ChatCapability, CompletionSettings};

/// The instruction sent to the chat model for one scene.
pub fn scenario_prompt(scene: &str) -> String {
    format!(
        "Turn this text into a comic scenario with dialogues and descriptions: {scene}\n\n\
         The scenario should be short, humorous, and suitable for visualization in a comic. \
         Each scene should be clearly separated. The script should explicitly indicate characters and their dialogues. \
         Generate only 1 scene with 4 frames."
    )
}

/// Asks the chat service for a scenario; the reply is trimmed, not validated.
pub async fn generate_scenario(
    chat: &dyn ChatCapability,
    settings: &CompletionSettings,
    scene: &str,
) -> Result<String, ComicError> {
    let token = chat.authenticate().await.map_err(|err| {
        error!("Failed to get access token: {}", err);
        err
    })?;
    let scenario = chat
        .complete(&token, &scenario_prompt(scene), settings)
        .await?;
    info!("Scenario generated ({} characters)", scenario.len());
    Ok(scenario.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingChat {
        fail_auth: bool,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatCapability for RecordingChat {
        async fn authenticate(&self) -> Result<String, ComicError> {
            if self.fail_auth {
                Err(ComicError::Auth("nope".to_string()))
            } else {
                Ok("token".to_string())
            }
        }

        async fn complete(
            &self,
            token: &str,
            prompt: &str,
            _settings: &CompletionSettings,
        ) -> Result<String, ComicError> {
            assert_eq!(token, "token");
            self.prompts
                .lock()
                .expect("lock prompts")
                .push(prompt.to_string());
            Ok("  Frame 1: hi  \n".to_string())
        }
    }

    #[test]
    fn prompt_names_the_scene_and_the_shape() {
        let prompt = scenario_prompt("A cat sits on a roof.");
        assert!(prompt.starts_with(
            "Turn this text into a comic scenario with dialogues and descriptions: A cat sits on a roof.\n\n"
        ));
        assert!(prompt.ends_with("Generate only 1 scene with 4 frames."));
        assert!(prompt.contains("short, humorous"));
    }

    #[tokio::test]
    async fn reply_is_trimmed() {
        let chat = RecordingChat::default();
        let scenario = generate_scenario(&chat, &CompletionSettings::default(), "A cat.")
            .await
            .expect("scenario");
        assert_eq!(scenario, "Frame 1: hi");
        assert_eq!(chat.prompts.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn auth_failure_stops_before_completion() {
        let chat = RecordingChat {
            fail_auth: true,
            ..Default::default()
        };
        let result = generate_scenario(&chat, &CompletionSettings::default(), "A cat.").await;
        assert!(matches!(result, Err(ComicError::Auth(_))));
        assert!(chat.prompts.lock().expect("lock").is_empty());
    }
}
