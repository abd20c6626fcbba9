//! The two AI capabilities the pipeline leans on, and their HTTP bindings.
//!
//! Both are traits so the orchestrator can be handed a real client at startup
//! or a stand-in under test.

pub mod chat;
pub mod diffusion;

pub use chat::{ChatCapability, ChatSettings, CompletionSettings, GigaChatClient};
pub use diffusion::{
    DiffusionSettings, ImageSynthesizer, StableDiffusionClient, SynthesisRequest,
};
