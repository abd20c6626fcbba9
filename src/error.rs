//! Error handling

use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::{error, info};

use crate::constants::WEB_FAILURE_MESSAGE;
use crate::web::views::error_page;

/// definitions for the comicstrip application.
#[derive(Debug)]
pub enum ComicError {
    /// Couldn't get a token out of the chat service
    Auth(String),
    /// The chat or image service returned an error
    RemoteCall(String),
    /// No image synthesizer was loaded at startup
    SynthesizerUnavailable,
    /// The caption couldn't be burned into a panel
    Overlay(String),
    /// One of the panel images couldn't be opened or the strip couldn't be saved
    Assembly(String),
    /// Nothing to draw, or nothing got drawn
    EmptyResult(String),
    /// Filesystem trouble
    Io(std::io::Error),
    /// Image encode/decode trouble
    Image(image::ImageError),
    /// When you didn't do the right thing
    BadRequest,
    /// When an internal server error occurs
    InternalServerError(String),
}

impl ComicError {
    /// True for failures of the comic pipeline itself, as opposed to plumbing.
    pub fn is_generation_failure(&self) -> bool {
        matches!(
            self,
            ComicError::Auth(_)
                | ComicError::RemoteCall(_)
                | ComicError::SynthesizerUnavailable
                | ComicError::Overlay(_)
                | ComicError::Assembly(_)
                | ComicError::EmptyResult(_)
        )
    }
}

impl std::fmt::Display for ComicError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComicError::Auth(msg) => write!(f, "Failed to get access token: {msg}"),
            ComicError::RemoteCall(msg) => write!(f, "Remote call failed: {msg}"),
            ComicError::SynthesizerUnavailable => {
                write!(f, "Stable Diffusion pipeline is not loaded")
            }
            ComicError::Overlay(msg) => write!(f, "Error adding text to image: {msg}"),
            ComicError::Assembly(msg) => write!(f, "Error assembling comic: {msg}"),
            ComicError::EmptyResult(msg) => write!(f, "No comic produced: {msg}"),
            ComicError::Io(err) => write!(f, "I/O error: {err}"),
            ComicError::Image(err) => write!(f, "Image error: {err}"),
            ComicError::BadRequest => write!(f, "Bad request"),
            ComicError::InternalServerError(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for ComicError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ComicError::Io(err) => Some(err),
            ComicError::Image(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ComicError {
    fn from(err: std::io::Error) -> Self {
        ComicError::Io(err)
    }
}

impl From<image::ImageError> for ComicError {
    fn from(err: image::ImageError) -> Self {
        ComicError::Image(err)
    }
}

impl From<reqwest::Error> for ComicError {
    fn from(err: reqwest::Error) -> Self {
        ComicError::RemoteCall(err.to_string())
    }
}

impl From<serde_json::Error> for ComicError {
    fn from(err: serde_json::Error) -> Self {
        ComicError::RemoteCall(err.to_string())
    }
}

impl From<base64::DecodeError> for ComicError {
    fn from(err: base64::DecodeError) -> Self {
        ComicError::RemoteCall(err.to_string())
    }
}

impl From<url::ParseError> for ComicError {
    fn from(err: url::ParseError) -> Self {
        ComicError::InternalServerError(err.to_string())
    }
}

impl From<axum::http::Error> for ComicError {
    fn from(err: axum::http::Error) -> Self {
        ComicError::InternalServerError(err.to_string())
    }
}

impl IntoResponse for ComicError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ComicError::BadRequest => {
                info!("Bad request received");
                error_page(StatusCode::BAD_REQUEST, "Bad Request".to_string())
            }
            err if err.is_generation_failure() => {
                error!("Comic generation failed: {}", err);
                error_page(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    WEB_FAILURE_MESSAGE.to_string(),
                )
            }
            err => {
                error!("Internal server error: {}", err);
                error_page(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("An error occurred: {err}"),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_failures_are_told_apart_from_plumbing() {
        assert!(ComicError::EmptyResult("no images generated".into()).is_generation_failure());
        assert!(ComicError::SynthesizerUnavailable.is_generation_failure());
        assert!(!ComicError::BadRequest.is_generation_failure());
        assert!(
            !ComicError::Io(std::io::Error::other("disk on fire")).is_generation_failure()
        );
    }

    #[test]
    fn into_response_uses_error_status() {
        let response = ComicError::Assembly("broken".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let response = ComicError::BadRequest.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
