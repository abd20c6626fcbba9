use super::prelude::*;
use crate::constants::COMIC_FILE_NAME;
use axum::extract::rejection::FormRejection;
use axum::http::header::CONTENT_DISPOSITION;

#[derive(Template, WebTemplate)]
#[template(path = "index.html")]
pub(crate) struct IndexTemplate {
    pub(crate) can_draw: bool,
}

#[derive(Template, WebTemplate)]
#[template(path = "error.html")]
pub(crate) struct ErrorTemplate {
    pub(crate) message: String,
}

/// Renders the error page with the given status.
pub(crate) fn error_page(status: StatusCode, message: String) -> Response {
    match (ErrorTemplate { message }).render() {
        Ok(html) => (status, Html(html)).into_response(),
        Err(err) => {
            error!("Failed to render error page: {}", err);
            status.into_response()
        }
    }
}

#[derive(Deserialize, Debug)]
pub(crate) struct ComicForm {
    #[serde(default)]
    pub(crate) text: String,
}

/// handles the / GET
pub(crate) async fn index_handler(State(state): State<AppState>) -> IndexTemplate {
    IndexTemplate {
        can_draw: state.pipeline.can_draw(),
    }
}

/// Runs the pipeline and sends the strip back as a download.
pub(crate) async fn generate_comic_handler(
    State(state): State<AppState>,
    form: Result<Form<ComicForm>, FormRejection>,
) -> Result<Response, ComicError> {
    let Form(form) = form.map_err(|err| {
        info!("Rejected comic form: {}", err);
        ComicError::BadRequest
    })?;
    // comic.png is shared, one run at a time until its bytes are read
    let _guard = state.run_lock.lock().await;
    let comic = state.pipeline.generate_comic(&form.text).await?;
    let bytes = tokio::fs::read(&comic.path).await?;
    info!(
        "Sending comic {} ({}x{}, {} bytes)",
        comic.path.display(),
        comic.width,
        comic.height,
        bytes.len()
    );

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{COMIC_FILE_NAME}\""))
        .map_err(|err| ComicError::InternalServerError(err.to_string()))?;
    Ok((
        [
            (CONTENT_TYPE, HeaderValue::from_static("image/png")),
            (CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

pub(crate) async fn styles_handler() -> impl IntoResponse {
    const STYLES: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/static/styles.css"));
    ([(CONTENT_TYPE, "text/css")], STYLES)
}

pub(crate) async fn not_found_handler() -> Response {
    error_page(StatusCode::NOT_FOUND, "Page not found.".to_string())
}
