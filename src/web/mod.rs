//! The browser front end: a form that posts text and gets a PNG back.

use std::num::NonZeroU16;
use std::sync::Arc;

use axum::Router;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::pipeline::ComicPipeline;

mod prelude;
pub(crate) mod views;

#[derive(Clone)]
pub(crate) struct AppState {
    pipeline: Arc<ComicPipeline>,
    run_lock: Arc<Mutex<()>>,
}

impl AppState {
    fn new(pipeline: ComicPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            run_lock: Arc::new(Mutex::new(())),
        }
    }
}

fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::get(views::index_handler))
        .route(
            "/generate_comic",
            axum::routing::post(views::generate_comic_handler),
        )
        .route("/static/styles.css", axum::routing::get(views::styles_handler))
        .fallback(views::not_found_handler)
}

/// Serves the web form until Ctrl-C.
pub async fn setup_server(
    listen_addr: &str,
    port: NonZeroU16,
    pipeline: ComicPipeline,
) -> Result<(), anyhow::Error> {
    let app = create_router().with_state(AppState::new(pipeline));

    let addr = format!("{}:{}", listen_addr, port);
    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", err);
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
