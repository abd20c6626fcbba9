use std::process::ExitCode;

use clap::Parser;
use comicstrip::cli::{CliOptions, Command};
use comicstrip::config::{build_pipeline, setup_logging};
use tracing::error;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    // a missing .env is fine
    let _ = dotenvy::dotenv();
    let cli = CliOptions::parse();

    if setup_logging(cli.debug).is_err() {
        return ExitCode::FAILURE;
    }

    if let Err(err) = tokio::fs::create_dir_all(&cli.temp_dir).await {
        error!(
            "Failed to create temp image dir {}: {}",
            cli.temp_dir.display(),
            err
        );
        return ExitCode::FAILURE;
    }

    let pipeline = match build_pipeline(&cli).await {
        Ok(pipeline) => pipeline,
        Err(err) => {
            error!("Startup error: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Serve {
            port,
            listen_address,
        } => comicstrip::web::setup_server(&listen_address, port, pipeline).await,
        Command::Bot {
            bot_token,
            telegram_api_url,
        } => comicstrip::bot::run(&telegram_api_url, &bot_token, pipeline).await,
        Command::Generate { text, file } => {
            comicstrip::cli::generate_once(text, file, &pipeline).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Application error: {}", err);
            ExitCode::FAILURE
        }
    }
}
