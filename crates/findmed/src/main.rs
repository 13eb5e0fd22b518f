use anyhow::Result;
use findme_core::OnnxEncoder;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod handler;
mod organizer;
#[cfg(test)]
mod test_support;
mod validation;

use dbus_interface::{PhotoFinderService, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("findmed starting");

    let config = config::Config::from_env()?;
    tracing::info!(
        source = %config.source_dir.display(),
        output = %config.output_dir.display(),
        encodings = %config.encodings_path.display(),
        threshold = config.match_threshold,
        "configuration loaded"
    );

    let encoder = OnnxEncoder::load(&config.model_dir)?;
    tracing::info!(dir = %config.model_dir.display(), "face models loaded");

    let engine = engine::spawn_engine(handler::RequestHandler::new(config, encoder))?;

    let _connection = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, PhotoFinderService::new(engine))?
        .build()
        .await?;

    tracing::info!(bus = BUS_NAME, path = OBJECT_PATH, "findmed ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("findmed shutting down");

    Ok(())
}
