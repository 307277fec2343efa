use eyre::Result;
use tokio::signal;

use crate::{config::Config, pipeline::Pipeline};

pub async fn launch(config_path: &str) -> Result<()> {
    let config = Config::load(config_path).await?;
    let pipeline = Pipeline::start(&config).await?;

    let opened = pipeline.controller.open_link();
    tracing::info!("{opened}");

    signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    pipeline.stop().await;

    Ok(())
}
