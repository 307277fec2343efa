pub mod audio;
pub mod cli;
pub mod config;
pub mod controller;
pub mod defs;
pub mod display;
pub mod link;
pub mod pipeline;
pub mod safety;
pub mod store;

pub async fn launch() -> eyre::Result<()> {
    cli::parse().await
}
