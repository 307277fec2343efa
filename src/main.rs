use std::io;

use eyre::Result;

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> Result<()> {
    init()?;
    thermolink::launch().await
}

fn init() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter("thermolink=debug")
        .with_writer(io::stderr)
        .init();

    Ok(())
}
