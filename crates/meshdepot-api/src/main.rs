use meshdepot_api::setup;
use meshdepot_core::Config;

// mimalloc keeps fragmentation low while large upload batches are buffered.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;

    // Initialize the application (telemetry, database, storage, services, routes)
    let (state, router) = setup::initialize_app(config.clone()).await?;

    setup::server::start_server(&config, router).await?;

    // Axum has stopped accepting requests; let running ingestion jobs finish.
    state.upload_queue.shutdown().await;

    Ok(())
}
