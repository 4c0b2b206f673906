use anyhow::Result;
use server::{
    config::ServerConfig,
    http,
    registry::Registry,
    storage::{self, StorageConfig},
};
use tracing::{Level, info};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()),
        )
        .init();

    info!("Starting config registry server");

    let config = ServerConfig::from_env()?;
    let backend_kind = match &config.storage {
        StorageConfig::Memory => "memory",
        StorageConfig::Local { .. } => "local",
        StorageConfig::S3 { .. } => "s3",
    };
    info!("Using {} storage backend", backend_kind);

    let backend = storage::connect(config.storage)?;
    let registry = Registry::new(backend);

    http::start_server(registry, config.bind_address).await?;

    Ok(())
}
