use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::AppState;
use vrs_core::config::{data_dir_from_env_value, node_name_from_env_value};
use vrs_core::constants::DEFAULT_BASE_URL;
use vrs_core::query::{MemoryQueryRegistry, StoredQueryRegistry};
use vrs_core::{CoreConfig, Storage};

/// Main entry point for the VRS server
///
/// Builds the configuration once from the environment, opens the store and serves the REST API.
///
/// # Environment Variables
/// - `VRS_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `VRS_DATA_DIR`: directory of the file-backed store (unset: in-memory store)
/// - `VRS_NODE_NAME`: node name stamped into version ids (default: "local.vrs.dev")
/// - `VRS_BASE_URL`: public base URL for `Location` headers (default: "http://localhost:3000")
/// - `VRS_STORED_QUERIES`: YAML file of stored queries (unset: none registered)
/// - `API_KEY`: when set, required as `x-api-key` on every route except `/status`
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If configuration, storage or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vrs=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("VRS_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let data_dir = data_dir_from_env_value(std::env::var("VRS_DATA_DIR").ok())?;
    let node_name = node_name_from_env_value(std::env::var("VRS_NODE_NAME").ok())?;
    let base_url = std::env::var("VRS_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());

    let cfg = Arc::new(CoreConfig::new(data_dir, node_name, base_url)?);
    match cfg.data_dir() {
        Some(dir) => tracing::info!("-- Using file store at {}", dir.display()),
        None => tracing::warn!("-- VRS_DATA_DIR not set, records are kept in memory only"),
    }
    let storage = Storage::from_config(&cfg)?;

    let registry = stored_queries(std::env::var("VRS_STORED_QUERIES").ok())?;
    let state = AppState::new(cfg, storage, registry).with_api_key(std::env::var("API_KEY").ok());

    api_rest::serve(&rest_addr, state).await
}

/// Loads the stored-query registry from a YAML file, or an empty one when unset.
fn stored_queries(path: Option<String>) -> anyhow::Result<Arc<dyn StoredQueryRegistry>> {
    let Some(path) = path.map(|p| p.trim().to_owned()).filter(|p| !p.is_empty()) else {
        return Ok(Arc::new(MemoryQueryRegistry::new()));
    };
    let registry = MemoryQueryRegistry::load(Path::new(&path))?;
    tracing::info!("-- Loaded stored queries from {}", path);
    Ok(Arc::new(registry))
}
