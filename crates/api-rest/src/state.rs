use std::sync::Arc;
use vrs_core::query::{CompositionScanExecutor, StoredQueryRegistry};
use vrs_core::{
    CompositionService, CoreConfig, DirectoryService, EhrService, QueryDispatcher, Storage,
};

/// Application state for the REST API server
///
/// Holds the services every handler needs. All of them share the same [`Storage`], so an EHR
/// created through one handler is immediately visible to the others.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<CoreConfig>,
    pub ehrs: EhrService,
    pub directories: DirectoryService,
    pub compositions: CompositionService,
    pub queries: QueryDispatcher,
    /// When set, every route except `/status` requires a matching `x-api-key` header.
    pub api_key: Option<String>,
}

impl AppState {
    /// Builds the services over `storage`, answering ad-hoc queries by scanning compositions.
    pub fn new(
        cfg: Arc<CoreConfig>,
        storage: Storage,
        registry: Arc<dyn StoredQueryRegistry>,
    ) -> Self {
        let executor = Arc::new(CompositionScanExecutor::new(storage.clone()));
        Self {
            ehrs: EhrService::new(cfg.clone(), storage.clone()),
            directories: DirectoryService::new(cfg.clone(), storage.clone()),
            compositions: CompositionService::new(cfg.clone(), storage),
            queries: QueryDispatcher::new(executor, registry),
            api_key: None,
            cfg,
        }
    }

    /// Requires `api_key` on protected routes. Blank keys leave the API open.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key
            .map(|k| k.trim().to_owned())
            .filter(|k| !k.is_empty());
        self
    }
}
