use std::sync::Arc;

use crate::api::ApiClient;
use crate::auth::gate::Gate;
use crate::config::AppConfig;
use crate::storage::{FileTokenStore, MemoryTokenStore, TokenStore};

/// Everything a screen needs to talk to the backend and check access,
/// passed explicitly instead of living in globals.
#[derive(Clone)]
pub struct SessionContext {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn TokenStore>,
    pub api: ApiClient,
    pub gate: Gate,
}

impl SessionContext {
    pub fn init(config: AppConfig) -> anyhow::Result<Self> {
        let store = Arc::new(FileTokenStore::new(&config.token_file)) as Arc<dyn TokenStore>;
        Self::from_parts(Arc::new(config), store)
    }

    pub fn from_parts(config: Arc<AppConfig>, store: Arc<dyn TokenStore>) -> anyhow::Result<Self> {
        let api = ApiClient::new(&config.api, store.clone())?;
        let gate = Gate::new(
            store.clone(),
            Arc::new(api.clone()),
            config.role_policy.clone(),
            config.api.refresh_timeout,
        );
        Ok(Self {
            config,
            store,
            api,
            gate,
        })
    }

    /// Session backed by process memory, pointed at `base_url`.
    pub fn in_memory(base_url: &str) -> anyhow::Result<Self> {
        let mut config = AppConfig::default();
        config.api.base_url = base_url.trim_end_matches('/').to_string();
        Self::from_parts(Arc::new(config), Arc::new(MemoryTokenStore::new()))
    }
}
