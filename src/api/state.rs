use std::sync::Arc;

use crate::{
    config::Config,
    error::AppResult,
    storage::{graph_store_from_config, GraphStore},
};

/// Shared application state
///
/// Nothing request-specific lives here: every request reloads its data.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub http_client: reqwest::Client,
    pub graph_store: Arc<dyn GraphStore>,
    /// Base URL prepended to graph blob names in responses
    pub graphs_base_url: String,
    /// Access token appended to graph URLs; only set for blob storage
    pub graphs_sas_token: Option<String>,
}

impl AppState {
    /// Builds the state, picking the graph store from the configuration
    pub fn new(config: Config) -> AppResult<Self> {
        let http_client = reqwest::Client::new();
        let graph_store = graph_store_from_config(&config, http_client.clone())?;
        Ok(Self::with_graph_store(config, http_client, graph_store))
    }

    /// Builds the state around an existing graph store
    pub fn with_graph_store(
        config: Config,
        http_client: reqwest::Client,
        graph_store: Arc<dyn GraphStore>,
    ) -> Self {
        let local_url = || format!("http://{}:{}/graphs", config.host, config.port);

        // Local graphs are only reachable through this process's /graphs route.
        let (graphs_base_url, graphs_sas_token) = if serves_local_graphs(&config) {
            if config.graphs_sas_url.is_some() {
                tracing::warn!(
                    "GRAPHS_SAS_URL is ignored without a storage connection string, \
                     graph URLs point at the local /graphs route"
                );
            }
            let base = config
                .graphs_base_url
                .as_deref()
                .map(|base| base.trim_end_matches('/').to_string())
                .unwrap_or_else(local_url);
            (base, None)
        } else {
            let base = config
                .graphs_base_url()
                .or_else(|| graph_store.public_base_url())
                .unwrap_or_else(local_url);
            (base, config.sas_token().map(str::to_string))
        };

        tracing::info!(
            graph_store = graph_store.name(),
            graphs_base_url = %graphs_base_url,
            sas_token = graphs_sas_token.is_some(),
            "Application state ready"
        );

        Self {
            config: Arc::new(config),
            http_client,
            graph_store,
            graphs_base_url,
            graphs_sas_token,
        }
    }

    /// Whether graphs are kept on local disk and must be served by this process
    pub fn serves_local_graphs(&self) -> bool {
        serves_local_graphs(&self.config)
    }
}

fn serves_local_graphs(config: &Config) -> bool {
    config.storage_connection_string.is_none()
}
