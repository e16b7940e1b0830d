/// Object storage access
///
/// Artifacts are read through the loader, either from blob URLs or from local
/// paths. Rendered graphs are written through a `GraphStore`: Azure Blob
/// Storage in production, a local directory otherwise.
use std::sync::Arc;

use crate::{config::Config, error::AppResult, models::UserId};

pub mod azure;
pub mod loader;
pub mod local;

pub use azure::{AzureBlobStore, ConnectionString};
pub use loader::{load_data, DataTables};
pub use local::LocalGraphStore;

pub const GRAPH_CONTENT_TYPE: &str = "image/png";

/// Destination of rendered graphs
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait GraphStore: Send + Sync {
    /// Writes `png` under `blob_name`, replacing any previous graph
    async fn upload_graph(&self, blob_name: &str, png: Vec<u8>) -> AppResult<()>;

    /// Base URL under which uploaded graphs are reachable, when the store
    /// knows it
    fn public_base_url(&self) -> Option<String>;

    /// Store name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Blob name of a user's graph
pub fn graph_blob_name(user_id: UserId) -> String {
    format!("{}_graph.png", user_id)
}

/// Shareable URL of a user's graph
pub fn graph_url(base_url: &str, user_id: UserId, sas_token: Option<&str>) -> String {
    let url = format!("{}/{}", base_url.trim_end_matches('/'), graph_blob_name(user_id));
    match sas_token {
        Some(token) => format!("{}?{}", url, token),
        None => url,
    }
}

/// Picks the graph store matching the configuration
pub fn graph_store_from_config(
    config: &Config,
    http_client: reqwest::Client,
) -> AppResult<Arc<dyn GraphStore>> {
    match &config.storage_connection_string {
        Some(connection_string) => {
            let connection_string: ConnectionString = connection_string.parse()?;
            Ok(Arc::new(AzureBlobStore::new(
                http_client,
                &connection_string,
                config.graphs_container.clone(),
            )?))
        }
        None => {
            tracing::warn!(
                graphs_dir = %config.graphs_dir,
                "No storage connection string, graphs are written to a local directory"
            );
            Ok(Arc::new(LocalGraphStore::new(&config.graphs_dir)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_blob_name() {
        assert_eq!(graph_blob_name(42), "42_graph.png");
    }

    #[test]
    fn test_graph_url_points_at_user_blob() {
        for user_id in [0, 42, 123456] {
            let url = graph_url(
                "https://account.blob.core.windows.net/graphs/",
                user_id,
                Some("sv=1&sig=abc"),
            );
            assert_eq!(
                url,
                format!(
                    "https://account.blob.core.windows.net/graphs/{}_graph.png?sv=1&sig=abc",
                    user_id
                )
            );
        }
    }

    #[test]
    fn test_graph_url_without_token() {
        assert_eq!(
            graph_url("http://127.0.0.1:3000/graphs", 7, None),
            "http://127.0.0.1:3000/graphs/7_graph.png"
        );
    }
}
