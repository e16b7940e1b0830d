use serde::Deserialize;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Location of the click sample CSV (blob URL with SAS token, or local path)
    pub click_sample_path: String,

    /// Location of the precomputed recommendations JSON
    pub recommandations_path: String,

    /// Location of the 2D embeddings `.npy` array
    pub embeddings_path: String,

    /// Pre-signed URL of the graphs container; its query string is reused as
    /// the access token of every graph URL handed out
    #[serde(default)]
    pub graphs_sas_url: Option<String>,

    /// Public base URL of the graphs container. Defaults to the SAS URL
    /// without its query string.
    #[serde(default)]
    pub graphs_base_url: Option<String>,

    /// Storage account connection string. Without it graphs are written to
    /// `graphs_dir` and served by this process.
    #[serde(rename = "azurewebjobsstorage", default)]
    pub storage_connection_string: Option<String>,

    #[serde(default = "default_graphs_container")]
    pub graphs_container: String,

    #[serde(default = "default_graphs_dir")]
    pub graphs_dir: String,

    /// Expected value of the `code` query parameter, if any
    #[serde(default)]
    pub function_key: Option<String>,

    /// Number of recommendations returned per user
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_graphs_container() -> String {
    "graphs".to_string()
}

fn default_graphs_dir() -> String {
    "graphs".to_string()
}

fn default_top_n() -> usize {
    crate::services::DEFAULT_TOP_N
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    /// Shared-access signature carried by the graphs SAS URL
    pub fn sas_token(&self) -> Option<&str> {
        self.graphs_sas_url
            .as_deref()
            .and_then(|url| url.split_once('?'))
            .map(|(_, token)| token)
            .filter(|token| !token.is_empty())
    }

    /// Base URL graph image names are appended to
    pub fn graphs_base_url(&self) -> Option<String> {
        if let Some(base) = &self.graphs_base_url {
            return Some(base.trim_end_matches('/').to_string());
        }

        self.graphs_sas_url.as_deref().map(|url| {
            let base = url.split_once('?').map(|(base, _)| base).unwrap_or(url);
            base.trim_end_matches('/').to_string()
        })
    }

    /// Logs the effective configuration, without secrets
    pub fn log_summary(&self) {
        tracing::info!(
            click_sample_path = %redact_query(&self.click_sample_path),
            recommandations_path = %redact_query(&self.recommandations_path),
            embeddings_path = %redact_query(&self.embeddings_path),
            graphs_base_url = ?self.graphs_base_url(),
            graphs_container = %self.graphs_container,
            azure_storage = self.storage_connection_string.is_some(),
            function_key = self.function_key.is_some(),
            top_n = self.top_n,
            "Configuration loaded"
        );
    }
}

fn redact_query(location: &str) -> String {
    match location.split_once('?') {
        Some((base, _)) => format!("{}?<redacted>", base),
        None => location.to_string(),
    }
}
