use tracing::instrument;

use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::{ClickTable, EmbeddingTable, RecommendationTable},
};

/// The three tables a recommendation request works on
#[derive(Debug, Clone)]
pub struct DataTables {
    pub clicks: ClickTable,
    pub recommendations: RecommendationTable,
    pub embeddings: EmbeddingTable,
}

/// Reads an artifact into memory.
///
/// `http(s)` locations are fetched with a single GET (a blob URL carries its
/// own SAS token); anything else is read as a local path. No retries.
pub async fn download(http_client: &reqwest::Client, location: &str) -> AppResult<Vec<u8>> {
    if location.starts_with("http://") || location.starts_with("https://") {
        let response = http_client.get(location).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Storage(format!(
                "download returned status {}: {}",
                status, body
            )));
        }

        Ok(response.bytes().await?.to_vec())
    } else {
        Ok(tokio::fs::read(location).await?)
    }
}

async fn fetch_artifact(
    http_client: &reqwest::Client,
    artifact: &'static str,
    location: &str,
) -> AppResult<Vec<u8>> {
    match download(http_client, location).await {
        Ok(data) if data.is_empty() => {
            tracing::error!(artifact, "Downloaded artifact is empty");
            Err(AppError::DataUnavailable(format!("{} is empty", artifact)))
        }
        Ok(data) => {
            tracing::info!(artifact, size_bytes = data.len(), "Artifact downloaded");
            Ok(data)
        }
        Err(e) => {
            tracing::error!(artifact, error = %e, "Artifact download failed");
            Err(e)
        }
    }
}

/// Downloads and parses the click sample, the recommendations and the
/// embeddings.
///
/// The downloads run concurrently and independently: every failure is
/// logged, and the request fails once if any of them did.
#[instrument(skip_all)]
pub async fn load_data(http_client: &reqwest::Client, config: &Config) -> AppResult<DataTables> {
    tracing::info!("Loading data tables");

    let (clicks, recommendations, embeddings) = tokio::join!(
        fetch_artifact(http_client, "click sample", &config.click_sample_path),
        fetch_artifact(http_client, "recommendations", &config.recommandations_path),
        fetch_artifact(http_client, "embeddings", &config.embeddings_path),
    );

    let (clicks, recommendations, embeddings) = match (clicks, recommendations, embeddings) {
        (Ok(clicks), Ok(recommendations), Ok(embeddings)) => (clicks, recommendations, embeddings),
        (clicks, recommendations, embeddings) => {
            let failed: Vec<&str> = [
                ("click sample", clicks.is_err()),
                ("recommendations", recommendations.is_err()),
                ("embeddings", embeddings.is_err()),
            ]
            .into_iter()
            .filter_map(|(artifact, failed)| failed.then_some(artifact))
            .collect();

            return Err(AppError::DataUnavailable(format!(
                "could not download: {}",
                failed.join(", ")
            )));
        }
    };

    let tables = DataTables {
        clicks: ClickTable::from_csv(&clicks)?,
        recommendations: RecommendationTable::from_json(&recommendations)?,
        embeddings: EmbeddingTable::from_npy(&embeddings)?,
    };

    tracing::info!(
        clicks = tables.clicks.len(),
        recommendations = tables.recommendations.len(),
        embeddings = tables.embeddings.len(),
        "Data tables loaded"
    );

    Ok(tables)
}
