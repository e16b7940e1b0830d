use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    middleware::request_id::RequestId,
    models::{RecommendationResponse, UserId},
    services::{
        history::user_history, recommendations::get_recommendations,
        visualizer::{render_graph, GraphData},
    },
    storage::{graph_blob_name, graph_url, load_data},
};

use super::AppState;

// Request types

#[derive(Debug, Deserialize)]
pub struct RecommendQuery {
    pub user_id: Option<String>,
    /// Function key
    pub code: Option<String>,
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// `GET /api/recommend?user_id=<int>&code=<function-key>`
pub async fn recommend(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Query(params): Query<RecommendQuery>,
) -> AppResult<Json<RecommendationResponse>> {
    authorize(state.config.function_key.as_deref(), params.code.as_deref())?;
    let user_id = parse_user_id(params.user_id.as_deref())?;

    tracing::info!(request_id = %request_id, user_id, "Processing recommendation request");

    let response = recommend_for_user(&state, user_id).await?;

    tracing::info!(
        request_id = %request_id,
        user_id,
        recommendations = response.recommendations.len(),
        "Recommendation request completed"
    );

    Ok(Json(response))
}

/// Loads the data, looks the user up, renders and uploads the graph
pub async fn recommend_for_user(
    state: &AppState,
    user_id: UserId,
) -> AppResult<RecommendationResponse> {
    let tables = load_data(&state.http_client, &state.config).await?;

    let (history, _) = user_history(user_id, &tables.clicks);
    if history.is_empty() {
        return Err(AppError::NotFound(format!(
            "Aucun historique trouvé pour l'utilisateur {}.",
            user_id
        )));
    }

    let recos = get_recommendations(
        user_id,
        &tables.clicks,
        &tables.recommendations,
        state.config.top_n,
    )?;

    let graph = GraphData::for_user(&tables.embeddings, &history, &recos)?;

    tracing::info!(
        user_id,
        history = ?history,
        recommendations = ?recos.article_ids,
        "Rendering embeddings graph"
    );

    let png = tokio::task::spawn_blocking(move || render_graph(user_id, &graph))
        .await
        .map_err(|e| AppError::Internal(format!("graph rendering task failed: {}", e)))??;

    state
        .graph_store
        .upload_graph(&graph_blob_name(user_id), png)
        .await?;

    Ok(RecommendationResponse {
        user_id,
        user_history: history,
        last_article: recos.last_article,
        recommendations: recos.article_ids,
        scores: recos.scores,
        graph_url: graph_url(
            &state.graphs_base_url,
            user_id,
            state.graphs_sas_token.as_deref(),
        ),
    })
}

/// Checks the `code` query parameter against the configured function key
fn authorize(expected: Option<&str>, provided: Option<&str>) -> AppResult<()> {
    match expected {
        Some(expected) if provided != Some(expected) => {
            tracing::warn!("Request rejected: missing or invalid function key");
            Err(AppError::Unauthorized(
                "Clé de fonction manquante ou invalide.".to_string(),
            ))
        }
        _ => Ok(()),
    }
}

fn parse_user_id(raw: Option<&str>) -> AppResult<UserId> {
    let raw = raw.ok_or_else(|| {
        AppError::InvalidInput("Paramètre 'user_id' manquant.".to_string())
    })?;

    raw.trim().parse::<UserId>().map_err(|_| {
        tracing::warn!(user_id = %raw, "Invalid user_id");
        AppError::InvalidInput(format!("user_id invalide : {}", raw))
    })
}
