use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::models::UserId;

const INTERNAL_ERROR_MESSAGE: &str = "Erreur interne du serveur.";
const DATA_ERROR_MESSAGE: &str = "Erreur lors du chargement des données";

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Aucune recommandation trouvée pour l'utilisateur {0}")]
    NoRecommendations(UserId),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::HttpClient(_)
            | AppError::Io(_)
            | AppError::DataUnavailable(_)
            | AppError::NoRecommendations(_)
            | AppError::Storage(_)
            | AppError::Render(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Server-side failures are logged in full and reported generically.
        let message = match self {
            AppError::InvalidInput(msg) | AppError::Unauthorized(msg) | AppError::NotFound(msg) => {
                msg
            }
            AppError::DataUnavailable(ref detail) => {
                tracing::error!(error = %detail, "Data loading failed");
                DATA_ERROR_MESSAGE.to_string()
            }
            other => {
                tracing::error!(error = %other, "Unexpected error");
                INTERNAL_ERROR_MESSAGE.to_string()
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
