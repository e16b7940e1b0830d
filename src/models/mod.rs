use serde::{Deserialize, Serialize};

pub mod click;
pub mod embedding;
pub mod recommendation;

pub use click::{ClickRecord, ClickTable};
pub use embedding::EmbeddingTable;
pub use recommendation::{RecommendationRecord, RecommendationTable};

/// Identifier of a reader, as found in the click sample
pub type UserId = i64;

/// Identifier of an article; doubles as its row in the embedding table
pub type ArticleId = u64;

/// Response body of `GET /api/recommend`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationResponse {
    pub user_id: UserId,
    /// Distinct articles the user clicked, in order of first appearance
    pub user_history: Vec<ArticleId>,
    pub last_article: Option<ArticleId>,
    pub recommendations: Vec<ArticleId>,
    /// Similarity scores, parallel to `recommendations`
    pub scores: Vec<f64>,
    pub graph_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_shape() {
        let response = RecommendationResponse {
            user_id: 42,
            user_history: vec![10, 20, 30],
            last_article: Some(30),
            recommendations: vec![5, 7],
            scores: vec![0.91, 0.85],
            graph_url: "https://host/graphs/42_graph.png?sig=x".to_string(),
        };

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "user_id": 42,
                "user_history": [10, 20, 30],
                "last_article": 30,
                "recommendations": [5, 7],
                "scores": [0.91, 0.85],
                "graph_url": "https://host/graphs/42_graph.png?sig=x"
            })
        );
    }
}
