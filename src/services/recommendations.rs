use tracing::instrument;

use crate::{
    error::{AppError, AppResult},
    models::{ArticleId, ClickTable, RecommendationTable, UserId},
    services::history::user_history,
};

/// Default number of recommendations served per user
pub const DEFAULT_TOP_N: usize = 5;

/// Recommendations of a user and the article they were computed from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserRecommendations {
    pub article_ids: Vec<ArticleId>,
    pub last_article: Option<ArticleId>,
    /// Similarity scores, parallel to `article_ids`
    pub scores: Vec<f64>,
}

/// Looks up the precomputed recommendations of a user.
///
/// A user without history gets an empty result. A user with history but no
/// precomputed rows is an error. The first `top_n` rows are returned in
/// table order; they are not re-sorted by score.
#[instrument(skip(clicks, recommendations))]
pub fn get_recommendations(
    user_id: UserId,
    clicks: &ClickTable,
    recommendations: &RecommendationTable,
    top_n: usize,
) -> AppResult<UserRecommendations> {
    let (history, last_article) = user_history(user_id, clicks);
    if history.is_empty() {
        return Ok(UserRecommendations::default());
    }

    if recommendations.for_user(user_id).next().is_none() {
        let err = AppError::NoRecommendations(user_id);
        tracing::error!(user_id, "{}", err);
        return Err(err);
    }

    let rows: Vec<_> = recommendations.for_user(user_id).take(top_n).collect();

    let result = UserRecommendations {
        article_ids: rows.iter().map(|row| row.article_id).collect(),
        last_article,
        scores: rows.iter().map(|row| row.similarity_score).collect(),
    };

    tracing::info!(
        user_id,
        recommendations = ?result.article_ids,
        scores = ?result.scores,
        "Recommendations found"
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClickRecord, RecommendationRecord};

    fn clicks() -> ClickTable {
        ClickTable::new(vec![
            ClickRecord {
                user_id: 1,
                click_article_id: 3,
            },
            ClickRecord {
                user_id: 1,
                click_article_id: 4,
            },
            ClickRecord {
                user_id: 2,
                click_article_id: 3,
            },
        ])
    }

    fn recos(rows: &[(UserId, ArticleId, f64)]) -> RecommendationTable {
        RecommendationTable::new(
            rows.iter()
                .map(|&(user_id, article_id, similarity_score)| RecommendationRecord {
                    user_id,
                    article_id,
                    similarity_score,
                })
                .collect(),
        )
    }

    #[test]
    fn test_keeps_table_order_and_truncates() {
        let table = recos(&[
            (1, 10, 0.2),
            (2, 99, 0.9),
            (1, 11, 0.8),
            (1, 12, 0.5),
            (1, 13, 0.9),
        ]);

        let result = get_recommendations(1, &clicks(), &table, 3).unwrap();

        assert_eq!(result.article_ids, vec![10, 11, 12]);
        assert_eq!(result.scores, vec![0.2, 0.8, 0.5]);
        assert_eq!(result.last_article, Some(4));
    }

    #[test]
    fn test_fewer_rows_than_top_n() {
        let table = recos(&[(2, 5, 0.4)]);

        let result = get_recommendations(2, &clicks(), &table, DEFAULT_TOP_N).unwrap();

        assert_eq!(result.article_ids, vec![5]);
        assert_eq!(result.scores.len(), result.article_ids.len());
    }

    #[test]
    fn test_zero_top_n_is_empty_not_an_error() {
        let table = recos(&[(1, 4, 0.5)]);

        let result = get_recommendations(1, &clicks(), &table, 0).unwrap();

        assert!(result.article_ids.is_empty());
        assert!(result.scores.is_empty());
        assert_eq!(result.last_article, Some(4));
    }

    #[test]
    fn test_unknown_user_is_empty_not_an_error() {
        let table = recos(&[(1, 10, 0.2)]);

        let result = get_recommendations(999, &clicks(), &table, DEFAULT_TOP_N).unwrap();

        assert_eq!(result, UserRecommendations::default());
    }

    #[test]
    fn test_history_without_recommendations_fails() {
        let table = recos(&[(1, 10, 0.2)]);

        let err = get_recommendations(2, &clicks(), &table, DEFAULT_TOP_N).unwrap_err();

        assert!(matches!(err, AppError::NoRecommendations(2)));
        assert!(err.to_string().starts_with("Aucune recommandation trouvée"));
    }
}
