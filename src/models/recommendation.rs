use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ArticleId, UserId};
use crate::error::{AppError, AppResult};

/// One precomputed recommendation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RecommendationRecord {
    pub user_id: UserId,
    pub article_id: ArticleId,
    pub similarity_score: f64,
}

/// Precomputed recommendations, rows kept in table order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecommendationTable {
    pub records: Vec<RecommendationRecord>,
}

/// Column-oriented export: `{"user_id": {"0": 1, ...}, "article_id": {...}, ...}`
#[derive(Debug, Deserialize)]
struct ColumnLayout {
    user_id: HashMap<String, UserId>,
    article_id: HashMap<String, ArticleId>,
    similarity_score: HashMap<String, f64>,
}

impl RecommendationTable {
    pub fn new(records: Vec<RecommendationRecord>) -> Self {
        Self { records }
    }

    /// Parses the recommendations export.
    ///
    /// Both the record layout (an array of row objects) and the column
    /// layout (one object per column, keyed by row index) are accepted.
    /// Column-layout rows are ordered by their numeric index.
    pub fn from_json(data: &[u8]) -> AppResult<Self> {
        let value: Value = serde_json::from_slice(data)
            .map_err(|e| AppError::DataUnavailable(format!("recommendations: {}", e)))?;

        match value {
            Value::Array(_) => {
                let records = serde_json::from_value::<Vec<RecommendationRecord>>(value)
                    .map_err(|e| AppError::DataUnavailable(format!("recommendations: {}", e)))?;
                Ok(Self { records })
            }
            Value::Object(_) => {
                let columns = serde_json::from_value::<ColumnLayout>(value)
                    .map_err(|e| AppError::DataUnavailable(format!("recommendations: {}", e)))?;
                Self::from_columns(columns)
            }
            _ => Err(AppError::DataUnavailable(
                "recommendations: expected a JSON array or object".to_string(),
            )),
        }
    }

    fn from_columns(mut columns: ColumnLayout) -> AppResult<Self> {
        let mut index = columns
            .user_id
            .keys()
            .map(|key| {
                key.parse::<u64>()
                    .map(|position| (position, key.clone()))
                    .map_err(|_| {
                        AppError::DataUnavailable(format!(
                            "recommendations: non-numeric row index {:?}",
                            key
                        ))
                    })
            })
            .collect::<AppResult<Vec<_>>>()?;
        index.sort_unstable_by_key(|(position, _)| *position);

        let mut records = Vec::with_capacity(index.len());
        for (_, key) in index {
            let missing = |column: &str| {
                AppError::DataUnavailable(format!(
                    "recommendations: row {} has no {}",
                    key, column
                ))
            };
            let user_id = columns.user_id.remove(&key).ok_or_else(|| missing("user_id"))?;
            let article_id = columns
                .article_id
                .remove(&key)
                .ok_or_else(|| missing("article_id"))?;
            let similarity_score = columns
                .similarity_score
                .remove(&key)
                .ok_or_else(|| missing("similarity_score"))?;

            records.push(RecommendationRecord {
                user_id,
                article_id,
                similarity_score,
            });
        }

        Ok(Self { records })
    }

    /// Rows for one user, in table order
    pub fn for_user(&self, user_id: UserId) -> impl Iterator<Item = &RecommendationRecord> + '_ {
        self.records
            .iter()
            .filter(move |record| record.user_id == user_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_records() {
        let data = br#"[
            {"user_id": 1, "article_id": 30, "similarity_score": 0.7},
            {"user_id": 1, "article_id": 10, "similarity_score": 0.9},
            {"user_id": 2, "article_id": 11, "similarity_score": 0.5}
        ]"#;

        let table = RecommendationTable::from_json(data).unwrap();

        assert_eq!(table.len(), 3);
        let ids: Vec<_> = table.for_user(1).map(|r| r.article_id).collect();
        assert_eq!(ids, vec![30, 10]);
    }

    #[test]
    fn test_from_json_columns_orders_by_numeric_index() {
        let data = br#"{
            "user_id": {"10": 3, "2": 1, "0": 1},
            "article_id": {"10": 99, "2": 20, "0": 10},
            "similarity_score": {"10": 0.1, "2": 0.8, "0": 0.6}
        }"#;

        let table = RecommendationTable::from_json(data).unwrap();

        let ids: Vec<_> = table.records.iter().map(|r| r.article_id).collect();
        assert_eq!(ids, vec![10, 20, 99]);
        assert_eq!(table.records[1].similarity_score, 0.8);
    }

    #[test]
    fn test_from_json_columns_missing_cell() {
        let data = br#"{
            "user_id": {"0": 1, "1": 2},
            "article_id": {"0": 10},
            "similarity_score": {"0": 0.6, "1": 0.2}
        }"#;

        let err = RecommendationTable::from_json(data).unwrap_err();
        assert!(err.to_string().contains("article_id"));
    }

    #[test]
    fn test_from_json_rejects_scalars() {
        assert!(RecommendationTable::from_json(b"42").is_err());
        assert!(RecommendationTable::from_json(b"not json").is_err());
    }
}
