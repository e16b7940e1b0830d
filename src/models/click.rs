use serde::{Deserialize, Serialize};

use super::{ArticleId, UserId};
use crate::error::{AppError, AppResult};

/// One row of the click sample. Columns other than these two are ignored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClickRecord {
    pub user_id: UserId,
    pub click_article_id: ArticleId,
}

/// Click sample, rows kept in file order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClickTable {
    pub records: Vec<ClickRecord>,
}

impl ClickTable {
    pub fn new(records: Vec<ClickRecord>) -> Self {
        Self { records }
    }

    /// Parses a comma-separated click sample with a header row
    pub fn from_csv(data: &[u8]) -> AppResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b',')
            .has_headers(true)
            .from_reader(data);

        let records = reader
            .deserialize::<ClickRecord>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::DataUnavailable(format!("click sample: {}", e)))?;

        Ok(Self { records })
    }

    /// Clicked articles of a user, in table order, duplicates included
    pub fn articles_for(&self, user_id: UserId) -> impl Iterator<Item = ArticleId> + '_ {
        self.records
            .iter()
            .filter(move |record| record.user_id == user_id)
            .map(|record| record.click_article_id)
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
    fn test_from_csv_ignores_extra_columns() {
        let data = b"user_id,session_id,session_start,click_article_id,click_timestamp\n\
0,1506825423271737,1506825423000,157541,1506826828020\n\
0,1506825423271737,1506825423000,68866,1506826858020\n\
1,1506825426267738,1506825426000,235840,1506827017951\n";

        let table = ClickTable::from_csv(data).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(
            table.records[1],
            ClickRecord {
                user_id: 0,
                click_article_id: 68866
            }
        );
        assert_eq!(table.articles_for(1).collect::<Vec<_>>(), vec![235840]);
    }

    #[test]
    fn test_from_csv_rejects_malformed_rows() {
        let data = b"user_id,click_article_id\n1,abc\n";
        let err = ClickTable::from_csv(data).unwrap_err();
        assert!(matches!(err, AppError::DataUnavailable(_)));
    }

    #[test]
    fn test_from_csv_missing_column() {
        let data = b"user_id,article\n1,2\n";
        assert!(ClickTable::from_csv(data).is_err());
    }
}
