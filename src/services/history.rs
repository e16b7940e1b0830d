use std::collections::HashSet;

use tracing::instrument;

use crate::models::{ArticleId, ClickTable, UserId};

/// Reading history of a user.
///
/// Returns the distinct articles the user clicked, in order of first
/// appearance in the click table, and the last of them. The "last article"
/// is positional: it is the final entry of the de-duplicated list, not the
/// click with the latest timestamp.
#[instrument(skip(clicks))]
pub fn user_history(user_id: UserId, clicks: &ClickTable) -> (Vec<ArticleId>, Option<ArticleId>) {
    let mut seen = HashSet::new();
    let history: Vec<ArticleId> = clicks
        .articles_for(user_id)
        .filter(|article_id| seen.insert(*article_id))
        .collect();

    if history.is_empty() {
        tracing::warn!(user_id, "User not found in click sample");
        return (history, None);
    }

    let last_article = history.last().copied();
    tracing::info!(user_id, history = ?history, "User history found");

    (history, last_article)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClickRecord;

    fn clicks(rows: &[(UserId, ArticleId)]) -> ClickTable {
        ClickTable::new(
            rows.iter()
                .map(|&(user_id, click_article_id)| ClickRecord {
                    user_id,
                    click_article_id,
                })
                .collect(),
        )
    }

    #[test]
    fn test_history_dedups_in_first_occurrence_order() {
        let table = clicks(&[(42, 10), (7, 99), (42, 20), (42, 10), (42, 30)]);

        let (history, last) = user_history(42, &table);

        assert_eq!(history, vec![10, 20, 30]);
        assert_eq!(last, Some(30));
    }

    #[test]
    fn test_last_article_is_positional() {
        // 10 is clicked again at the end but keeps its first position
        let table = clicks(&[(1, 10), (1, 20), (1, 10)]);

        let (history, last) = user_history(1, &table);

        assert_eq!(history, vec![10, 20]);
        assert_eq!(last, Some(20));
    }

    #[test]
    fn test_unknown_user() {
        let table = clicks(&[(1, 10)]);
        assert_eq!(user_history(999, &table), (vec![], None));
        assert_eq!(user_history(1, &ClickTable::default()).0, Vec::<ArticleId>::new());
    }
}
