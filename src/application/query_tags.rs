//! Query tags use case

use crate::domain::{Submission, TagExpression, TagPolicy};
use crate::error::Result;
use crate::infrastructure::SubmissionStore;
use std::sync::Arc;

/// Service for selecting stored submissions by tag expression
pub struct QueryService {
    store: Arc<SubmissionStore>,
    policy: TagPolicy,
}

impl QueryService {
    pub fn new(store: Arc<SubmissionStore>, policy: TagPolicy) -> Self {
        QueryService { store, policy }
    }

    /// Parse `search` and return matching submissions sorted by key
    pub fn execute(&self, search: &str) -> Result<Vec<Submission>> {
        let expression = TagExpression::parse(search, self.policy)?;
        select(&self.store, &expression)
    }
}

/// Scan the store for submissions matching `expression`.
///
/// The scan itself is unordered; results are sorted for stable output.
pub(crate) fn select(
    store: &SubmissionStore,
    expression: &TagExpression,
) -> Result<Vec<Submission>> {
    let mut matched = store
        .scan(|submission| expression.matches(&submission.tags))
        .collect::<Result<Vec<_>>>()?;
    matched.sort_by_key(Submission::key);
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Service;
    use crate::error::RetaggerError;
    use chrono::Utc;

    fn store_with(entries: &[(Service, i64, Vec<&str>)]) -> Arc<SubmissionStore> {
        let store = SubmissionStore::open_in_memory().unwrap();
        for (service, id, tags) in entries {
            store
                .upsert(&Submission {
                    service: *service,
                    id: *id,
                    title: "test".to_string(),
                    posted_at: Utc::now(),
                    tags: tags.iter().map(|t| t.to_string()).collect(),
                })
                .unwrap();
        }
        Arc::new(store)
    }

    fn ids(submissions: &[Submission]) -> Vec<i64> {
        submissions.iter().map(|s| s.id).collect()
    }

    #[test]
    fn test_query_submissions() {
        let store = store_with(&[
            (Service::FurAffinity, 1, vec!["tag1", "tag2"]),
            (Service::FurAffinity, 2, vec!["tag3"]),
            (Service::FurAffinity, 3, vec!["tag1", "tag4"]),
        ]);
        let service = QueryService::new(store, TagPolicy::default());

        assert_eq!(ids(&service.execute("tag1 -tag4").unwrap()), vec![1]);
        assert_eq!(ids(&service.execute("tag1 tag2").unwrap()), vec![1]);
        assert_eq!(ids(&service.execute("tag1").unwrap()), vec![1, 3]);
        assert_eq!(ids(&service.execute("").unwrap()), vec![1, 2, 3]);
        assert!(service.execute("missing").unwrap().is_empty());
    }

    #[test]
    fn test_results_sorted_by_service_then_id() {
        let store = store_with(&[
            (Service::Weasyl, 2, vec!["x"]),
            (Service::FurAffinity, 9, vec!["x"]),
            (Service::Weasyl, 1, vec!["x"]),
        ]);
        let matched = QueryService::new(store, TagPolicy::default())
            .execute("x")
            .unwrap();

        let keys: Vec<String> = matched.iter().map(|s| s.key().to_string()).collect();
        assert_eq!(keys, vec!["FurAffinity-9", "Weasyl-1", "Weasyl-2"]);
    }

    #[test]
    fn test_parse_error_surfaces() {
        let service = QueryService::new(store_with(&[]), TagPolicy::default());
        assert!(matches!(
            service.execute("good -"),
            Err(RetaggerError::Parse(_))
        ));
    }
}
