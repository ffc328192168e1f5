/// Human-oriented store connectivity report for the `/test` endpoint.
///
/// Unlike the issue endpoints, this tells "not configured" apart from "configured but
/// failing". `connection_status` reads "Connected" only after a successful ping.
use tracing::warn;

use troubleshoot_common::error::CommonError;
use troubleshoot_common::http_api::DatabaseStatusResponse;

use crate::issues::IssueStore;

const MAX_COLLECTIONS: usize = 10;
const MAX_ERROR_CHARS: usize = 50;

pub async fn database_status(store: Option<&dyn IssueStore>) -> DatabaseStatusResponse {
    let mut report = DatabaseStatusResponse {
        backend: "Running".to_string(),
        database: "Not Available".to_string(),
        database_url: None,
        database_name: None,
        connection_status: "Not Connected".to_string(),
        collections: Vec::new(),
    };

    let Some(store) = store else {
        return report;
    };

    report.database_url = Some("Set".to_string());
    report.database_name = Some(store.database_name().unwrap_or("Not Set").to_string());

    if let Err(e) = store.ping().await {
        warn!(error = %e, backend = store.backend(), "issue store ping failed");
        report.database = connected_but_error(&e);
        return report;
    }

    report.database = "Connected & Working".to_string();
    report.connection_status = "Connected".to_string();

    match store.collection_names(MAX_COLLECTIONS).await {
        Ok(names) => report.collections = names,
        Err(e) => {
            warn!(error = %e, backend = store.backend(), "listing collections failed");
            report.database = connected_but_error(&e);
        }
    }

    report
}

fn connected_but_error(e: &CommonError) -> String {
    format!("Connected but Error: {}", truncate(&e.to_string()))
}

fn truncate(message: &str) -> String {
    message.chars().take(MAX_ERROR_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use troubleshoot_common::http_api::IssueReport;

    use super::*;
    use crate::issues::testing::UnreachableIssueStore;
    use crate::issues::{MemoryIssueStore, ISSUE_COLLECTION};

    #[tokio::test]
    async fn test_unconfigured_store() {
        let report = database_status(None).await;
        assert_eq!(report.backend, "Running");
        assert_eq!(report.database, "Not Available");
        assert_eq!(report.connection_status, "Not Connected");
        assert!(report.database_url.is_none());
        assert!(report.database_name.is_none());
        assert!(report.collections.is_empty());
    }

    #[tokio::test]
    async fn test_reachable_store_lists_collections() {
        let store = MemoryIssueStore::new();
        store.create(&IssueReport::default()).await.unwrap();

        let report = database_status(Some(&store as &dyn IssueStore)).await;
        assert_eq!(report.database, "Connected & Working");
        assert_eq!(report.connection_status, "Connected");
        assert_eq!(report.database_url.as_deref(), Some("Set"));
        assert_eq!(report.database_name.as_deref(), Some("Not Set"));
        assert_eq!(report.collections, vec![ISSUE_COLLECTION]);
    }

    #[tokio::test]
    async fn test_unreachable_store_reports_error() {
        let report = database_status(Some(&UnreachableIssueStore as &dyn IssueStore)).await;
        assert!(
            report.database.starts_with("Connected but Error: "),
            "{}",
            report.database
        );
        let detail = report.database.trim_start_matches("Connected but Error: ");
        assert!(detail.chars().count() <= 50);
        assert!(detail.starts_with("redis error"), "{detail}");
        assert_eq!(report.connection_status, "Not Connected");
        assert_eq!(report.database_url.as_deref(), Some("Set"));
        assert_eq!(report.database_name.as_deref(), Some("fieldwork"));
        assert!(report.collections.is_empty());
    }

    #[test]
    fn test_truncate_counts_characters() {
        let long = "é".repeat(80);
        assert_eq!(truncate(&long).chars().count(), 50);
        assert_eq!(truncate("short"), "short");
    }
}
