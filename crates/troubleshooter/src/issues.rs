/// Issue report storage.
///
/// `IssueStore` is the only thing the HTTP layer knows about persistence. Backends keep
/// reports as schemaless documents with a store-owned `_id`; records leave the store with
/// that id exposed as `id`.
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, warn};

use troubleshoot_common::document::{document_id, expose_id, new_document, Document};
use troubleshoot_common::error::CommonError;
use troubleshoot_common::http_api::{IssueRecord, IssueReport};
use troubleshoot_common::redis::RedisDocumentStore;

use crate::config::Config;

pub const ISSUE_COLLECTION: &str = "issuereport";

const MEMORY_URL_SCHEME: &str = "memory://";
const SEARCH_FIELDS: [&str; 3] = ["notes", "symptom", "location"];

/// Filter and cap for listing reports.
#[derive(Debug, Clone, Default)]
pub struct IssueQuery {
    /// Lowercased search text; `None` matches every report.
    text: Option<String>,
    limit: Option<usize>,
}

impl IssueQuery {
    /// An empty `text` matches everything. A `limit` of 0 means no cap.
    pub fn new(text: Option<&str>, limit: usize) -> Self {
        Self {
            text: text.filter(|t| !t.is_empty()).map(str::to_lowercase),
            limit: (limit > 0).then_some(limit),
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// True when any of notes, symptom or location contains the search text,
    /// ignoring case. Non-string values never match.
    pub fn matches(&self, doc: &Document) -> bool {
        let Some(text) = &self.text else {
            return true;
        };
        SEARCH_FIELDS.iter().any(|field| {
            doc.get(*field)
                .and_then(Value::as_str)
                .is_some_and(|value| value.to_lowercase().contains(text.as_str()))
        })
    }
}

#[async_trait]
pub trait IssueStore: Send + Sync {
    /// Short backend name for diagnostics.
    fn backend(&self) -> &'static str;

    fn database_name(&self) -> Option<&str>;

    /// Persist a report and return its store-assigned id.
    async fn create(&self, report: &IssueReport) -> Result<String, CommonError>;

    /// Reports matching `query`, in insertion order.
    async fn list(&self, query: &IssueQuery) -> Result<Vec<IssueRecord>, CommonError>;

    async fn ping(&self) -> Result<(), CommonError>;

    async fn collection_names(&self, limit: usize) -> Result<Vec<String>, CommonError>;
}

/// Pick a backend from configuration. `None` leaves issue storage unconfigured.
pub fn open_store(config: &Config) -> Option<Arc<dyn IssueStore>> {
    let Some(url) = config.database_url.as_deref() else {
        info!("DATABASE_URL not set, issue storage disabled");
        return None;
    };

    if url.starts_with(MEMORY_URL_SCHEME) {
        info!("using in-memory issue store");
        return Some(Arc::new(MemoryIssueStore::new()));
    }

    let Some(database) = config.database_name.as_deref() else {
        warn!("DATABASE_NAME not set, issue storage disabled");
        return None;
    };

    match RedisDocumentStore::open(url, database) {
        Ok(docs) => Some(Arc::new(RedisIssueStore::new(docs))),
        Err(e) => {
            warn!(error = %e, "issue storage disabled");
            None
        }
    }
}

fn into_record(doc: Document) -> Result<IssueRecord, CommonError> {
    let public = expose_id(doc)?;
    Ok(serde_json::from_value(Value::Object(public))?)
}

/// The record for `doc` if it matches `query`. Matching documents that do not convert
/// are logged and dropped, so they never count against the limit.
fn matching_record(query: &IssueQuery, doc: &Document) -> Option<IssueRecord> {
    if !query.matches(doc) {
        return None;
    }
    into_record(doc.clone())
        .inspect_err(|e| warn!(error = %e, "skipping malformed issue record"))
        .ok()
}

pub struct RedisIssueStore {
    docs: RedisDocumentStore,
}

impl RedisIssueStore {
    pub fn new(docs: RedisDocumentStore) -> Self {
        Self { docs }
    }
}

#[async_trait]
impl IssueStore for RedisIssueStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    fn database_name(&self) -> Option<&str> {
        Some(self.docs.database())
    }

    async fn create(&self, report: &IssueReport) -> Result<String, CommonError> {
        let doc = new_document(report)?;
        self.docs.insert(ISSUE_COLLECTION, &doc).await
    }

    async fn list(&self, query: &IssueQuery) -> Result<Vec<IssueRecord>, CommonError> {
        self.docs
            .find_map(
                ISSUE_COLLECTION,
                |doc| matching_record(query, doc),
                query.limit(),
            )
            .await
    }

    async fn ping(&self) -> Result<(), CommonError> {
        self.docs.ping().await
    }

    async fn collection_names(&self, limit: usize) -> Result<Vec<String>, CommonError> {
        self.docs.collection_names(limit).await
    }
}

/// Process-local store. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryIssueStore {
    docs: Mutex<Vec<Document>>,
}

impl MemoryIssueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IssueStore for MemoryIssueStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn database_name(&self) -> Option<&str> {
        None
    }

    async fn create(&self, report: &IssueReport) -> Result<String, CommonError> {
        let doc = new_document(report)?;
        let id = document_id(&doc)
            .ok_or_else(|| CommonError::InvalidDocument("document has no _id".to_string()))?
            .to_string();
        self.docs.lock().await.push(doc);
        Ok(id)
    }

    async fn list(&self, query: &IssueQuery) -> Result<Vec<IssueRecord>, CommonError> {
        let docs = self.docs.lock().await;
        let records = docs.iter().filter_map(|doc| matching_record(query, doc));
        Ok(match query.limit() {
            Some(limit) => records.take(limit).collect(),
            None => records.collect(),
        })
    }

    async fn ping(&self) -> Result<(), CommonError> {
        Ok(())
    }

    async fn collection_names(&self, limit: usize) -> Result<Vec<String>, CommonError> {
        let empty = self.docs.lock().await.is_empty();
        Ok(if empty || limit == 0 {
            Vec::new()
        } else {
            vec![ISSUE_COLLECTION.to_string()]
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// A configured store whose backend is down.
    pub struct UnreachableIssueStore;

    fn down() -> CommonError {
        let refused = std::io::Error::from(std::io::ErrorKind::ConnectionRefused);
        CommonError::Redis(redis::RedisError::from(refused))
    }

    #[async_trait]
    impl IssueStore for UnreachableIssueStore {
        fn backend(&self) -> &'static str {
            "unreachable"
        }

        fn database_name(&self) -> Option<&str> {
            Some("fieldwork")
        }

        async fn create(&self, _report: &IssueReport) -> Result<String, CommonError> {
            Err(down())
        }

        async fn list(&self, _query: &IssueQuery) -> Result<Vec<IssueRecord>, CommonError> {
            Err(down())
        }

        async fn ping(&self) -> Result<(), CommonError> {
            Err(down())
        }

        async fn collection_names(&self, _limit: usize) -> Result<Vec<String>, CommonError> {
            Err(down())
        }
    }

    /// A configured store that never answers a listing.
    pub struct StalledIssueStore;

    #[async_trait]
    impl IssueStore for StalledIssueStore {
        fn backend(&self) -> &'static str {
            "stalled"
        }

        fn database_name(&self) -> Option<&str> {
            Some("fieldwork")
        }

        async fn create(&self, _report: &IssueReport) -> Result<String, CommonError> {
            Err(down())
        }

        async fn list(&self, _query: &IssueQuery) -> Result<Vec<IssueRecord>, CommonError> {
            std::future::pending().await
        }

        async fn ping(&self) -> Result<(), CommonError> {
            Ok(())
        }

        async fn collection_names(&self, _limit: usize) -> Result<Vec<String>, CommonError> {
            Ok(Vec::new())
        }
    }
}
