use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_LIST_LIMIT: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TroubleshootRequest {
    pub equipment_type: String,
    pub symptom: String,
    /// Field measurements such as `{"voltage": 120, "breaker_tripped": true}`.
    /// Accepted but not consulted by the rule lookup.
    #[serde(default)]
    pub readings: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TroubleshootStep {
    pub title: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TroubleshootResponse {
    pub probable_causes: Vec<String>,
    pub safety_notes: Vec<String>,
    pub steps: Vec<TroubleshootStep>,
    pub next_actions: Vec<String>,
}

/// A field report submitted by a technician.
///
/// Only the fields the service searches or displays are named; anything else the client
/// sends is kept in `extra` and stored verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equipment_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symptom: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readings: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A stored report as returned by listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub report: IssueReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateIssueResponse {
    pub id: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListIssuesParams {
    /// Case-insensitive substring matched against notes, symptom and location.
    pub q: Option<String>,
    /// Maximum number of records (default: 50, 0 for no cap).
    #[serde(default = "default_list_limit")]
    pub limit: usize,
}

fn default_list_limit() -> usize {
    DEFAULT_LIST_LIMIT
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListIssuesResponse {
    pub items: Vec<IssueRecord>,
}

/// Connectivity report served by the diagnostic endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseStatusResponse {
    pub backend: String,
    pub database: String,
    pub database_url: Option<String>,
    pub database_name: Option<String>,
    pub connection_status: String,
    pub collections: Vec<String>,
}
