/// HTTP surface for the troubleshooter.
///
/// Routes:
/// - `GET /` and `GET /api/hello`: liveness messages
/// - `POST /api/troubleshoot`: rule lookup
/// - `POST /api/issues`, `GET /api/issues`: issue report storage
/// - `GET /test`: store connectivity report
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use troubleshoot_common::http_api::{
    CreateIssueResponse, DatabaseStatusResponse, IssueReport, ListIssuesParams,
    ListIssuesResponse, MessageResponse, TroubleshootRequest, TroubleshootResponse,
};

use crate::diagnostics;
use crate::error::AppError;
use crate::issues::{IssueQuery, IssueStore};
use crate::rules::RuleBook;

/// Shared, read-only application state. Cloned per request.
#[derive(Clone)]
pub struct AppState {
    rules: Arc<RuleBook>,
    issues: Option<Arc<dyn IssueStore>>,
}

impl AppState {
    pub fn new(rules: Arc<RuleBook>, issues: Option<Arc<dyn IssueStore>>) -> Self {
        Self { rules, issues }
    }

    fn issue_store(&self) -> Result<&dyn IssueStore, AppError> {
        self.issues.as_deref().ok_or(AppError::StoreNotConfigured)
    }
}

pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/hello", get(hello))
        .route("/api/troubleshoot", post(troubleshoot))
        .route("/api/issues", post(create_issue).get(list_issues))
        .route("/test", get(database_status))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

fn message(text: &str) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: text.to_string(),
    })
}

async fn root() -> Json<MessageResponse> {
    message("Electrician Troubleshooter API is running")
}

async fn hello() -> Json<MessageResponse> {
    message("Hello from the Electrician API!")
}

async fn troubleshoot(
    State(state): State<AppState>,
    Json(request): Json<TroubleshootRequest>,
) -> Json<TroubleshootResponse> {
    Json(state.rules.troubleshoot(
        &request.equipment_type,
        &request.symptom,
        request.readings.as_ref(),
    ))
}

async fn create_issue(
    State(state): State<AppState>,
    Json(report): Json<IssueReport>,
) -> Result<Json<CreateIssueResponse>, AppError> {
    let store = state.issue_store()?;
    let id = store.create(&report).await?;
    info!(id = %id, backend = store.backend(), "issue report saved");
    Ok(Json(CreateIssueResponse {
        id,
        message: "Issue report saved".to_string(),
    }))
}

async fn list_issues(
    State(state): State<AppState>,
    Query(params): Query<ListIssuesParams>,
) -> Result<Json<ListIssuesResponse>, AppError> {
    let store = state.issue_store()?;
    let query = IssueQuery::new(params.q.as_deref(), params.limit);
    let items = store.list(&query).await?;
    Ok(Json(ListIssuesResponse { items }))
}

async fn database_status(State(state): State<AppState>) -> Json<DatabaseStatusResponse> {
    Json(diagnostics::database_status(state.issues.as_deref()).await)
}
