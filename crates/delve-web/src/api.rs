//! REST API endpoint handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use delve_rs::error::{ConfigError, ResearchError};
use delve_rs::research::{LatestProgress, ResearchProgress, Researcher};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

/// Builds a fresh [`Researcher`] for each request.
pub type ResearcherFactory = Arc<dyn Fn() -> Result<Researcher, ConfigError> + Send + Sync>;

/// Shared application state passed to all handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub factory: ResearcherFactory,
    pub progress: LatestProgress,
}

fn default_budget() -> usize {
    3
}

/// Request body for POST /api/research.
#[derive(Debug, Deserialize)]
pub struct ResearchRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default = "default_budget")]
    pub depth: usize,
    #[serde(default = "default_budget")]
    pub breadth: usize,
}

/// Response body for a successful research run.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchResponse {
    pub success: bool,
    pub answer: String,
    pub learnings: Vec<String>,
    pub visited_urls: Vec<String>,
}

fn bad_request() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "Query is required" })),
    )
        .into_response()
}

fn server_error(message: impl std::fmt::Display) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": "An error occurred during research",
            "message": message.to_string(),
        })),
    )
        .into_response()
}

/// POST /api/research: Run a research tree and answer the query.
///
/// Returns 400 when the query is missing or blank and 500 when the
/// researcher cannot be configured.
pub async fn post_research(
    State(app): State<AppState>,
    Json(body): Json<ResearchRequest>,
) -> Response {
    let Some(query) = body.query.filter(|q| !q.trim().is_empty()) else {
        return bad_request();
    };

    let researcher = match (app.factory)() {
        Ok(r) => r.with_observer(Arc::new(app.progress.clone())),
        Err(e) => {
            error!("Error in research API: {e}");
            return server_error(e);
        }
    };

    info!("Starting research (breadth {}, depth {})", body.breadth, body.depth);
    app.progress.clear();
    let result = match researcher.research(&query, body.breadth, body.depth).await {
        Ok(result) => result,
        Err(ResearchError::EmptyQuery) => return bad_request(),
        Err(e) => {
            error!("Error in research API: {e}");
            return server_error(e);
        }
    };
    info!(
        "Learnings: {}, visited URLs: {}",
        result.learnings.len(),
        result.visited_urls.len()
    );

    let answer = researcher.write_answer(&query, &result.learnings).await;

    Json(ResearchResponse {
        success: true,
        answer,
        learnings: result.learnings,
        visited_urls: result.visited_urls,
    })
    .into_response()
}

/// GET /api/progress: Latest progress snapshot, or `null` before any run.
pub async fn get_progress(State(app): State<AppState>) -> Json<Option<ResearchProgress>> {
    Json(app.progress.get())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults_depth_and_breadth() {
        let req: ResearchRequest = serde_json::from_str(r#"{"query":"caffeine"}"#).unwrap();
        assert_eq!(req.query.as_deref(), Some("caffeine"));
        assert_eq!(req.depth, 3);
        assert_eq!(req.breadth, 3);
    }

    #[test]
    fn request_without_query_deserializes() {
        let req: ResearchRequest = serde_json::from_str(r#"{"depth":1}"#).unwrap();
        assert!(req.query.is_none());
        assert_eq!(req.depth, 1);
    }

    #[test]
    fn response_uses_camel_case() {
        let json = serde_json::to_value(ResearchResponse {
            success: true,
            answer: "42".into(),
            learnings: vec![],
            visited_urls: vec!["https://a".into()],
        })
        .unwrap();
        assert_eq!(json["visitedUrls"][0], "https://a");
        assert_eq!(json["success"], true);
    }
}
