use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::{error, info, warn};

use crate::api_types::{
    AnalysisEnvelope, ConnectionReport, ErrorBody, HealthResponse, InlineAnalysisRequest,
    SheetAnalysisRequest,
};
use crate::error::{AnalysisError, FetchError};
use crate::fetch::{SheetsSource, DEFAULT_RANGE};
use crate::models::Record;
use crate::orchestrator::{run_analysis, Analysis, PipelineContext};

#[derive(Clone)]
pub struct AppState {
    pub ctx: PipelineContext,
    pub sheets: Option<SheetsSource>,
}

type ApiError = (StatusCode, Json<ErrorBody>);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/test-connection", get(test_connection))
        .route("/api/analyze-feedback", post(analyze_feedback))
        .route("/api/analyze", post(analyze_inline))
        .with_state(state)
}

pub async fn serve(state: AppState, bind: &str) -> Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {}", bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Feedback analyzer listening - addr=http://{}", addr);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not install Ctrl-C handler - error={}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody { error: message.into(), details: None }),
    )
}

fn analysis_failed(err: &AnalysisError) -> ApiError {
    error!("Analysis failed - error={}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody { error: "analysis failed".to_string(), details: Some(err.to_string()) }),
    )
}

fn envelope(records: &[Record], analysis: Analysis, metadata: serde_json::Value) -> AnalysisEnvelope {
    AnalysisEnvelope {
        success: !analysis.report.is_empty(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        total_responses: records.len(),
        degraded_stages: analysis.trace.fallbacks,
        analysis: analysis.report,
        sample_feedback: records.iter().take(3).cloned().collect(),
        metadata,
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        message: "Feedback analyzer is running".to_string(),
        services: json!({
            "embedder": state.ctx.embedder.name(),
            "google_sheets": if state.sheets.is_some() { "configured" } else { "not_configured" },
            "narrative_backend": "ready",
        }),
    })
}

async fn test_connection(State(state): State<AppState>) -> Json<ConnectionReport> {
    let google_sheets_connection = match &state.sheets {
        None => "not_configured",
        Some(sheets) if sheets.check_connection().await => "success",
        Some(_) => "failed",
    };
    info!("Connection test - google_sheets={}", google_sheets_connection);
    Json(ConnectionReport { google_sheets_connection, ai_service: "ready" })
}

async fn analyze_feedback(
    State(state): State<AppState>,
    Json(request): Json<SheetAnalysisRequest>,
) -> Result<Json<AnalysisEnvelope>, ApiError> {
    let spreadsheet_id = request
        .spreadsheet_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| bad_request("spreadsheet_id is required"))?;
    let range = request
        .range_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_RANGE);
    let sheets = state.sheets.as_ref().ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorBody { error: "Google Sheets access is not configured".to_string(), details: None }),
        )
    })?;

    info!("Analyzing sheet - id={}, range={}", spreadsheet_id, range);
    let records = sheets
        .fetch_range(spreadsheet_id, range)
        .await
        .map_err(|e| match e {
            FetchError::Http(_) | FetchError::Decode(_) => {
                warn!("Sheet fetch failed - error={}", e);
                bad_request(format!("Failed to fetch data from Google Sheets: {e}"))
            }
            other => bad_request(other.to_string()),
        })?;
    if records.is_empty() {
        return Err(bad_request("No feedback data found in the specified sheet/range"));
    }

    let analysis = run_analysis(&state.ctx, &records)
        .await
        .map_err(|e| analysis_failed(&e))?;
    let metadata = json!({ "spreadsheet_id": spreadsheet_id, "range_analyzed": range });
    Ok(Json(envelope(&records, analysis, metadata)))
}

async fn analyze_inline(
    State(state): State<AppState>,
    Json(request): Json<InlineAnalysisRequest>,
) -> Result<Json<AnalysisEnvelope>, ApiError> {
    let records: Vec<Record> = request
        .feedback
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    let analysis = run_analysis(&state.ctx, &records)
        .await
        .map_err(|e| analysis_failed(&e))?;
    let metadata = json!({ "source": "inline" });
    Ok(Json(envelope(&records, analysis, metadata)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::PipelineConfig;
    use crate::embed::HashingEmbedder;
    use crate::llm::SilentBackend;
    use crate::testing::{event_feedback, FailingEmbedder};

    fn state() -> AppState {
        AppState {
            ctx: PipelineContext::new(
                Arc::new(HashingEmbedder::default()),
                Arc::new(SilentBackend),
                PipelineConfig::default(),
            ),
            sheets: None,
        }
    }

    #[tokio::test]
    async fn inline_analysis_wraps_report() {
        let req = InlineAnalysisRequest { feedback: event_feedback() };
        let Json(env) = analyze_inline(State(state()), Json(req)).await.unwrap();
        assert!(env.success);
        assert_eq!(env.total_responses, 13);
        assert_eq!(env.sample_feedback.len(), 3);
        assert!(env.degraded_stages.iter().any(|s| s == "executive_summary"));
        assert_eq!(env.analysis.statistics.total_responses, 13);
    }

    #[tokio::test]
    async fn inline_empty_batch_is_unsuccessful_not_an_error() {
        let req = InlineAnalysisRequest { feedback: vec!["  ".into()] };
        let Json(env) = analyze_inline(State(state()), Json(req)).await.unwrap();
        assert!(!env.success);
        assert_eq!(env.analysis.summary, "No feedback data to analyze");
    }

    #[tokio::test]
    async fn missing_spreadsheet_id_is_bad_request() {
        let req = SheetAnalysisRequest { spreadsheet_id: Some(" ".into()), range_name: None };
        let (status, Json(body)) = analyze_feedback(State(state()), Json(req)).await.unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "spreadsheet_id is required");
    }

    #[tokio::test]
    async fn embedding_failure_is_500() {
        let mut st = state();
        st.ctx.embedder = Arc::new(FailingEmbedder);
        let req = InlineAnalysisRequest { feedback: event_feedback() };
        let (status, Json(body)) = analyze_inline(State(st), Json(req)).await.unwrap_err();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "analysis failed");
    }

    #[tokio::test]
    async fn connection_test_without_sheets_key() {
        let Json(report) = test_connection(State(state())).await;
        assert_eq!(report.google_sheets_connection, "not_configured");
        assert_eq!(report.ai_service, "ready");
    }

    #[tokio::test]
    async fn health_reports_services() {
        let Json(h) = health(State(state())).await;
        assert_eq!(h.status, "healthy");
        assert_eq!(h.services["google_sheets"], "not_configured");
        assert_eq!(h.services["embedder"], "hashing");
    }
}
