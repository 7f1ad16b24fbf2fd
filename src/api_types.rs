use serde::{Deserialize, Serialize};

use crate::models::AnalysisReport;

/// Sheets `spreadsheets.values.get` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueRange {
    #[serde(default)]
    pub range: String,                   // "Sheet1!A1:B40"
    #[serde(default)]
    pub major_dimension: String,         // "ROWS"
    #[serde(default)]
    pub values: Vec<Vec<String>>,        // header row first
}

#[derive(Debug, Clone, Deserialize)]
pub struct SheetAnalysisRequest {
    #[serde(default)]
    pub spreadsheet_id: Option<String>,
    #[serde(default)]
    pub range_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InlineAnalysisRequest {
    #[serde(default)]
    pub feedback: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisEnvelope {
    pub success: bool,
    pub timestamp: String,               // RFC 3339, UTC
    pub total_responses: usize,
    pub analysis: AnalysisReport,
    pub degraded_stages: Vec<String>,
    pub sample_feedback: Vec<String>,    // first 3 records
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: String,
    pub services: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionReport {
    pub google_sheets_connection: &'static str, // "success" | "failed" | "not_configured"
    pub ai_service: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
