use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};
use url::Url;

use crate::api_types::ValueRange;
use crate::error::FetchError;
use crate::models::Record;

pub const DEFAULT_RANGE: &str = "Sheet1!A:B";
const SHEETS_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Yields the raw feedback strings behind a source reference, in order.
#[async_trait]
pub trait FeedbackSource: Send + Sync {
    async fn fetch(&self, source_ref: &str) -> Result<Vec<Record>, FetchError>;
}

/// Google Sheets values API with API-key auth.
#[derive(Clone)]
pub struct SheetsSource {
    client: Client,
    api_key: String,
    base_url: String,
    range: String,
}

impl SheetsSource {
    pub fn new(client: Client, api_key: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            base_url: SHEETS_BASE.to_string(),
            range: DEFAULT_RANGE.to_string(),
        }
    }

    pub fn with_range(mut self, range: &str) -> Self {
        self.range = range.to_string();
        self
    }

    pub fn values_url(&self, spreadsheet_id: &str, range: &str) -> Result<Url, FetchError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| FetchError::Decode(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| FetchError::Decode(format!("base url cannot hold a path: {}", self.base_url)))?
            .extend([spreadsheet_id, "values", range]);
        url.query_pairs_mut()
            .append_pair("key", &self.api_key)
            .append_pair("majorDimension", "ROWS");
        Ok(url)
    }

    /// True when the Sheets API answers an authenticated request with a success status.
    pub async fn check_connection(&self) -> bool {
        let url = match Url::parse_with_params(&self.base_url, &[("key", self.api_key.as_str())]) {
            Ok(url) => url,
            Err(e) => {
                warn!("Invalid Sheets base url - error={}", e);
                return false;
            }
        };
        match self.client.get(url).send().await {
            Ok(resp) => {
                debug!("Sheets connection check - status={}", resp.status());
                resp.status().is_success()
            }
            Err(e) => {
                warn!("Sheets connection check failed - error={}", e);
                false
            }
        }
    }

    /// Fetch one range of one spreadsheet.
    pub async fn fetch_range(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Record>, FetchError> {
        let start = std::time::Instant::now();
        let url = self.values_url(spreadsheet_id, range)?;
        debug!("Fetching sheet - id={}, range={}", spreadsheet_id, range);

        let resp = self.client.get(url).send().await?;
        match resp.status() {
            StatusCode::NOT_FOUND => {
                warn!("Spreadsheet not found (404) - id={}", spreadsheet_id);
                return Err(FetchError::NotFound(format!(
                    "spreadsheet {spreadsheet_id} not found, check the spreadsheet id"
                )));
            }
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                warn!("Spreadsheet access denied - id={}", spreadsheet_id);
                return Err(FetchError::Access(
                    "make sure the Google Sheet is publicly accessible".to_string(),
                ));
            }
            _ => {}
        }
        let body: ValueRange = resp.error_for_status()?.json().await?;
        let records = extract_feedback_column(&body.values);

        info!(
            "Sheet fetch completed - id={}, duration={:.2}s, records={}",
            spreadsheet_id,
            start.elapsed().as_secs_f32(),
            records.len()
        );
        Ok(records)
    }
}

#[async_trait]
impl FeedbackSource for SheetsSource {
    async fn fetch(&self, source_ref: &str) -> Result<Vec<Record>, FetchError> {
        self.fetch_range(source_ref, &self.range).await
    }
}

/// Trimmed, non-empty cells of the feedback column, header excluded.
///
/// The column is the first header containing "feedback" (any case), else the
/// last header column. A header with no data rows yields nothing.
pub fn extract_feedback_column(values: &[Vec<String>]) -> Vec<Record> {
    let Some((header, rows)) = values.split_first() else {
        return Vec::new();
    };
    let col = header
        .iter()
        .position(|h| h.to_lowercase().contains("feedback"))
        .unwrap_or_else(|| {
            let last = header.len().saturating_sub(1);
            debug!("No feedback header, using column {}", last);
            last
        });
    rows.iter()
        .filter_map(|row| row.get(col))
        .map(|cell| cell.trim())
        .filter(|cell| !cell.is_empty())
        .map(str::to_string)
        .collect()
}

/// Local file: a JSON array of strings, otherwise one record per non-blank line.
#[derive(Debug, Clone, Default)]
pub struct FileSource;

#[async_trait]
impl FeedbackSource for FileSource {
    async fn fetch(&self, source_ref: &str) -> Result<Vec<Record>, FetchError> {
        let path = PathBuf::from(source_ref);
        let text = tokio::fs::read_to_string(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FetchError::NotFound(path.display().to_string()),
            _ => FetchError::Access(format!("{}: {}", path.display(), e)),
        })?;
        let records = parse_records(&text)?;
        info!("File read - path={}, records={}", path.display(), records.len());
        Ok(records)
    }
}

pub fn parse_records(text: &str) -> Result<Vec<Record>, FetchError> {
    if text.trim_start().starts_with('[') {
        let items: Vec<String> =
            serde_json::from_str(text).map_err(|e| FetchError::Decode(e.to_string()))?;
        return Ok(items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect());
    }
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}
