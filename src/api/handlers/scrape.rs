use axum::{body::Bytes, extract::State, Json};
use serde::Serialize;

use crate::{
    api::models::{ApiResponse, ScrapeRequest},
    collector::{EntityReport, RunSummary},
    error::{AppError, Result},
};

use super::AppState;

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ScrapeResult {
    One(EntityReport),
    All(RunSummary),
}

/// POST /api/scrape
/// Runs a collection now, for one dormitory or all of them
pub async fn trigger_scrape(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ApiResponse<ScrapeResult>>> {
    let request: ScrapeRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ScrapeRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::Validation(format!("Invalid request body: {}", e)))?
    };

    let result = match request.dormitory_id.filter(|id| !id.is_empty()) {
        Some(id) => ScrapeResult::One(state.collector.collect_one(&id).await?),
        None => ScrapeResult::All(state.collector.run_all().await),
    };

    Ok(Json(ApiResponse::ok(result)))
}
