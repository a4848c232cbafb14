use axum::{extract::State, Json};

use crate::{
    aggregation::{self, ComparisonEntry, FleetStats, SeriesView},
    api::models::ApiResponse,
    error::Result,
};

use super::AppState;

const COMPARISON_DAYS: u32 = 7;

/// Ranked comparison over every dormitory that has been collected at least once.
pub async fn build_comparison(state: &AppState) -> Result<Vec<ComparisonEntry>> {
    let mut views = Vec::new();
    for info in state.registry.infos() {
        let Some(latest) = state.store.latest(&info.id).await? else {
            continue;
        };
        let recent = state.store.history(&info.id, COMPARISON_DAYS).await?;
        views.push(SeriesView {
            info,
            latest,
            recent,
        });
    }

    Ok(aggregation::comparison(views))
}

/// GET /api/comparison
/// Dormitories ranked by current balance, highest first
pub async fn get_comparison(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ComparisonEntry>>>> {
    Ok(Json(ApiResponse::ok(build_comparison(&state).await?)))
}

/// GET /api/stats
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<ApiResponse<FleetStats>>> {
    let ids = state.registry.infos();
    let mut latest = Vec::with_capacity(ids.len());
    for info in &ids {
        if let Some(snapshot) = state.store.latest(&info.id).await? {
            latest.push(snapshot);
        }
    }

    Ok(Json(ApiResponse::ok(aggregation::fleet_stats(
        ids.len(),
        &latest,
        state.low_balance_threshold,
    ))))
}
