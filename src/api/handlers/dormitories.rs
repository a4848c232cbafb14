use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::{
    aggregation::{self, DailyConsumption, HourlyBucket, MonthlySummary},
    api::models::{ApiResponse, RegisterDormitoryRequest, WindowQuery},
    collector::EntityReport,
    error::{AppError, Result},
    models::Snapshot,
    registry::{Credentials, Dormitory, DormitoryInfo},
};

use super::{fleet::build_comparison, AppState};

const HISTORY_DAYS: u32 = 30;
const HOURLY_DAYS: u32 = 7;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub dormitory: DormitoryInfo,
    pub collection: EntityReport,
}

/// GET /api/dormitories
/// Lists monitored dormitories without their credentials
pub async fn list_dormitories(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<DormitoryInfo>>>> {
    Ok(Json(ApiResponse::ok(state.registry.infos())))
}

/// POST /api/dormitories
/// Registers a dormitory and collects its first snapshot before answering
pub async fn register_dormitory(
    State(state): State<AppState>,
    body: std::result::Result<Json<RegisterDormitoryRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<RegistrationResponse>>)> {
    let Json(request) = body?;
    let dormitory = Dormitory::from(request);
    let info = DormitoryInfo::from(&dormitory);

    state.registry.add(dormitory)?;
    let collection = state.collector.collect_one(&info.id).await?;

    let message = if collection.is_failure() {
        "Dormitory added, first collection failed"
    } else {
        "Dormitory added"
    };

    Ok((
        StatusCode::CREATED,
        Json(
            ApiResponse::ok(RegistrationResponse {
                dormitory: info,
                collection,
            })
            .with_message(message),
        ),
    ))
}

/// GET /api/dormitories/{id}/latest
pub async fn get_latest(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Snapshot>>> {
    state.dormitory(&id)?;
    let latest = state
        .store
        .latest(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No data collected yet for {}", id)))?;

    Ok(Json(ApiResponse::ok(latest)))
}

/// GET /api/dormitories/{id}/history?days=30
pub async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<ApiResponse<Vec<Snapshot>>>> {
    state.dormitory(&id)?;
    let history = state
        .store
        .history(&id, query.days_or(HISTORY_DAYS))
        .await?;

    Ok(Json(ApiResponse::ok(history)))
}

/// GET /api/dormitories/{id}/hourly?days=7
/// Returns 24 hour-of-day buckets
pub async fn get_hourly(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<ApiResponse<Vec<HourlyBucket>>>> {
    state.dormitory(&id)?;
    let history = state.store.history(&id, query.days_or(HOURLY_DAYS)).await?;

    Ok(Json(ApiResponse::ok(aggregation::hourly_profile(&history))))
}

/// GET /api/dormitories/{id}/daily?days=30
pub async fn get_daily(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<ApiResponse<Vec<DailyConsumption>>>> {
    state.dormitory(&id)?;
    let history = state
        .store
        .history(&id, query.days_or(HISTORY_DAYS))
        .await?;

    Ok(Json(ApiResponse::ok(aggregation::daily_consumption(&history))))
}

/// GET /api/dormitories/{id}/summary?days=30
pub async fn get_summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<ApiResponse<MonthlySummary>>> {
    state.dormitory(&id)?;
    let latest = state
        .store
        .latest(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No data collected yet for {}", id)))?;
    let history = state
        .store
        .history(&id, query.days_or(HISTORY_DAYS))
        .await?;
    let ranking = build_comparison(&state).await?;

    Ok(Json(ApiResponse::ok(aggregation::monthly_summary(
        &latest, &history, &ranking,
    ))))
}

/// PUT /api/dormitories/{id}/credentials
pub async fn update_credentials(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: std::result::Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<ApiResponse<()>>> {
    let Json(credentials) = body?;
    state.registry.rotate_credentials(&id, credentials)?;

    Ok(Json(ApiResponse::message("Credentials updated")))
}
