// HTTP request handlers
use crate::application::result_cache::CacheControl;
use crate::application::scheduler::ScheduleError;
use crate::domain::error::ForecastError;
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

const MAX_HISTORY_LIMIT: usize = 50;

/// JSON error body: `{error, message, details}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    message: String,
    details: Value,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: "bad_request",
            message: message.into(),
            details: Value::Null,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.error,
            "message": self.message,
            "details": self.details,
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<ForecastError> for ApiError {
    fn from(err: ForecastError) -> Self {
        let status = match err {
            ForecastError::UnknownLocation(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            error: err.kind(),
            message: err.to_string(),
            details: Value::Null,
        }
    }
}

impl From<ScheduleError> for ApiError {
    fn from(err: ScheduleError) -> Self {
        let ScheduleError::InvalidTime { hour, minute } = err;
        Self {
            details: json!({ "hour": hour, "minute": minute }),
            ..Self::bad_request(err.to_string())
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ForecastError>() {
            Ok(forecast_err) => forecast_err.into(),
            Err(err) => {
                tracing::error!("Request failed: {:#}", err);
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    error: "internal_error",
                    message: format!("{err:#}"),
                    details: Value::Null,
                }
            }
        }
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct RunModelQuery {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct TriggerQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    pub hour: u32,
    #[serde(default)]
    pub minute: u32,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn list_locations(State(state): State<Arc<AppState>>) -> Json<Value> {
    let locations = state.prediction_service.list_locations();
    Json(json!({ "locations": locations, "count": locations.len() }))
}

pub async fn analysis_all(State(state): State<Arc<AppState>>) -> ApiResult {
    let batch = state.prediction_service.get_forecast(None).await?;
    Ok(Json(json!(batch.as_ref())))
}

pub async fn analysis_one(Path(id): Path<String>, State(state): State<Arc<AppState>>) -> ApiResult {
    let batch = state.prediction_service.get_forecast(Some(&id)).await?;
    let forecast = batch
        .get(&id)
        .ok_or_else(|| ForecastError::UnknownLocation(id.clone()))?;
    Ok(Json(json!(forecast)))
}

pub async fn current_all(State(state): State<Arc<AppState>>) -> ApiResult {
    let snapshots = state.prediction_service.get_current(None).await?;
    Ok(Json(json!({ "locations": snapshots, "timestamp": Utc::now() })))
}

pub async fn current_one(Path(id): Path<String>, State(state): State<Arc<AppState>>) -> ApiResult {
    let snapshots = state.prediction_service.get_current(Some(&id)).await?;
    let snapshot = snapshots
        .into_iter()
        .next()
        .ok_or_else(|| ForecastError::UnknownLocation(id.clone()))?;
    Ok(Json(json!(snapshot)))
}

pub async fn retrain_all(State(state): State<Arc<AppState>>) -> ApiResult {
    let removed = state.prediction_service.retrain(None).await?;
    Ok(Json(json!({ "message": "All models cleared", "models_cleared": removed })))
}

pub async fn retrain_one(Path(id): Path<String>, State(state): State<Arc<AppState>>) -> ApiResult {
    let removed = state.prediction_service.retrain(Some(&id)).await?;
    Ok(Json(json!({
        "message": format!("Model for {id} cleared"),
        "location_id": id,
        "models_cleared": removed,
    })))
}

pub async fn reef_data(Path(id): Path<String>, State(state): State<Arc<AppState>>) -> ApiResult {
    let data = state.reef_data_service.reef_data(&id).await?;
    Ok(Json(json!(data)))
}

pub async fn data_status(State(state): State<Arc<AppState>>) -> ApiResult {
    let files = state.reef_data_service.data_status().await?;
    Ok(Json(json!({ "files": files, "timestamp": Utc::now() })))
}

pub async fn system_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let cached_models = state.prediction_service.cached_models().await;
    Json(json!({
        "execution": state.scheduler.execution_status(),
        "current_execution": state.guard.current_execution(),
        "circuit_breaker": state.guard.breaker(),
        "scheduler": state.scheduler.status(),
        "cached_models": cached_models,
        "timestamp": Utc::now(),
    }))
}

pub async fn run_model(Query(query): Query<RunModelQuery>, State(state): State<Arc<AppState>>) -> Json<Value> {
    let report = state.guard.trigger_execution(query.force).await;
    Json(json!(report))
}

pub async fn cache_info(State(state): State<Arc<AppState>>) -> Json<Value> {
    let info = state.prediction_service.cache_info().await;
    Json(json!({ "cache_info": info, "timestamp": Utc::now() }))
}

pub async fn clear_cache(State(state): State<Arc<AppState>>) -> Json<Value> {
    let cleared = state.prediction_service.clear_cache().await;
    Json(json!({ "message": "Cache cleared successfully", "entries_cleared": cleared, "timestamp": Utc::now() }))
}

pub async fn scheduler_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "status": "success", "scheduler": state.scheduler.status(), "timestamp": Utc::now() }))
}

pub async fn scheduler_history(Query(query): Query<HistoryQuery>, State(state): State<Arc<AppState>>) -> ApiResult {
    let limit = query.limit.unwrap_or(10);
    if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
        return Err(ApiError::bad_request(format!("Limit must be between 1 and {MAX_HISTORY_LIMIT}")));
    }
    let history = state.scheduler.job_history(limit);
    Ok(Json(json!({ "status": "success", "count": history.len(), "history": history })))
}

pub async fn scheduler_trigger(Query(query): Query<TriggerQuery>, State(state): State<Arc<AppState>>) -> Json<Value> {
    let report = state.scheduler.trigger_now(query.user_id).await;
    Json(json!({ "status": "success", "message": "Model execution triggered", "job_result": report }))
}

pub async fn scheduler_reschedule(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RescheduleRequest>,
) -> ApiResult {
    let schedule = state.scheduler.reschedule(request.hour, request.minute)?;
    Ok(Json(json!({
        "status": "success",
        "schedule": schedule,
        "next_run": state.scheduler.next_run(),
    })))
}

pub async fn scheduler_pause(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.scheduler.pause();
    Json(json!({ "status": "success", "message": "Daily model run paused" }))
}

pub async fn scheduler_resume(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.scheduler.resume();
    Json(json!({ "status": "success", "message": "Daily model run resumed", "next_run": state.scheduler.next_run() }))
}
