// HTTP routing
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::*;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/locations", get(list_locations))
        .route("/temperature/analysis", get(analysis_all))
        .route("/temperature/analysis/:id", get(analysis_one))
        .route("/temperature/current", get(current_all))
        .route("/temperature/current/:id", get(current_one))
        .route("/temperature/retrain", post(retrain_all))
        .route("/temperature/retrain/:id", post(retrain_one))
        .route("/reef-data/:id", get(reef_data))
        .route("/data/status", get(data_status))
        .route("/status", get(system_status))
        .route("/run-model", post(run_model))
        .route("/cache", get(cache_info))
        .route("/cache/clear", post(clear_cache))
        .route("/scheduler/status", get(scheduler_status))
        .route("/scheduler/history", get(scheduler_history))
        .route("/scheduler/trigger", post(scheduler_trigger))
        .route("/scheduler/reschedule", post(scheduler_reschedule))
        .route("/scheduler/pause", post(scheduler_pause))
        .route("/scheduler/resume", post(scheduler_resume))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::execution_guard::testing::ScriptedRunner;
    use crate::application::execution_guard::{ExecutionGuard, COOLDOWN_ACTIVE};
    use crate::application::forecast_store::testing::MemoryStore;
    use crate::application::prediction_service::testing::{recent_archive, service_with};
    use crate::application::reef_data_service::ReefDataService;
    use crate::application::result_cache::CacheControl;
    use crate::application::scheduler::Scheduler;
    use crate::domain::location::default_locations;
    use crate::infrastructure::config::{ExecutionSettings, SchedulerSettings};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app() -> Router {
        let prediction_service = Arc::new(service_with(recent_archive()));
        let caches: Vec<Arc<dyn CacheControl>> = vec![prediction_service.clone()];
        let guard = Arc::new(ExecutionGuard::from_settings(
            Arc::new(ScriptedRunner::new(Duration::ZERO)),
            &ExecutionSettings::default(),
            caches,
        ));
        let scheduler = Arc::new(Scheduler::new(guard.clone(), &SchedulerSettings::default()).unwrap());
        let reef_data_service = Arc::new(ReefDataService::new(
            Arc::new(MemoryStore::new()),
            default_locations(),
            29.0,
        ));

        build_router(Arc::new(AppState {
            prediction_service,
            reef_data_service,
            guard,
            scheduler,
        }))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health_and_locations() {
        let app = app();

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (status, body) = send(&app, "GET", "/locations", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 4);
        assert_eq!(body["locations"][0]["id"], "jolly-buoy");
    }

    #[tokio::test]
    async fn test_unknown_location_is_not_found() {
        let app = app();

        for uri in ["/temperature/analysis/atlantis", "/temperature/current/atlantis", "/reef-data/atlantis"] {
            let (status, body) = send(&app, "GET", uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(body["error"], "unknown_location");
        }
        let (status, _) = send(&app, "POST", "/temperature/retrain/atlantis", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_current_temperature_for_location() {
        let app = app();

        let (status, body) = send(&app, "GET", "/temperature/current/havelock", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["location_id"], "havelock");
        assert!(body["current_temp"].as_f64().unwrap() > 20.0);

        let (_, cache) = send(&app, "GET", "/cache", None).await;
        assert_eq!(cache["cache_info"]["entries"], 1);
        let (_, status_body) = send(&app, "GET", "/status", None).await;
        assert_eq!(status_body["cached_models"][0], "havelock");
    }

    #[tokio::test]
    async fn test_run_model_respects_cooldown() {
        let app = app();

        let (status, first) = send(&app, "POST", "/run-model", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["success"], true);

        let (_, second) = send(&app, "POST", "/run-model?force=false", None).await;
        assert_eq!(second["success"], false);
        assert_eq!(second["message"], COOLDOWN_ACTIVE);

        let (_, forced) = send(&app, "POST", "/run-model?force=true", None).await;
        assert_eq!(forced["success"], true);
    }

    #[tokio::test]
    async fn test_scheduler_endpoints() {
        let app = app();

        let (status, body) = send(&app, "POST", "/scheduler/reschedule", Some(serde_json::json!({ "hour": 25 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"]["hour"], 25);

        let (status, body) = send(
            &app,
            "POST",
            "/scheduler/reschedule",
            Some(serde_json::json!({ "hour": 7, "minute": 30 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["schedule"]["hour"], 7);

        let (status, _) = send(&app, "GET", "/scheduler/history?limit=0", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, trigger) = send(&app, "POST", "/scheduler/trigger?user_id=ops", None).await;
        assert_eq!(trigger["job_result"]["success"], true);

        let (status, history) = send(&app, "GET", "/scheduler/history?limit=5", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history["count"], 1);
        assert_eq!(history["history"][0]["user_id"], "ops");

        let (_, paused) = send(&app, "POST", "/scheduler/pause", None).await;
        assert_eq!(paused["status"], "success");
        let (_, status_body) = send(&app, "GET", "/scheduler/status", None).await;
        assert_eq!(status_body["scheduler"]["paused"], true);
    }

    #[tokio::test]
    async fn test_data_status_lists_every_table() {
        let app = app();

        let (status, body) = send(&app, "GET", "/data/status", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["files"].as_array().unwrap().len(), 12);
    }
}
