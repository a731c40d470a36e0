// Application state for HTTP handlers
use crate::application::execution_guard::ExecutionGuard;
use crate::application::prediction_service::PredictionService;
use crate::application::reef_data_service::ReefDataService;
use crate::application::scheduler::Scheduler;
use std::sync::Arc;

pub struct AppState {
    pub prediction_service: Arc<PredictionService>,
    pub reef_data_service: Arc<ReefDataService>,
    pub guard: Arc<ExecutionGuard>,
    pub scheduler: Arc<Scheduler>,
}
