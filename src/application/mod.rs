// Application layer - Forecasting engine, guarded execution and scheduling
pub mod execution_guard;
pub mod forecast_service;
pub mod forecast_store;
pub mod location_model;
pub mod model_runner;
pub mod policies;
pub mod prediction_service;
pub mod reef_data_service;
pub mod regressor;
pub mod result_cache;
pub mod scheduler;
pub mod sst_repository;
pub mod sst_source;
pub mod synthetic;
pub mod training_builder;
