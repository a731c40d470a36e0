// Multi-location forecast orchestrator - Model cache and concurrent fan-out
use crate::application::location_model::LocationModel;
use crate::application::sst_source::SstSource;
use crate::application::training_builder::{SeasonalTrainingBuilder, TrainingConfig};
use crate::domain::error::ForecastError;
use crate::domain::forecast::{DegradedForecast, ForecastResult, LocationForecast};
use crate::domain::location::ReefLocation;
use crate::domain::risk::RiskAssessment;
use crate::domain::series::{ForecastPoint, ObservedSeries};
use crate::infrastructure::config::ForecastSettings;
use chrono::{Duration, NaiveDate, Utc};
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct ForecastOrchestrator {
    source: SstSource,
    builder: SeasonalTrainingBuilder,
    settings: ForecastSettings,
    models: Mutex<HashMap<String, Arc<Mutex<LocationModel>>>>,
}

impl ForecastOrchestrator {
    pub fn new(source: SstSource, settings: ForecastSettings) -> Self {
        let builder = SeasonalTrainingBuilder::new(source.clone(), TrainingConfig::from(&settings));
        Self {
            source,
            builder,
            settings,
            models: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &ForecastSettings {
        &self.settings
    }

    /// Forecasts every location concurrently. A failing location becomes a
    /// degraded entry; the others are unaffected.
    pub async fn predict_all(
        &self,
        locations: &[ReefLocation],
        past_days: u32,
        future_days: u32,
        today: NaiveDate,
    ) -> BTreeMap<String, LocationForecast> {
        let tasks = locations.iter().map(|location| async move {
            let outcome = match self.predict_location(location, past_days, future_days, today).await {
                Ok(result) => LocationForecast::Ready(result),
                Err(e) => {
                    tracing::warn!(location_id = %location.id, kind = e.kind(), "Forecast degraded: {}", e);
                    LocationForecast::Degraded(DegradedForecast::from_error(location, &e))
                }
            };
            (location.id.clone(), outcome)
        });

        join_all(tasks).await.into_iter().collect()
    }

    pub async fn predict_location(
        &self,
        location: &ReefLocation,
        past_days: u32,
        future_days: u32,
        today: NaiveDate,
    ) -> Result<ForecastResult, ForecastError> {
        let mut model = self.model_for(location).await.lock_owned().await;

        if model.is_stale(self.settings.model_max_age()) {
            let set = self.builder.build(location, today).await;
            // CPU-bound fit runs on the blocking pool
            model = tokio::task::spawn_blocking(move || {
                let mut model = model;
                model.train(&set).map(|()| model)
            })
            .await
            .map_err(|e| {
                tracing::error!(location_id = %location.id, "Model training task failed: {}", e);
                ForecastError::ModelNotTrained {
                    location_id: location.id.clone(),
                }
            })??;
        }

        let history_start = today - Duration::days(self.settings.history_days);
        let fetch = self
            .source
            .fetch(location.lat(), location.lon(), history_start, today)
            .await;
        let observed = fetch.series;

        let last_observed = observed
            .last_date()
            .ok_or_else(|| ForecastError::InsufficientData {
                location_id: location.id.clone(),
            })?;

        // Archive latency: fill from the last observed day through today
        let mut extended = observed.clone();
        if last_observed < today {
            let (_, filled) = model.predict_sequence(&observed, last_observed + Duration::days(1), today)?;
            extended = filled;
        }

        // DHW window ends today; future predictions stay out of it
        let risk = RiskAssessment::from_series(&extended, self.settings.bleaching_threshold);

        let mut future_points = Vec::new();
        if future_days > 0 {
            let (points, _) = model.predict_sequence(
                &extended,
                today + Duration::days(1),
                today + Duration::days(future_days as i64),
            )?;
            future_points = points;
        }

        let past_data = past_points(&observed, &extended, today - Duration::days(past_days as i64), today);
        let current_temp = past_data
            .last()
            .filter(|p| p.date == today)
            .map(|p| p.temperature)
            .ok_or_else(|| ForecastError::InsufficientHistory {
                location_id: location.id.clone(),
                date: today,
            })?;

        tracing::info!(
            location_id = %location.id,
            %last_observed,
            current_temp,
            dhw = risk.dhw,
            origin = ?fetch.origin,
            "Forecast complete"
        );

        Ok(ForecastResult {
            location_id: location.id.clone(),
            location_name: location.name.clone(),
            past_data,
            future_data: future_points.iter().map(ForecastPoint::rounded).collect(),
            current_temp,
            dhw: risk.dhw,
            risk,
            observation_origin: fetch.origin,
            training_origin: model.training_origin(),
            last_updated: Utc::now(),
        })
    }

    async fn model_for(&self, location: &ReefLocation) -> Arc<Mutex<LocationModel>> {
        let mut models = self.models.lock().await;
        models
            .entry(location.id.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(LocationModel::new(
                    location,
                    self.settings.window,
                    self.settings.n_estimators,
                    self.settings.seed,
                )))
            })
            .clone()
    }

    /// Drops the cached model for one location, or all of them.
    /// Returns the number of models removed.
    pub async fn clear_models(&self, location_id: Option<&str>) -> usize {
        let mut models = self.models.lock().await;
        let removed = match location_id {
            Some(id) => usize::from(models.remove(id).is_some()),
            None => {
                let count = models.len();
                models.clear();
                count
            }
        };
        tracing::info!(location_id = location_id.unwrap_or("*"), removed, "Cleared cached models");
        removed
    }

    pub async fn cached_models(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.models.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Rounded points for `start..=end`, flagged predicted where the day was not observed.
fn past_points(
    observed: &ObservedSeries,
    extended: &ObservedSeries,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<ForecastPoint> {
    extended
        .range(start, end)
        .map(|(date, temperature)| {
            let point = if observed.contains(date) {
                ForecastPoint::observed(date, temperature)
            } else {
                ForecastPoint::predicted(date, temperature)
            };
            point.rounded()
        })
        .collect()
}
