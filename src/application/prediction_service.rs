// Prediction service - Cached forecasts, current snapshots and retraining
use crate::application::forecast_service::ForecastOrchestrator;
use crate::application::result_cache::{CacheControl, CacheInfo, ResultCache};
use crate::domain::error::ForecastError;
use crate::domain::forecast::{CurrentSnapshot, ForecastBatch};
use crate::domain::location::{find_location, ReefLocation};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

const ALL_KEY: &str = "analysis:all";

fn cache_key(location_id: &str) -> String {
    format!("analysis:{location_id}")
}

pub struct PredictionService {
    orchestrator: Arc<ForecastOrchestrator>,
    locations: Vec<ReefLocation>,
    cache: ResultCache<ForecastBatch>,
}

impl PredictionService {
    pub fn new(orchestrator: Arc<ForecastOrchestrator>, locations: Vec<ReefLocation>, ttl: Duration) -> Self {
        Self {
            orchestrator,
            locations,
            cache: ResultCache::new(ttl),
        }
    }

    pub fn list_locations(&self) -> &[ReefLocation] {
        &self.locations
    }

    pub fn location(&self, location_id: &str) -> Result<&ReefLocation, ForecastError> {
        find_location(&self.locations, location_id)
            .ok_or_else(|| ForecastError::UnknownLocation(location_id.to_string()))
    }

    /// Forecast for one location, or every configured location when `None`.
    /// Results are served from cache until the TTL lapses or the cache is cleared.
    pub async fn get_forecast(&self, location_id: Option<&str>) -> Result<Arc<ForecastBatch>, ForecastError> {
        let (key, locations) = match location_id {
            Some(id) => (cache_key(id), vec![self.location(id)?.clone()]),
            None => (ALL_KEY.to_string(), self.locations.clone()),
        };

        if let Some(cached) = self.cache.get(&key).await {
            tracing::debug!(cache_key = %key, "Serving cached forecast");
            return Ok(cached);
        }

        let generation = self.cache.generation();
        let settings = self.orchestrator.settings();
        let today = Utc::now().date_naive();
        let forecasts = self
            .orchestrator
            .predict_all(&locations, settings.past_days, settings.future_days, today)
            .await;
        let batch = ForecastBatch::new(
            forecasts,
            settings.past_days,
            settings.future_days,
            settings.bleaching_threshold,
        );

        Ok(self.cache.insert(key, batch, generation).await)
    }

    pub async fn get_current(&self, location_id: Option<&str>) -> Result<Vec<CurrentSnapshot>, ForecastError> {
        let batch = self.get_forecast(location_id).await?;
        let snapshots = batch
            .locations
            .values()
            .filter_map(|forecast| {
                find_location(&self.locations, forecast.location_id())
                    .map(|location| CurrentSnapshot::from_forecast(location, forecast))
            })
            .collect();
        Ok(snapshots)
    }

    /// Drops the cached model(s) and results so the next request retrains.
    pub async fn retrain(&self, location_id: Option<&str>) -> Result<usize, ForecastError> {
        match location_id {
            Some(id) => {
                self.location(id)?;
                let removed = self.orchestrator.clear_models(Some(id)).await;
                self.cache.invalidate(&cache_key(id)).await;
                self.cache.invalidate(ALL_KEY).await;
                Ok(removed)
            }
            None => {
                let removed = self.orchestrator.clear_models(None).await;
                self.cache.clear().await;
                Ok(removed)
            }
        }
    }

    pub async fn cache_info(&self) -> CacheInfo {
        self.cache.info().await
    }

    pub async fn cached_models(&self) -> Vec<String> {
        self.orchestrator.cached_models().await
    }
}

#[async_trait]
impl CacheControl for PredictionService {
    async fn clear_cache(&self) -> usize {
        let cleared = self.cache.clear().await;
        tracing::info!(cleared, "Forecast cache cleared");
        cleared
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::application::sst_repository::SstRepository;
    use crate::application::sst_source::testing::FakeRepository;
    use crate::application::sst_source::SstSource;
    use crate::domain::location::default_locations;
    use crate::domain::series::ObservedSeries;
    use crate::infrastructure::config::ForecastSettings;
    use chrono::{Datelike, Duration as ChronoDuration};

    /// Archive covering the two years up to yesterday.
    pub fn recent_archive() -> ObservedSeries {
        let end = Utc::now().date_naive() - ChronoDuration::days(1);
        let start = end - ChronoDuration::days(730);
        ObservedSeries::from_pairs(
            (0..=730).map(|i| (start + ChronoDuration::days(i), 28.0 + (i % 9) as f64 * 0.1)),
        )
    }

    pub fn service_with(series: ObservedSeries) -> PredictionService {
        service_over(Arc::new(FakeRepository::new(series)))
    }

    pub fn service_over(repository: Arc<dyn SstRepository>) -> PredictionService {
        let settings = ForecastSettings {
            n_estimators: 15,
            start_year: Utc::now().date_naive().year() - 2,
            ..ForecastSettings::default()
        };
        let source = SstSource::new(repository);
        let orchestrator = Arc::new(ForecastOrchestrator::new(source, settings));
        PredictionService::new(orchestrator, default_locations(), Duration::from_secs(300))
    }
}
