// Model pipeline runner - Forecast every location and persist the tables
use crate::application::forecast_service::ForecastOrchestrator;
use crate::application::forecast_store::{FileKey, ForecastStore, TableKind};
use crate::domain::error::{ExecutionError, ExecutionErrorCode};
use crate::domain::forecast::{ForecastResult, LocationForecast};
use crate::domain::location::ReefLocation;
use crate::domain::series::{DataSource, TableRow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct RunArtifacts {
    pub execution_id: String,
    pub started_at: DateTime<Utc>,
    pub forecasted: Vec<String>,
    pub degraded: Vec<String>,
    pub files: Vec<FileKey>,
}

/// The operation wrapped by the execution guard.
#[async_trait]
pub trait ModelRunner: Send + Sync {
    async fn preflight(&self) -> Result<(), ExecutionError>;
    async fn execute(&self, execution_id: &str) -> Result<RunArtifacts, ExecutionError>;
    async fn verify(&self, artifacts: &RunArtifacts) -> Result<(), ExecutionError>;
}

pub struct ForecastPipelineRunner {
    orchestrator: Arc<ForecastOrchestrator>,
    store: Arc<dyn ForecastStore>,
    locations: Vec<ReefLocation>,
    output_max_age: Duration,
}

impl ForecastPipelineRunner {
    pub fn new(
        orchestrator: Arc<ForecastOrchestrator>,
        store: Arc<dyn ForecastStore>,
        locations: Vec<ReefLocation>,
        output_max_age: Duration,
    ) -> Self {
        Self {
            orchestrator,
            store,
            locations,
            output_max_age,
        }
    }

    async fn persist(&self, result: &ForecastResult) -> anyhow::Result<Vec<FileKey>> {
        let (historical, predictions, combined) = tables_for(result);
        let mut written = Vec::with_capacity(3);
        for (table, rows) in [
            (TableKind::Historical, historical),
            (TableKind::Predictions, predictions),
            (TableKind::Combined, combined),
        ] {
            let key = FileKey::new(&result.location_id, table);
            self.store.write_table(&key, &rows).await?;
            written.push(key);
        }
        Ok(written)
    }
}

/// Observed past days, predicted days (latency fill and future), and both tagged.
pub fn tables_for(result: &ForecastResult) -> (Vec<TableRow>, Vec<TableRow>, Vec<TableRow>) {
    let combined: Vec<TableRow> = result
        .past_data
        .iter()
        .chain(result.future_data.iter())
        .map(|point| TableRow {
            date: point.date,
            sst: point.temperature,
            source: if point.is_predicted {
                DataSource::Predicted
            } else {
                DataSource::Historical
            },
        })
        .collect();

    let (historical, predictions): (Vec<TableRow>, Vec<TableRow>) = combined
        .iter()
        .cloned()
        .partition(|row| row.source == DataSource::Historical);

    (historical, predictions, combined)
}

#[async_trait]
impl ModelRunner for ForecastPipelineRunner {
    async fn preflight(&self) -> Result<(), ExecutionError> {
        self.store.ensure_ready().await.map_err(|e| {
            ExecutionError::new(
                ExecutionErrorCode::DataDirNotFound,
                format!("Data directory unavailable: {e:#}"),
            )
        })
    }

    async fn execute(&self, execution_id: &str) -> Result<RunArtifacts, ExecutionError> {
        let started_at = Utc::now();
        self.orchestrator.clear_models(None).await;

        let settings = self.orchestrator.settings();
        let forecasts = self
            .orchestrator
            .predict_all(
                &self.locations,
                settings.past_days,
                settings.future_days,
                started_at.date_naive(),
            )
            .await;

        let mut artifacts = RunArtifacts {
            execution_id: execution_id.to_string(),
            started_at,
            forecasted: Vec::new(),
            degraded: Vec::new(),
            files: Vec::new(),
        };

        for (location_id, forecast) in &forecasts {
            match forecast {
                LocationForecast::Ready(result) => {
                    let files = self.persist(result).await.map_err(|e| {
                        ExecutionError::new(
                            ExecutionErrorCode::ExecutionFailed,
                            format!("Failed to write tables for {location_id}: {e:#}"),
                        )
                        .with_details(json!({ "location_id": location_id }))
                    })?;
                    artifacts.files.extend(files);
                    artifacts.forecasted.push(location_id.clone());
                }
                LocationForecast::Degraded(_) => artifacts.degraded.push(location_id.clone()),
            }
        }

        if artifacts.forecasted.is_empty() {
            return Err(ExecutionError::new(
                ExecutionErrorCode::ExecutionFailed,
                "Forecast failed for every location",
            )
            .with_details(json!({ "degraded": artifacts.degraded })));
        }

        tracing::info!(
            execution_id,
            forecasted = artifacts.forecasted.len(),
            degraded = artifacts.degraded.len(),
            "Model pipeline finished"
        );
        Ok(artifacts)
    }

    async fn verify(&self, artifacts: &RunArtifacts) -> Result<(), ExecutionError> {
        let mut missing = Vec::new();
        let mut stale = Vec::new();
        let now = Utc::now();

        for key in &artifacts.files {
            let status = self.store.file_status(key).await.map_err(|e| {
                ExecutionError::new(
                    ExecutionErrorCode::Unexpected,
                    format!("Could not inspect {key}: {e:#}"),
                )
            })?;

            match status.last_modified {
                Some(modified) if status.exists => {
                    let age = (now - modified).to_std().unwrap_or_default();
                    if age > self.output_max_age {
                        stale.push(json!({ "file": key.to_string(), "age_seconds": age.as_secs() }));
                    }
                }
                _ => missing.push(key.to_string()),
            }
        }

        if !missing.is_empty() {
            return Err(ExecutionError::new(
                ExecutionErrorCode::OutputFilesMissing,
                "Expected output files were not created",
            )
            .with_details(json!({ "missing_files": missing })));
        }
        if !stale.is_empty() {
            return Err(ExecutionError::new(
                ExecutionErrorCode::OutputFilesStale,
                "Output files were not updated by this run",
            )
            .with_details(json!({ "stale_files": stale })));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::forecast_store::testing::MemoryStore;
    use crate::application::prediction_service::testing::recent_archive;
    use crate::application::sst_source::testing::FakeRepository;
    use crate::application::sst_source::SstSource;
    use crate::domain::location::default_locations;
    use crate::domain::series::ObservedSeries;
    use crate::infrastructure::config::ForecastSettings;
    use chrono::Datelike;
    use std::sync::atomic::Ordering;

    fn runner(series: ObservedSeries, store: Arc<MemoryStore>) -> ForecastPipelineRunner {
        let settings = ForecastSettings {
            n_estimators: 15,
            start_year: Utc::now().year() - 2,
            ..ForecastSettings::default()
        };
        let orchestrator = Arc::new(ForecastOrchestrator::new(
            SstSource::new(Arc::new(FakeRepository::new(series))),
            settings,
        ));
        ForecastPipelineRunner::new(orchestrator, store, default_locations(), Duration::from_secs(300))
    }

    #[tokio::test]
    async fn test_run_writes_three_tables_per_location() {
        let store = Arc::new(MemoryStore::new());
        let runner = runner(recent_archive(), store.clone());

        runner.preflight().await.unwrap();
        let artifacts = runner.execute("exec-1").await.unwrap();
        runner.verify(&artifacts).await.unwrap();

        assert_eq!(artifacts.forecasted.len(), 4);
        assert!(artifacts.degraded.is_empty());
        assert_eq!(artifacts.files.len(), 12);
        assert_eq!(store.table_count(), 12);

        let combined = store
            .load_all_rows(&FileKey::new("havelock", TableKind::Combined))
            .await
            .unwrap();
        let historical = store
            .load_all_rows(&FileKey::new("havelock", TableKind::Historical))
            .await
            .unwrap();
        assert_eq!(combined.len(), 15);
        assert!(historical.iter().all(|r| r.source == DataSource::Historical));
    }

    #[tokio::test]
    async fn test_preflight_requires_data_dir() {
        let store = Arc::new(MemoryStore::new());
        store.ready.store(false, Ordering::SeqCst);
        let err = runner(recent_archive(), store).preflight().await.unwrap_err();
        assert_eq!(err.code, ExecutionErrorCode::DataDirNotFound);
    }

    #[tokio::test]
    async fn test_verify_reports_missing_and_stale() {
        let store = Arc::new(MemoryStore::new());
        store.drop_writes.store(true, Ordering::SeqCst);
        let runner = runner(recent_archive(), store.clone());

        let artifacts = runner.execute("exec-2").await.unwrap();
        let err = runner.verify(&artifacts).await.unwrap_err();
        assert_eq!(err.code, ExecutionErrorCode::OutputFilesMissing);

        store.drop_writes.store(false, Ordering::SeqCst);
        let artifacts = runner.execute("exec-3").await.unwrap();
        store.backdate(&artifacts.files[0], chrono::Duration::minutes(10));
        let err = runner.verify(&artifacts).await.unwrap_err();
        assert_eq!(err.code, ExecutionErrorCode::OutputFilesStale);
    }
}
