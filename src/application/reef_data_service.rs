// Reef data service - Stored tables, risk over them, and file status
use crate::application::forecast_store::{rows_to_series, FileKey, FileStatus, ForecastStore, TableKind};
use crate::domain::error::ForecastError;
use crate::domain::location::{find_location, Coordinates, ReefLocation};
use crate::domain::risk::RiskAssessment;
use crate::domain::series::TableRow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Historical rows shown alongside the stored predictions.
pub const RECENT_HISTORY_ROWS: usize = 8;

#[derive(Debug, Clone, Serialize)]
pub struct ReefData {
    pub location_id: String,
    pub location_name: String,
    pub coordinates: Coordinates,
    pub historical: Vec<TableRow>,
    pub predictions: Vec<TableRow>,
    pub risk: RiskAssessment,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableStatus {
    pub location_id: String,
    pub table: TableKind,
    #[serde(flatten)]
    pub status: FileStatus,
}

pub struct ReefDataService {
    store: Arc<dyn ForecastStore>,
    locations: Vec<ReefLocation>,
    bleaching_threshold: f64,
}

impl ReefDataService {
    pub fn new(store: Arc<dyn ForecastStore>, locations: Vec<ReefLocation>, bleaching_threshold: f64) -> Self {
        Self {
            store,
            locations,
            bleaching_threshold,
        }
    }

    pub async fn reef_data(&self, location_id: &str) -> anyhow::Result<ReefData> {
        let location = find_location(&self.locations, location_id)
            .ok_or_else(|| ForecastError::UnknownLocation(location_id.to_string()))?;

        let historical = self
            .store
            .load_recent_rows(&FileKey::new(location_id, TableKind::Historical), RECENT_HISTORY_ROWS)
            .await?;
        let predictions = self
            .store
            .load_all_rows(&FileKey::new(location_id, TableKind::Predictions))
            .await?;

        let mut combined = historical.clone();
        combined.extend(predictions.iter().cloned());
        let series = rows_to_series(&combined);
        let risk = if series.is_empty() {
            RiskAssessment::empty(self.bleaching_threshold)
        } else {
            RiskAssessment::from_series(&series, self.bleaching_threshold)
        };

        let last_updated = self
            .store
            .file_status(&FileKey::new(location_id, TableKind::Combined))
            .await?
            .last_modified;

        Ok(ReefData {
            location_id: location.id.clone(),
            location_name: location.name.clone(),
            coordinates: location.coordinates.clone(),
            historical,
            predictions,
            risk,
            last_updated,
        })
    }

    /// Status of every table of every location.
    pub async fn data_status(&self) -> anyhow::Result<Vec<TableStatus>> {
        let mut statuses = Vec::with_capacity(self.locations.len() * TableKind::ALL.len());
        for location in &self.locations {
            for table in TableKind::ALL {
                let status = self.store.file_status(&FileKey::new(&location.id, table)).await?;
                statuses.push(TableStatus {
                    location_id: location.id.clone(),
                    table,
                    status,
                });
            }
        }
        Ok(statuses)
    }
}
