// Forecast result domain models
use super::error::ForecastError;
use super::location::{Coordinates, ReefLocation};
use super::risk::{RiskAssessment, RiskLevel};
use super::series::{DataOrigin, ForecastPoint};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// A complete forecast for one location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastResult {
    pub location_id: String,
    pub location_name: String,
    /// The requested past days followed by today.
    pub past_data: Vec<ForecastPoint>,
    pub future_data: Vec<ForecastPoint>,
    pub current_temp: f64,
    pub dhw: f64,
    pub risk: RiskAssessment,
    /// Origin of the recent observations the forecast was seeded from.
    pub observation_origin: DataOrigin,
    /// Origin of the samples the model was trained on.
    pub training_origin: DataOrigin,
    pub last_updated: DateTime<Utc>,
}

impl ForecastResult {
    pub fn is_synthetic(&self) -> bool {
        self.observation_origin.is_synthetic() || self.training_origin.is_synthetic()
    }
}

/// A location whose forecast failed. Temperatures and DHW are zeroed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DegradedForecast {
    pub location_id: String,
    pub location_name: String,
    pub error: String,
    pub kind: &'static str,
    pub current_temp: f64,
    pub dhw: f64,
    pub last_updated: DateTime<Utc>,
}

impl DegradedForecast {
    pub fn from_error(location: &ReefLocation, error: &ForecastError) -> Self {
        Self {
            location_id: location.id.clone(),
            location_name: location.name.clone(),
            error: error.to_string(),
            kind: error.kind(),
            current_temp: 0.0,
            dhw: 0.0,
            last_updated: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum LocationForecast {
    Ready(ForecastResult),
    Degraded(DegradedForecast),
}

impl LocationForecast {
    pub fn location_id(&self) -> &str {
        match self {
            LocationForecast::Ready(r) => &r.location_id,
            LocationForecast::Degraded(d) => &d.location_id,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, LocationForecast::Degraded(_))
    }

    pub fn as_ready(&self) -> Option<&ForecastResult> {
        match self {
            LocationForecast::Ready(r) => Some(r),
            LocationForecast::Degraded(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastMetadata {
    pub total_locations: usize,
    pub degraded_locations: usize,
    pub past_days: u32,
    pub future_days: u32,
    pub bleaching_threshold: f64,
}

/// Forecasts keyed by location id.
#[derive(Debug, Clone, Serialize)]
pub struct ForecastBatch {
    pub locations: BTreeMap<String, LocationForecast>,
    pub metadata: ForecastMetadata,
}

impl ForecastBatch {
    pub fn new(
        locations: BTreeMap<String, LocationForecast>,
        past_days: u32,
        future_days: u32,
        bleaching_threshold: f64,
    ) -> Self {
        let degraded_locations = locations.values().filter(|l| l.is_degraded()).count();
        Self {
            metadata: ForecastMetadata {
                total_locations: locations.len(),
                degraded_locations,
                past_days,
                future_days,
                bleaching_threshold,
            },
            locations,
        }
    }

    pub fn get(&self, location_id: &str) -> Option<&LocationForecast> {
        self.locations.get(location_id)
    }
}

/// Latest temperature, DHW and risk for one location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentSnapshot {
    pub location_id: String,
    pub current_temp: f64,
    pub dhw: f64,
    pub risk_level: RiskLevel,
    pub coordinates: Coordinates,
    pub is_synthetic: bool,
    pub error: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl CurrentSnapshot {
    pub fn from_forecast(location: &ReefLocation, forecast: &LocationForecast) -> Self {
        match forecast {
            LocationForecast::Ready(result) => Self {
                location_id: location.id.clone(),
                current_temp: result.current_temp,
                dhw: result.dhw,
                risk_level: result.risk.current_risk,
                coordinates: location.coordinates.clone(),
                is_synthetic: result.is_synthetic(),
                error: None,
                last_updated: result.last_updated,
            },
            LocationForecast::Degraded(degraded) => Self {
                location_id: location.id.clone(),
                current_temp: degraded.current_temp,
                dhw: degraded.dhw,
                risk_level: RiskLevel::Low,
                coordinates: location.coordinates.clone(),
                is_synthetic: false,
                error: Some(degraded.error.clone()),
                last_updated: degraded.last_updated,
            },
        }
    }
}
