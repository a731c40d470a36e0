// Per-location SST model - Window regression with recursive prediction
use crate::application::regressor::RandomForestRegressor;
use crate::domain::error::ForecastError;
use crate::domain::location::ReefLocation;
use crate::domain::series::{DataOrigin, ForecastPoint, ObservedSeries};
use crate::domain::training::TrainingSet;
use chrono::{Duration, NaiveDate};
use std::time::Duration as StdDuration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct LocationModel {
    location_id: String,
    window: usize,
    n_estimators: usize,
    seed: u64,
    forest: Option<RandomForestRegressor>,
    trained_at: Option<Instant>,
    training_origin: DataOrigin,
}

impl LocationModel {
    pub fn new(location: &ReefLocation, window: usize, n_estimators: usize, seed: u64) -> Self {
        Self {
            location_id: location.id.clone(),
            window,
            n_estimators,
            seed,
            forest: None,
            trained_at: None,
            training_origin: DataOrigin::Real,
        }
    }

    #[cfg(test)]
    pub fn is_trained(&self) -> bool {
        self.forest.is_some()
    }

    pub fn training_origin(&self) -> DataOrigin {
        self.training_origin
    }

    /// Never trained, or trained longer than `max_age` ago.
    pub fn is_stale(&self, max_age: StdDuration) -> bool {
        match self.trained_at {
            Some(at) => at.elapsed() > max_age,
            None => true,
        }
    }

    pub fn train(&mut self, set: &TrainingSet) -> Result<(), ForecastError> {
        let insufficient = || ForecastError::InsufficientData {
            location_id: self.location_id.clone(),
        };
        if set.is_empty() {
            return Err(insufficient());
        }

        let mut forest = RandomForestRegressor::new(self.n_estimators).with_random_state(self.seed);
        if let Err(e) = forest.fit(&set.features(), &set.targets()) {
            tracing::error!(location_id = %self.location_id, "Model fit failed: {}", e);
            return Err(insufficient());
        }

        self.window = set.window;
        self.forest = Some(forest);
        self.trained_at = Some(Instant::now());
        self.training_origin = set.origin();

        tracing::info!(
            location_id = %self.location_id,
            samples = set.len(),
            real_years = set.real_years(),
            window = self.window,
            "Model trained"
        );
        Ok(())
    }

    /// Predicts each day of `start..=end` in order from the `window` days
    /// before it. Every prediction is written into the working series before
    /// the next day is predicted, so later windows consume earlier predictions.
    /// Returns the predicted points and the extended series.
    pub fn predict_sequence(
        &self,
        seed: &ObservedSeries,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<(Vec<ForecastPoint>, ObservedSeries), ForecastError> {
        let forest = self.forest.as_ref().ok_or_else(|| ForecastError::ModelNotTrained {
            location_id: self.location_id.clone(),
        })?;

        let mut working = seed.clone();
        let mut points = Vec::new();
        let mut date = start;

        while date <= end {
            let features = self.feature_window(&working, date)?;
            let predicted = forest
                .predict_one(&features)
                .map_err(|_| ForecastError::ModelNotTrained {
                    location_id: self.location_id.clone(),
                })?;

            working.insert(date, predicted);
            points.push(ForecastPoint::predicted(date, predicted));
            date += Duration::days(1);
        }

        Ok((points, working))
    }

    fn feature_window(&self, series: &ObservedSeries, date: NaiveDate) -> Result<Vec<f64>, ForecastError> {
        let first = date - Duration::days(self.window as i64);
        (0..self.window)
            .map(|i| {
                let day = first + Duration::days(i as i64);
                series.get(day).ok_or_else(|| ForecastError::InsufficientHistory {
                    location_id: self.location_id.clone(),
                    date: day,
                })
            })
            .collect()
    }
}
