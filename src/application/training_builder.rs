// Seasonal training-set builder - Same calendar day across past years
use crate::application::sst_source::SstSource;
use crate::application::synthetic::seed_for;
use crate::domain::location::ReefLocation;
use crate::domain::series::{DataOrigin, ObservedSeries};
use crate::domain::training::{TrainingSample, TrainingSet};
use crate::infrastructure::config::ForecastSettings;
use chrono::{Datelike, Duration, NaiveDate};

#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub window: usize,
    pub start_year: i32,
    pub year_quota: usize,
    pub min_real_years: usize,
    pub synthetic_samples: usize,
    pub min_window_coverage: f64,
}

impl From<&ForecastSettings> for TrainingConfig {
    fn from(settings: &ForecastSettings) -> Self {
        Self {
            window: settings.window,
            start_year: settings.start_year,
            year_quota: settings.year_quota,
            min_real_years: settings.min_real_years,
            synthetic_samples: settings.synthetic_samples,
            min_window_coverage: settings.min_window_coverage,
        }
    }
}

#[derive(Clone)]
pub struct SeasonalTrainingBuilder {
    source: SstSource,
    config: TrainingConfig,
}

impl SeasonalTrainingBuilder {
    pub fn new(source: SstSource, config: TrainingConfig) -> Self {
        Self { source, config }
    }

    pub fn window(&self) -> usize {
        self.config.window
    }

    /// One sample per past year, newest first, until the quota is met.
    /// Sets with too few real years are topped up with synthetic samples,
    /// so the result is never empty.
    pub async fn build(&self, location: &ReefLocation, anchor: NaiveDate) -> TrainingSet {
        let window = self.config.window;
        let mut set = TrainingSet::new(location.id.clone(), anchor, window);

        let mut year = anchor.year() - 1;
        while year >= self.config.start_year && set.real_years() < self.config.year_quota {
            if let Some(sample) = self.sample_for_year(location, anchor, year).await {
                set.push(sample);
            }
            year -= 1;
        }

        let real_years = set.real_years();
        if real_years < self.config.min_real_years {
            let needed = self.config.synthetic_samples.saturating_sub(set.len()).max(1);
            let seed = seed_for(location.lat(), location.lon(), anchor);
            for sample in self.source.signal().training_samples(anchor, window, needed, seed) {
                set.push(sample);
            }
            tracing::warn!(
                location_id = %location.id,
                real_years,
                synthetic = set.synthetic_samples(),
                origin = "synthetic",
                "Too few historical years, training set topped up with synthetic samples"
            );
        }

        tracing::info!(
            location_id = %location.id,
            %anchor,
            samples = set.len(),
            real_years,
            "Training set built"
        );
        set
    }

    async fn sample_for_year(&self, location: &ReefLocation, anchor: NaiveDate, year: i32) -> Option<TrainingSample> {
        let target_date = safe_target(anchor, year)?;
        let window = self.config.window;
        let window_start = target_date - Duration::days(window as i64);

        let (series, _) = self
            .source
            .fetch_observed(location.lat(), location.lon(), window_start, target_date)
            .await;

        let Some(target) = series.get(target_date) else {
            tracing::debug!(location_id = %location.id, year, "Target day missing, skipping year");
            return None;
        };

        let dates: Vec<NaiveDate> = (0..window)
            .map(|i| window_start + Duration::days(i as i64))
            .collect();
        let Some(values) = resolve_window(&series, &dates, self.config.min_window_coverage) else {
            tracing::debug!(location_id = %location.id, year, "Window too sparse, skipping year");
            return None;
        };

        Some(TrainingSample {
            year,
            window: values,
            target,
            origin: DataOrigin::Real,
        })
    }
}

/// Anchor's month/day in `year`; Feb 29 becomes Feb 28 outside leap years.
pub fn safe_target(anchor: NaiveDate, year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, anchor.month(), anchor.day()).or_else(|| {
        if anchor.month() == 2 && anchor.day() == 29 {
            NaiveDate::from_ymd_opt(year, 2, 28)
        } else {
            None
        }
    })
}

/// Values for `dates` in order, or `None` when fewer than `min_coverage` of them
/// are observed. Interior gaps are linearly interpolated between the nearest
/// observed neighbours, edge gaps take the mean of the observed values.
pub fn resolve_window(series: &ObservedSeries, dates: &[NaiveDate], min_coverage: f64) -> Option<Vec<f64>> {
    let raw: Vec<Option<f64>> = dates.iter().map(|d| series.get(*d)).collect();
    let known: Vec<(usize, f64)> = raw
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i, v)))
        .collect();

    if known.is_empty() || (known.len() as f64) < min_coverage * dates.len() as f64 {
        return None;
    }

    let mean = known.iter().map(|(_, v)| v).sum::<f64>() / known.len() as f64;

    let values = raw
        .iter()
        .enumerate()
        .map(|(i, value)| {
            if let Some(v) = value {
                return *v;
            }
            let before = known.iter().rev().find(|(k, _)| *k < i);
            let after = known.iter().find(|(k, _)| *k > i);
            match (before, after) {
                (Some(&(i0, v0)), Some(&(i1, v1))) => {
                    v0 + (v1 - v0) * (i - i0) as f64 / (i1 - i0) as f64
                }
                _ => mean,
            }
        })
        .collect();

    Some(values)
}
