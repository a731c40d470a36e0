// Seasonal synthetic SST used when the archive cannot supply data
use crate::domain::series::{DataOrigin, ObservedSeries};
use crate::domain::training::TrainingSample;
use chrono::{Datelike, Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::PI;

/// Sinusoidal annual cycle peaking around late June, plus Gaussian noise.
#[derive(Debug, Clone)]
pub struct SeasonalSignal {
    pub base_temp: f64,
    pub amplitude: f64,
    pub noise_sd: f64,
    pub target_noise_sd: f64,
}

impl Default for SeasonalSignal {
    fn default() -> Self {
        // Andaman Sea climatology
        Self {
            base_temp: 28.5,
            amplitude: 1.5,
            noise_sd: 0.3,
            target_noise_sd: 0.2,
        }
    }
}

impl SeasonalSignal {
    pub fn seasonal(&self, date: NaiveDate) -> f64 {
        let day_of_year = date.ordinal() as f64;
        self.base_temp + (2.0 * PI * (day_of_year - 80.0) / 365.0).sin() * self.amplitude
    }

    /// One noisy reading per day over `start..=end`.
    pub fn series(&self, start: NaiveDate, end: NaiveDate, seed: u64) -> ObservedSeries {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut series = ObservedSeries::new();
        let mut date = start;
        while date <= end {
            series.insert(date, self.seasonal(date) + noise(&mut rng, self.noise_sd));
            date += Duration::days(1);
        }
        series
    }

    /// `count` samples shaped like the real ones: `window` days preceding the
    /// anchor's day of year, with a target correlated to the last three days.
    pub fn training_samples(
        &self,
        anchor: NaiveDate,
        window: usize,
        count: usize,
        seed: u64,
    ) -> Vec<TrainingSample> {
        let mut rng = StdRng::seed_from_u64(seed);
        let first_day = anchor - Duration::days(window as i64);

        (0..count)
            .map(|offset| {
                let temps: Vec<f64> = (0..window)
                    .map(|i| {
                        let date = first_day + Duration::days(i as i64);
                        self.seasonal(date) + noise(&mut rng, self.noise_sd)
                    })
                    .collect();

                let tail = &temps[temps.len().saturating_sub(3)..];
                let tail_mean = if tail.is_empty() {
                    self.seasonal(anchor)
                } else {
                    tail.iter().sum::<f64>() / tail.len() as f64
                };

                TrainingSample {
                    year: anchor.year() - 1 - offset as i32,
                    window: temps,
                    target: tail_mean + noise(&mut rng, self.target_noise_sd),
                    origin: DataOrigin::Synthetic,
                }
            })
            .collect()
    }
}

/// Stable seed for a coordinate and date, so fallback output is reproducible.
pub fn seed_for(lat: f64, lon: f64, date: NaiveDate) -> u64 {
    let mut seed = lat.to_bits().rotate_left(17) ^ lon.to_bits();
    seed ^= (date.num_days_from_ce() as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    seed
}

fn noise(rng: &mut StdRng, sd: f64) -> f64 {
    Normal::new(0.0, sd)
        .map(|normal| normal.sample(rng))
        .unwrap_or(0.0)
}
