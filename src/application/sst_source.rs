// SST source adapter - Per-year chunked fetching with synthetic fallback
use crate::application::sst_repository::SstRepository;
use crate::application::synthetic::{seed_for, SeasonalSignal};
use crate::domain::error::ForecastError;
use crate::domain::series::{DataOrigin, ObservedSeries};
use chrono::{Datelike, NaiveDate};
use std::sync::Arc;

/// Result of a fetch. `origin` is `Synthetic` when nothing could be fetched
/// and the series was generated instead.
#[derive(Debug, Clone)]
pub struct SstFetch {
    pub series: ObservedSeries,
    pub origin: DataOrigin,
    pub failed_chunks: usize,
}

#[derive(Clone)]
pub struct SstSource {
    repository: Arc<dyn SstRepository>,
    signal: SeasonalSignal,
}

impl SstSource {
    pub fn new(repository: Arc<dyn SstRepository>) -> Self {
        Self {
            repository,
            signal: SeasonalSignal::default(),
        }
    }

    pub fn signal(&self) -> &SeasonalSignal {
        &self.signal
    }

    /// Never fails: chunk failures are logged and skipped, and an empty result
    /// is replaced by a seasonal synthetic series covering the range.
    pub async fn fetch(&self, lat: f64, lon: f64, start: NaiveDate, end: NaiveDate) -> SstFetch {
        let (series, failed_chunks) = self.fetch_observed(lat, lon, start, end).await;

        if series.is_empty() && start <= end {
            tracing::warn!(
                lat,
                lon,
                %start,
                %end,
                failed_chunks,
                origin = "synthetic",
                "No SST data fetched, using fallback data"
            );
            return SstFetch {
                series: self.signal.series(start, end, seed_for(lat, lon, start)),
                origin: DataOrigin::Synthetic,
                failed_chunks,
            };
        }

        SstFetch {
            series,
            origin: DataOrigin::Real,
            failed_chunks,
        }
    }

    /// Observed readings only, one repository call per calendar year.
    /// Returns the merged series and the number of failed chunks.
    pub async fn fetch_observed(
        &self,
        lat: f64,
        lon: f64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> (ObservedSeries, usize) {
        let mut series = ObservedSeries::new();
        let mut failed = 0;

        for (chunk_start, chunk_end) in year_chunks(start, end) {
            match self.repository.fetch_range(lat, lon, chunk_start, chunk_end).await {
                Ok(pairs) => series.merge(ObservedSeries::from_pairs(
                    pairs
                        .into_iter()
                        .filter(|(date, _)| *date >= chunk_start && *date <= chunk_end),
                )),
                Err(e) => {
                    failed += 1;
                    let err = ForecastError::DataFetch {
                        start: chunk_start,
                        end: chunk_end,
                        message: format!("{e:#}"),
                    };
                    tracing::warn!(lat, lon, "Skipping chunk: {}", err);
                }
            }
        }

        (series, failed)
    }
}

/// Splits `start..=end` into per-calendar-year inclusive ranges.
pub fn year_chunks(start: NaiveDate, end: NaiveDate) -> Vec<(NaiveDate, NaiveDate)> {
    let mut chunks = Vec::new();
    if start > end {
        return chunks;
    }

    for year in start.year()..=end.year() {
        let (Some(jan1), Some(dec31)) = (
            NaiveDate::from_ymd_opt(year, 1, 1),
            NaiveDate::from_ymd_opt(year, 12, 31),
        ) else {
            continue;
        };
        chunks.push((start.max(jan1), end.min(dec31)));
    }
    chunks
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory archive. Years in `failing_years` error out.
    pub struct FakeRepository {
        pub series: ObservedSeries,
        pub failing_years: HashSet<i32>,
        pub calls: AtomicUsize,
    }

    impl FakeRepository {
        pub fn new(series: ObservedSeries) -> Self {
            Self {
                series,
                failing_years: HashSet::new(),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing(mut self, years: impl IntoIterator<Item = i32>) -> Self {
            self.failing_years.extend(years);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SstRepository for FakeRepository {
        async fn fetch_range(
            &self,
            _lat: f64,
            _lon: f64,
            start: NaiveDate,
            end: NaiveDate,
        ) -> anyhow::Result<Vec<(NaiveDate, f64)>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing_years.contains(&start.year()) {
                anyhow::bail!("archive unavailable for {}", start.year());
            }
            Ok(self.series.range(start, end).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeRepository;
    use super::*;
    use chrono::Duration;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn daily(start: NaiveDate, end: NaiveDate) -> ObservedSeries {
        let days = (end - start).num_days();
        ObservedSeries::from_pairs((0..=days).map(|i| (start + Duration::days(i), 28.0 + i as f64 * 0.01)))
    }

    #[test]
    fn test_year_chunks() {
        let chunks = year_chunks(d(2022, 12, 20), d(2024, 1, 5));
        assert_eq!(
            chunks,
            vec![
                (d(2022, 12, 20), d(2022, 12, 31)),
                (d(2023, 1, 1), d(2023, 12, 31)),
                (d(2024, 1, 1), d(2024, 1, 5)),
            ]
        );
        assert!(year_chunks(d(2024, 1, 5), d(2024, 1, 1)).is_empty());
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_other_chunks() {
        let repo = FakeRepository::new(daily(d(2022, 12, 1), d(2023, 1, 31))).failing([2022]);
        let source = SstSource::new(Arc::new(repo));

        let fetch = source.fetch(11.5, 92.6, d(2022, 12, 20), d(2023, 1, 10)).await;

        assert_eq!(fetch.origin, DataOrigin::Real);
        assert_eq!(fetch.failed_chunks, 1);
        assert_eq!(fetch.series.first_date(), Some(d(2023, 1, 1)));
        assert_eq!(fetch.series.len(), 10);
    }

    #[tokio::test]
    async fn test_total_failure_falls_back_to_synthetic() {
        let repo = FakeRepository::new(ObservedSeries::new()).failing([2024]);
        let source = SstSource::new(Arc::new(repo));

        let fetch = source.fetch(11.5, 92.6, d(2024, 1, 1), d(2024, 1, 31)).await;

        assert_eq!(fetch.origin, DataOrigin::Synthetic);
        assert_eq!(fetch.series.len(), 31);
        assert_eq!(fetch.series.first_date(), Some(d(2024, 1, 1)));
        assert_eq!(fetch.series.last_date(), Some(d(2024, 1, 31)));
    }
}
