// Sea surface temperature series domain models
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether a value set came from the archive or from the seasonal generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataOrigin {
    Real,
    Synthetic,
}

impl DataOrigin {
    pub fn is_synthetic(self) -> bool {
        matches!(self, DataOrigin::Synthetic)
    }
}

/// Row provenance in the persisted tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSource {
    Historical,
    Predicted,
}

impl DataSource {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "historical" | "observed" => Some(DataSource::Historical),
            "predicted" | "forecast" => Some(DataSource::Predicted),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DataSource::Historical => "Historical",
            DataSource::Predicted => "Predicted",
        }
    }
}

/// Date-keyed SST readings. Dates are unique and iterate ascending; gaps are allowed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservedSeries {
    readings: BTreeMap<NaiveDate, f64>,
}

impl ObservedSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a series from unordered pairs. Non-finite values are dropped and
    /// the first reading for a date wins.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        let mut readings = BTreeMap::new();
        for (date, value) in pairs {
            if value.is_finite() {
                readings.entry(date).or_insert(value);
            }
        }
        Self { readings }
    }

    pub fn insert(&mut self, date: NaiveDate, value: f64) {
        self.readings.insert(date, value);
    }

    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.readings.get(&date).copied()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.readings.contains_key(&date)
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.readings.keys().next().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.readings.keys().next_back().copied()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (NaiveDate, f64)> + '_ {
        self.readings.iter().map(|(d, v)| (*d, *v))
    }

    /// Readings with `start <= date <= end`. Empty when `start > end`.
    pub fn range(&self, start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.readings
            .range(start..=end.max(start))
            .filter(move |(d, _)| **d <= end)
            .map(|(d, v)| (*d, *v))
    }

    pub fn slice(&self, start: NaiveDate, end: NaiveDate) -> ObservedSeries {
        if start > end {
            return ObservedSeries::new();
        }
        Self {
            readings: self.readings.range(start..=end).map(|(d, v)| (*d, *v)).collect(),
        }
    }

    /// Merges `other` into this series; existing dates keep their value.
    pub fn merge(&mut self, other: ObservedSeries) {
        for (date, value) in other.readings {
            self.readings.entry(date).or_insert(value);
        }
    }

    pub fn values(&self) -> Vec<f64> {
        self.readings.values().copied().collect()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.readings.is_empty() {
            return None;
        }
        Some(self.readings.values().sum::<f64>() / self.readings.len() as f64)
    }
}

/// One day of a produced forecast. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub temperature: f64,
    pub is_predicted: bool,
}

impl ForecastPoint {
    pub fn observed(date: NaiveDate, temperature: f64) -> Self {
        Self { date, temperature, is_predicted: false }
    }

    pub fn predicted(date: NaiveDate, temperature: f64) -> Self {
        Self { date, temperature, is_predicted: true }
    }

    /// Copy rounded to two decimals for presentation.
    pub fn rounded(&self) -> Self {
        Self {
            date: self.date,
            temperature: (self.temperature * 100.0).round() / 100.0,
            is_predicted: self.is_predicted,
        }
    }
}

/// A persisted table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub date: NaiveDate,
    pub sst: f64,
    pub source: DataSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_from_pairs_sorts_and_dedups() {
        let series = ObservedSeries::from_pairs(vec![
            (d(2024, 1, 3), 28.3),
            (d(2024, 1, 1), 28.1),
            (d(2024, 1, 3), 99.0),
            (d(2024, 1, 2), f64::NAN),
        ]);

        assert_eq!(series.len(), 2);
        assert_eq!(series.first_date(), Some(d(2024, 1, 1)));
        assert_eq!(series.get(d(2024, 1, 3)), Some(28.3));
        assert!(!series.contains(d(2024, 1, 2)));
    }

    #[test]
    fn test_slice_is_inclusive() {
        let series = ObservedSeries::from_pairs((1..=10).map(|i| (d(2024, 1, i), i as f64)));
        let slice = series.slice(d(2024, 1, 3), d(2024, 1, 5));
        assert_eq!(slice.values(), vec![3.0, 4.0, 5.0]);
        assert!(series.slice(d(2024, 1, 5), d(2024, 1, 3)).is_empty());
    }

    #[test]
    fn test_data_source_parse() {
        assert_eq!(DataSource::parse(" observed "), Some(DataSource::Historical));
        assert_eq!(DataSource::parse("Forecast"), Some(DataSource::Predicted));
        assert_eq!(DataSource::parse("unknown"), None);
    }
}
