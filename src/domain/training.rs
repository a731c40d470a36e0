// Seasonal training set domain models
use super::series::DataOrigin;
use chrono::NaiveDate;

/// One historical year: `window` holds the antecedent days, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSample {
    pub year: i32,
    pub window: Vec<f64>,
    pub target: f64,
    pub origin: DataOrigin,
}

#[derive(Debug, Clone)]
pub struct TrainingSet {
    pub location_id: String,
    pub anchor: NaiveDate,
    pub window: usize,
    samples: Vec<TrainingSample>,
}

impl TrainingSet {
    pub fn new(location_id: impl Into<String>, anchor: NaiveDate, window: usize) -> Self {
        Self {
            location_id: location_id.into(),
            anchor,
            window,
            samples: Vec::new(),
        }
    }

    /// Adds a sample. Samples whose window length differs from the set's are rejected.
    pub fn push(&mut self, sample: TrainingSample) -> bool {
        if sample.window.len() != self.window || !sample.target.is_finite() {
            return false;
        }
        self.samples.push(sample);
        true
    }

    pub fn samples(&self) -> &[TrainingSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn real_years(&self) -> usize {
        self.samples.iter().filter(|s| !s.origin.is_synthetic()).count()
    }

    pub fn synthetic_samples(&self) -> usize {
        self.samples.len() - self.real_years()
    }

    /// `Synthetic` as soon as any sample was generated rather than observed.
    pub fn origin(&self) -> DataOrigin {
        if self.synthetic_samples() > 0 {
            DataOrigin::Synthetic
        } else {
            DataOrigin::Real
        }
    }

    pub fn features(&self) -> Vec<Vec<f64>> {
        self.samples.iter().map(|s| s.window.clone()).collect()
    }

    pub fn targets(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.target).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_rejects_wrong_window_length() {
        let anchor = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let mut set = TrainingSet::new("havelock", anchor, 3);

        assert!(set.push(TrainingSample {
            year: 2023,
            window: vec![28.0, 28.1, 28.2],
            target: 28.3,
            origin: DataOrigin::Real,
        }));
        assert!(!set.push(TrainingSample {
            year: 2022,
            window: vec![28.0, 28.1],
            target: 28.3,
            origin: DataOrigin::Real,
        }));
        assert!(set.push(TrainingSample {
            year: 2020,
            window: vec![27.0, 27.1, 27.2],
            target: 27.3,
            origin: DataOrigin::Synthetic,
        }));

        assert_eq!(set.len(), 2);
        assert_eq!(set.real_years(), 1);
        assert_eq!(set.origin(), DataOrigin::Synthetic);
        assert_eq!(set.targets(), vec![28.3, 27.3]);
    }
}
