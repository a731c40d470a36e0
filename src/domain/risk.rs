// Degree Heating Weeks and bleaching risk
use super::series::ObservedSeries;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Trailing accumulation window for DHW, in days.
pub const DHW_WINDOW_DAYS: i64 = 84;
/// Daily hotspots below this many degrees over threshold do not accumulate.
pub const MIN_HOTSPOT: f64 = 1.0;

/// DHW tier boundaries (°C-weeks): below 4 low, below 8 moderate, below 12 high.
const DHW_TIERS: [f64; 3] = [4.0, 8.0, 12.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    #[serde(alias = "critical")]
    Severe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Stable,
    Increasing,
    Decreasing,
}

/// Risk derived from one temperature series.
///
/// `current_risk` is the DHW tier and is what consumers should show;
/// `anomaly_risk` is the instantaneous tier kept as a diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub current_risk: RiskLevel,
    pub anomaly_risk: RiskLevel,
    pub trend: Trend,
    pub dhw: f64,
    pub anomaly: f64,
    pub bleaching_threshold: f64,
}

impl RiskAssessment {
    pub fn from_series(series: &ObservedSeries, threshold: f64) -> Self {
        let dhw = compute_dhw(series, threshold);
        let (anomaly_risk, trend, anomaly) = assess_risk(&series.values(), threshold);
        Self {
            current_risk: dhw_risk_level(dhw),
            anomaly_risk,
            trend,
            dhw,
            anomaly,
            bleaching_threshold: threshold,
        }
    }

    /// Assessment for a location with no usable readings.
    pub fn empty(threshold: f64) -> Self {
        Self {
            current_risk: RiskLevel::Low,
            anomaly_risk: RiskLevel::Low,
            trend: Trend::Stable,
            dhw: 0.0,
            anomaly: 0.0,
            bleaching_threshold: threshold,
        }
    }
}

/// Degree Heating Weeks over the 84 days ending at the series' last date,
/// rounded to one decimal.
pub fn compute_dhw(series: &ObservedSeries, threshold: f64) -> f64 {
    let Some(end) = series.last_date() else {
        return 0.0;
    };
    let start = end - Duration::days(DHW_WINDOW_DAYS - 1);

    let degree_days: f64 = series
        .range(start, end)
        .map(|(_, temp)| (temp - threshold).max(0.0))
        .filter(|hotspot| *hotspot >= MIN_HOTSPOT)
        .fold(0.0, |acc, hotspot| acc + hotspot);

    round_to(degree_days / 7.0, 1)
}

/// Instantaneous risk from the last reading's anomaly, plus the short-term trend.
/// Returns `(level, trend, anomaly)` with the anomaly rounded to three decimals.
pub fn assess_risk(readings: &[f64], threshold: f64) -> (RiskLevel, Trend, f64) {
    let Some(&current) = readings.last() else {
        return (RiskLevel::Low, Trend::Stable, 0.0);
    };

    let anomaly = current - threshold;
    let level = if anomaly >= 2.0 {
        RiskLevel::Severe
    } else if anomaly >= 1.0 {
        RiskLevel::High
    } else if anomaly >= 0.5 {
        RiskLevel::Moderate
    } else {
        RiskLevel::Low
    };

    let trend = match readings {
        [.., first, _, last] => {
            let diff = last - first;
            if diff > 0.5 {
                Trend::Increasing
            } else if diff < -0.5 {
                Trend::Decreasing
            } else {
                Trend::Stable
            }
        }
        _ => Trend::Stable,
    };

    (level, trend, round_to(anomaly, 3))
}

pub fn dhw_risk_level(dhw: f64) -> RiskLevel {
    if dhw < DHW_TIERS[0] {
        RiskLevel::Low
    } else if dhw < DHW_TIERS[1] {
        RiskLevel::Moderate
    } else if dhw < DHW_TIERS[2] {
        RiskLevel::High
    } else {
        RiskLevel::Severe
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
