use crate::domain::location::{default_locations, ReefLocation};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub log: LogSettings,
    pub data: DataSettings,
    pub erddap: ErddapSettings,
    pub forecast: ForecastSettings,
    pub cache: CacheSettings,
    pub execution: ExecutionSettings,
    pub scheduler: SchedulerSettings,
    pub locations: Vec<ReefLocation>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DataSettings {
    pub dir: PathBuf,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ErddapSettings {
    pub base_url: String,
    pub dataset: String,
    pub variable: String,
    pub request_timeout_secs: u64,
}

impl Default for ErddapSettings {
    fn default() -> Self {
        Self {
            base_url: "https://coastwatch.pfeg.noaa.gov/erddap".to_string(),
            dataset: "ncdcOisst21Agg_LonPM180".to_string(),
            variable: "sst".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ForecastSettings {
    /// Lookback days used as model features.
    pub window: usize,
    /// Days of recent observations fetched to seed a forecast.
    pub history_days: i64,
    pub past_days: u32,
    pub future_days: u32,
    pub bleaching_threshold: f64,
    pub model_max_age_hours: u64,
    pub start_year: i32,
    /// Stop collecting real training years after this many succeed.
    pub year_quota: usize,
    /// Below this many real years the set is topped up with synthetic samples.
    pub min_real_years: usize,
    /// Size the set is topped up to when synthetic samples are needed.
    pub synthetic_samples: usize,
    /// Minimum fraction of window days that must be observed.
    pub min_window_coverage: f64,
    pub n_estimators: usize,
    pub seed: u64,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            window: 14,
            history_days: 90,
            past_days: 7,
            future_days: 7,
            bleaching_threshold: 29.0,
            model_max_age_hours: 24,
            start_year: 1982,
            year_quota: 10,
            min_real_years: 5,
            synthetic_samples: 20,
            min_window_coverage: 0.8,
            n_estimators: 400,
            seed: 42,
        }
    }
}

impl ForecastSettings {
    pub fn model_max_age(&self) -> Duration {
        Duration::from_secs(self.model_max_age_hours * 3600)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheSettings {
    pub ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub recovery_secs: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_secs: 300,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExecutionSettings {
    pub timeout_secs: u64,
    pub cooldown_secs: u64,
    /// Written tables older than this after a run fail verification.
    pub output_max_age_secs: u64,
    pub retry: RetrySettings,
    pub breaker: BreakerSettings,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            cooldown_secs: 3600,
            output_max_age_secs: 300,
            retry: RetrySettings::default(),
            breaker: BreakerSettings::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SchedulerSettings {
    pub enabled: bool,
    pub hour: u32,
    pub minute: u32,
    pub misfire_grace_secs: u64,
    pub history_limit: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            hour: 6,
            minute: 0,
            misfire_grace_secs: 300,
            history_limit: 10,
        }
    }
}

impl Settings {
    /// Configured locations, or the default Andaman sites when none are set.
    pub fn reef_locations(&self) -> Vec<ReefLocation> {
        if self.locations.is_empty() {
            default_locations()
        } else {
            self.locations.clone()
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.scheduler.hour > 23 || self.scheduler.minute > 59 {
            anyhow::bail!(
                "Invalid schedule {}:{}: hour must be 0-23, minute must be 0-59",
                self.scheduler.hour,
                self.scheduler.minute
            );
        }
        if self.forecast.window == 0 {
            anyhow::bail!("forecast.window must be at least 1");
        }
        if self.forecast.n_estimators == 0 {
            anyhow::bail!("forecast.n_estimators must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.forecast.min_window_coverage) {
            anyhow::bail!("forecast.min_window_coverage must be within 0.0..=1.0");
        }
        if self.execution.retry.max_attempts == 0 {
            anyhow::bail!("execution.retry.max_attempts must be at least 1");
        }

        let locations = self.reef_locations();
        if locations.is_empty() {
            anyhow::bail!("At least one reef location must be configured");
        }
        let mut seen = HashSet::new();
        for location in &locations {
            if !seen.insert(location.id.as_str()) {
                anyhow::bail!("Duplicate location id: {}", location.id);
            }
        }
        Ok(())
    }
}

/// Loads settings from `config/reefwatch.*` (optional) overlaid with
/// `REEFWATCH__SECTION__KEY` environment variables.
pub fn load_settings() -> anyhow::Result<Settings> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/reefwatch").required(false))
        .add_source(
            config::Environment::with_prefix("REEFWATCH")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let settings: Settings = settings.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.reef_locations().len(), 4);
        assert_eq!(settings.forecast.model_max_age(), Duration::from_secs(86_400));
        assert_eq!(settings.execution.breaker.failure_threshold, 3);
    }

    #[test]
    fn test_validate_rejects_bad_schedule() {
        let mut settings = Settings::default();
        settings.scheduler.hour = 24;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_locations() {
        let mut settings = Settings::default();
        settings.locations = vec![
            ReefLocation::new("havelock", "Havelock", 11.96, 93.0, ""),
            ReefLocation::new("havelock", "Havelock 2", 11.97, 93.1, ""),
        ];
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: Settings = config::Config::builder()
            .add_source(config::File::from_str(
                "[scheduler]\nhour = 4\n\n[forecast]\nwindow = 7\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.scheduler.hour, 4);
        assert_eq!(settings.scheduler.minute, 0);
        assert_eq!(settings.forecast.window, 7);
        assert_eq!(settings.forecast.n_estimators, 400);
    }
}
