// ERDDAP griddap repository implementation for daily OISST
use crate::application::sst_repository::SstRepository;
use crate::infrastructure::config::ErddapSettings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Deserialize;
use std::time::Duration as StdDuration;

/// Requests ending this close to today ask for the latest available day instead,
/// since the archive lags real time by a few days.
const LATENCY_DAYS: i64 = 14;

#[derive(Debug, Clone)]
pub struct ErddapRepository {
    client: reqwest::Client,
    base_url: String,
    dataset: String,
    variable: String,
}

#[derive(Debug, Deserialize)]
struct GriddapResponse {
    table: GriddapTable,
}

#[derive(Debug, Deserialize)]
struct GriddapTable {
    #[serde(rename = "columnNames")]
    column_names: Vec<String>,
    rows: Vec<Vec<serde_json::Value>>,
}

impl ErddapRepository {
    pub fn new(settings: &ErddapSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(settings.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            dataset: settings.dataset.clone(),
            variable: settings.variable.clone(),
        })
    }

    fn build_query_url(&self, lat: f64, lon: f64, start: NaiveDate, end: NaiveDate, today: NaiveDate) -> String {
        let upper = if end >= today - Duration::days(LATENCY_DAYS) {
            "last".to_string()
        } else {
            format!("{end}T12:00:00Z")
        };
        let query = format!(
            "{var}[({start}T12:00:00Z):1:({upper})][(0.0):1:(0.0)][({lat}):1:({lat})][({lon}):1:({lon})]",
            var = self.variable,
        );
        format!(
            "{}/griddap/{}.json?{}",
            self.base_url,
            self.dataset,
            urlencoding::encode(&query)
        )
    }

    async fn execute_query(&self, url: &str) -> Result<Option<GriddapResponse>> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .context("Failed to send request to ERDDAP")?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            // ERDDAP answers 404 when the constraint matches no data
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("ERDDAP query failed with status {}: {}", status, body);
        }

        let data = response
            .json::<GriddapResponse>()
            .await
            .context("Failed to parse ERDDAP response")?;
        Ok(Some(data))
    }
}

/// Extracts `(date, value)` pairs. Null or non-numeric cells are dropped.
fn parse_table(table: &GriddapTable, variable: &str) -> Result<Vec<(NaiveDate, f64)>> {
    let column = |name: &str| {
        table
            .column_names
            .iter()
            .position(|c| c == name)
            .with_context(|| format!("ERDDAP response has no '{name}' column"))
    };
    let time_idx = column("time")?;
    let value_idx = column(variable)?;

    let mut readings = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let Some(raw_time) = row.get(time_idx).and_then(|v| v.as_str()) else {
            continue;
        };
        let Some(value) = row.get(value_idx).and_then(|v| v.as_f64()).filter(|v| v.is_finite()) else {
            continue;
        };
        let Ok(time) = DateTime::parse_from_rfc3339(raw_time) else {
            tracing::debug!("Skipping row with unparseable time: {}", raw_time);
            continue;
        };
        readings.push((time.with_timezone(&Utc).date_naive(), value));
    }
    Ok(readings)
}

#[async_trait]
impl SstRepository for ErddapRepository {
    async fn fetch_range(&self, lat: f64, lon: f64, start: NaiveDate, end: NaiveDate) -> Result<Vec<(NaiveDate, f64)>> {
        let url = self.build_query_url(lat, lon, start, end, Utc::now().date_naive());
        tracing::debug!("Executing ERDDAP query: {}", url);

        let Some(response) = self.execute_query(&url).await? else {
            tracing::debug!(lat, lon, %start, %end, "ERDDAP returned no data for range");
            return Ok(Vec::new());
        };

        let readings = parse_table(&response.table, &self.variable)?;
        Ok(readings
            .into_iter()
            .filter(|(date, _)| *date >= start && *date <= end)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn repository() -> ErddapRepository {
        ErddapRepository::new(&ErddapSettings::default()).unwrap()
    }

    #[test]
    fn test_query_url_for_archived_range() {
        let url = repository().build_query_url(11.96, 93.0, d(2020, 1, 1), d(2020, 12, 31), d(2024, 3, 1));

        assert!(url.starts_with("https://coastwatch.pfeg.noaa.gov/erddap/griddap/ncdcOisst21Agg_LonPM180.json?"));
        let query = urlencoding::decode(url.split_once('?').unwrap().1).unwrap();
        assert_eq!(
            query,
            "sst[(2020-01-01T12:00:00Z):1:(2020-12-31T12:00:00Z)][(0.0):1:(0.0)][(11.96):1:(11.96)][(93):1:(93)]"
        );
    }

    #[test]
    fn test_query_url_near_today_asks_for_latest() {
        let url = repository().build_query_url(11.96, 93.0, d(2024, 1, 1), d(2024, 3, 1), d(2024, 3, 1));
        let query = urlencoding::decode(url.split_once('?').unwrap().1).unwrap().into_owned();
        assert!(query.starts_with("sst[(2024-01-01T12:00:00Z):1:(last)]"));
    }

    #[test]
    fn test_parse_table_drops_missing_cells() {
        let body = r#"{"table": {
            "columnNames": ["time", "zlev", "latitude", "longitude", "sst"],
            "columnTypes": ["String", "float", "float", "float", "float"],
            "rows": [
                ["2024-01-01T12:00:00Z", 0.0, 11.875, 93.125, 28.41],
                ["2024-01-02T12:00:00Z", 0.0, 11.875, 93.125, null],
                ["not-a-time", 0.0, 11.875, 93.125, 28.0],
                ["2024-01-03T12:00:00Z", 0.0, 11.875, 93.125, 28.57]
            ]
        }}"#;
        let response: GriddapResponse = serde_json::from_str(body).unwrap();

        let readings = parse_table(&response.table, "sst").unwrap();

        assert_eq!(readings, vec![(d(2024, 1, 1), 28.41), (d(2024, 1, 3), 28.57)]);
    }

    #[test]
    fn test_parse_table_requires_variable_column() {
        let response: GriddapResponse =
            serde_json::from_str(r#"{"table": {"columnNames": ["time"], "rows": []}}"#).unwrap();
        assert!(parse_table(&response.table, "sst").is_err());
    }
}
