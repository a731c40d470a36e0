// CSV forecast store - One Date,SST,Source file per location table
use crate::application::forecast_store::{FileKey, FileStatus, ForecastStore};
use crate::domain::series::{DataSource, TableRow};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const MIN_PLAUSIBLE_SST: f64 = -5.0;
const MAX_PLAUSIBLE_SST: f64 = 50.0;

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    #[serde(rename = "Date")]
    date: NaiveDate,
    #[serde(rename = "SST")]
    sst: f64,
    #[serde(rename = "Source")]
    source: &'a str,
}

#[derive(Debug, Clone)]
pub struct CsvForecastStore {
    dir: PathBuf,
}

impl CsvForecastStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &FileKey) -> PathBuf {
        self.dir.join(format!("{key}.csv"))
    }
}

fn write_rows(path: &Path, rows: &[TableRow]) -> Result<()> {
    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp)
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        for row in rows {
            writer.serialize(CsvRow {
                date: row.date,
                sst: row.sst,
                source: row.source.as_str(),
            })?;
        }
        writer.flush()?;
    }
    std::fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw.get(..10).unwrap_or(raw), "%Y-%m-%d").ok()
}

/// Reads a table, skipping malformed rows and implausible temperatures.
/// Later rows win on duplicate dates.
fn read_rows(path: &Path) -> Result<Vec<TableRow>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let headers = reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    let (Some(date_idx), Some(sst_idx)) = (column("date"), column("sst")) else {
        anyhow::bail!("{} is missing the Date or SST column", path.display());
    };
    let source_idx = column("source");

    let mut by_date = BTreeMap::new();
    let mut skipped = 0usize;
    for record in reader.records() {
        let Ok(record) = record else {
            skipped += 1;
            continue;
        };
        let date = record.get(date_idx).and_then(parse_date);
        let sst = record
            .get(sst_idx)
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite() && (MIN_PLAUSIBLE_SST..=MAX_PLAUSIBLE_SST).contains(v));
        let (Some(date), Some(sst)) = (date, sst) else {
            skipped += 1;
            continue;
        };
        let source = source_idx
            .and_then(|i| record.get(i))
            .and_then(DataSource::parse)
            .unwrap_or(DataSource::Historical);
        by_date.insert(date, TableRow { date, sst, source });
    }

    if skipped > 0 {
        tracing::debug!(path = %path.display(), skipped, "Dropped unusable CSV rows");
    }
    Ok(by_date.into_values().collect())
}

fn status_of(path: &Path) -> Result<FileStatus> {
    let display = path.display().to_string();
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(FileStatus {
                exists: false,
                path: display,
                size_bytes: 0,
                row_count: 0,
                last_modified: None,
            });
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to stat {display}")),
    };

    let row_count = read_rows(path).map(|rows| rows.len()).unwrap_or(0);
    Ok(FileStatus {
        exists: true,
        path: display,
        size_bytes: metadata.len(),
        row_count,
        last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
    })
}

#[async_trait]
impl ForecastStore for CsvForecastStore {
    async fn ensure_ready(&self) -> Result<()> {
        let metadata = tokio::fs::metadata(&self.dir)
            .await
            .with_context(|| format!("Data directory not found: {}", self.dir.display()))?;
        if !metadata.is_dir() {
            anyhow::bail!("{} is not a directory", self.dir.display());
        }
        Ok(())
    }

    async fn write_table(&self, key: &FileKey, rows: &[TableRow]) -> Result<()> {
        let path = self.path_for(key);
        let rows = rows.to_vec();
        tokio::task::spawn_blocking(move || write_rows(&path, &rows))
            .await
            .context("CSV writer task failed")??;
        tracing::debug!(file = %key, "Wrote forecast table");
        Ok(())
    }

    async fn load_rows(&self, key: &FileKey) -> Result<Vec<TableRow>> {
        let path = self.path_for(key);
        tokio::task::spawn_blocking(move || read_rows(&path))
            .await
            .context("CSV reader task failed")?
    }

    async fn file_status(&self, key: &FileKey) -> Result<FileStatus> {
        let path = self.path_for(key);
        tokio::task::spawn_blocking(move || status_of(&path))
            .await
            .context("CSV status task failed")?
    }
}
