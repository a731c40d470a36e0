// Persistence trait for forecast tables
use crate::domain::series::{ObservedSeries, TableRow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Historical,
    Predictions,
    Combined,
}

impl TableKind {
    pub const ALL: [TableKind; 3] = [TableKind::Historical, TableKind::Predictions, TableKind::Combined];

    pub fn suffix(self) -> &'static str {
        match self {
            TableKind::Historical => "historical",
            TableKind::Predictions => "predictions",
            TableKind::Combined => "combined",
        }
    }
}

/// Identifies one persisted table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FileKey {
    pub location_id: String,
    pub table: TableKind,
}

impl FileKey {
    pub fn new(location_id: impl Into<String>, table: TableKind) -> Self {
        Self {
            location_id: location_id.into(),
            table,
        }
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.location_id, self.table.suffix())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileStatus {
    pub exists: bool,
    pub path: String,
    pub size_bytes: u64,
    pub row_count: usize,
    pub last_modified: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait ForecastStore: Send + Sync {
    /// Fails when the storage location is unusable.
    async fn ensure_ready(&self) -> anyhow::Result<()>;

    async fn write_table(&self, key: &FileKey, rows: &[TableRow]) -> anyhow::Result<()>;

    /// Cleaned rows, ascending by date. Missing tables yield no rows.
    async fn load_rows(&self, key: &FileKey) -> anyhow::Result<Vec<TableRow>>;

    async fn file_status(&self, key: &FileKey) -> anyhow::Result<FileStatus>;

    async fn load_recent_rows(&self, key: &FileKey, n: usize) -> anyhow::Result<Vec<TableRow>> {
        let rows = self.load_rows(key).await?;
        let skip = rows.len().saturating_sub(n);
        Ok(rows.into_iter().skip(skip).collect())
    }

    async fn load_all_rows(&self, key: &FileKey) -> anyhow::Result<Vec<TableRow>> {
        self.load_rows(key).await
    }
}

pub fn rows_to_series(rows: &[TableRow]) -> ObservedSeries {
    ObservedSeries::from_pairs(rows.iter().map(|r| (r.date, r.sst)))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// In-memory tables. `backdate` ages a table to exercise freshness checks.
    pub struct MemoryStore {
        tables: Mutex<HashMap<FileKey, (Vec<TableRow>, DateTime<Utc>)>>,
        pub ready: AtomicBool,
        pub drop_writes: AtomicBool,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self {
                tables: Mutex::new(HashMap::new()),
                ready: AtomicBool::new(true),
                drop_writes: AtomicBool::new(false),
            }
        }

        pub fn put(&self, key: FileKey, rows: Vec<TableRow>) {
            self.tables.lock().unwrap().insert(key, (rows, Utc::now()));
        }

        pub fn backdate(&self, key: &FileKey, by: chrono::Duration) {
            if let Some(entry) = self.tables.lock().unwrap().get_mut(key) {
                entry.1 -= by;
            }
        }

        pub fn table_count(&self) -> usize {
            self.tables.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ForecastStore for MemoryStore {
        async fn ensure_ready(&self) -> anyhow::Result<()> {
            if !self.ready.load(Ordering::SeqCst) {
                anyhow::bail!("data directory not found");
            }
            Ok(())
        }

        async fn write_table(&self, key: &FileKey, rows: &[TableRow]) -> anyhow::Result<()> {
            if !self.drop_writes.load(Ordering::SeqCst) {
                self.put(key.clone(), rows.to_vec());
            }
            Ok(())
        }

        async fn load_rows(&self, key: &FileKey) -> anyhow::Result<Vec<TableRow>> {
            Ok(self
                .tables
                .lock()
                .unwrap()
                .get(key)
                .map(|(rows, _)| rows.clone())
                .unwrap_or_default())
        }

        async fn file_status(&self, key: &FileKey) -> anyhow::Result<FileStatus> {
            let tables = self.tables.lock().unwrap();
            Ok(match tables.get(key) {
                Some((rows, modified)) => FileStatus {
                    exists: true,
                    path: key.to_string(),
                    size_bytes: (rows.len() * 24) as u64,
                    row_count: rows.len(),
                    last_modified: Some(*modified),
                },
                None => FileStatus {
                    exists: false,
                    path: key.to_string(),
                    size_bytes: 0,
                    row_count: 0,
                    last_modified: None,
                },
            })
        }
    }
}
