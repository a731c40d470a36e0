// Repository trait for remote SST archive access
use async_trait::async_trait;
use chrono::NaiveDate;

#[async_trait]
pub trait SstRepository: Send + Sync {
    /// Daily SST at the grid cell nearest `(lat, lon)` for `start..=end`.
    /// Days without a valid value are omitted.
    async fn fetch_range(
        &self,
        lat: f64,
        lon: f64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<(NaiveDate, f64)>>;
}
