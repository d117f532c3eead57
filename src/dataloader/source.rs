// Data access trait for the portal's dataloader API
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::dataloader::models::{DataPoint, ResultId, SamplingFeature, SeriesMetadata};
use crate::error::AppResult;

#[async_trait]
pub trait DataSource: Send + Sync {
    /// All monitoring sites, for the site selector
    async fn sampling_features(&self) -> AppResult<Vec<SamplingFeature>>;

    /// Metadata for every series recorded at a site
    async fn sampling_feature_metadata(&self, site_code: &str) -> AppResult<Vec<SeriesMetadata>>;

    /// Observations of one series between `start` and `end`
    async fn result_timeseries(
        &self,
        result_id: ResultId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<DataPoint>>;
}
