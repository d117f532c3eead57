//! Cached time-series values per result, loaded incrementally.
//!
//! Each series remembers the contiguous window `[start, end]` for which its
//! values are known to be complete. Requests inside that window are served
//! from memory; requests reaching further back fetch only the missing delta
//! `[start, loaded_start)` and merge it in. Merges are keyed by timestamp, so
//! a point fetched twice is stored once and the latest fetch wins.
//!
//! Loads for the same result are serialized through a per-series async lock:
//! a second caller waits for the first merge to commit and then sees the
//! widened bounds, so concurrent requests never fetch the same delta twice.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::dataloader::{DataPoint, DataSource, ResultId};
use crate::error::AppResult;

/// The window for which a series' values are known to be complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedBounds {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl LoadedBounds {
    #[must_use]
    pub fn covers(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start >= self.start && end <= self.end
    }
}

/// Ordered, de-duplicated values for one series.
#[derive(Debug, Default, Clone)]
pub struct SeriesData {
    values: BTreeMap<DateTime<Utc>, Option<f64>>,
    loaded: Option<LoadedBounds>,
}

impl SeriesData {
    #[must_use]
    pub fn loaded(&self) -> Option<LoadedBounds> {
        self.loaded
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    /// All cached points in ascending timestamp order.
    #[must_use]
    pub fn points(&self) -> Vec<DataPoint> {
        self.values
            .iter()
            .map(|(t, v)| DataPoint::new(*t, *v))
            .collect()
    }

    /// Merge a fetched batch; later values replace earlier ones at the same timestamp.
    pub fn merge(&mut self, batch: impl IntoIterator<Item = DataPoint>) {
        for point in batch {
            self.values.insert(point.timestamp, point.value);
        }
    }

    fn extend_bounds(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) {
        self.loaded = Some(match self.loaded {
            Some(b) => LoadedBounds {
                start: b.start.min(start),
                end: b.end.max(end),
            },
            None => LoadedBounds { start, end },
        });
    }
}

/// A pending fetch: the API window plus the half-open filter applied to its result.
#[derive(Debug, Clone, Copy)]
struct Delta {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    include_start: bool,
    include_end: bool,
}

impl Delta {
    fn accepts(&self, t: DateTime<Utc>) -> bool {
        let after_start = if self.include_start { t >= self.start } else { t > self.start };
        let before_end = if self.include_end { t <= self.end } else { t < self.end };
        after_start && before_end
    }
}

/// Work needed to make `[start, end]` fully loaded.
fn missing_deltas(
    loaded: Option<LoadedBounds>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<Delta> {
    let Some(bounds) = loaded else {
        return vec![Delta {
            start,
            end,
            include_start: true,
            include_end: true,
        }];
    };

    if bounds.covers(start, end) {
        return Vec::new();
    }

    let mut deltas = Vec::new();
    if start < bounds.start {
        deltas.push(Delta {
            start,
            end: bounds.start,
            include_start: true,
            include_end: false,
        });
    }
    if end > bounds.end {
        deltas.push(Delta {
            start: bounds.end,
            end,
            include_start: false,
            include_end: true,
        });
    }
    deltas
}

#[derive(Clone)]
pub struct SeriesStore {
    source: Arc<dyn DataSource>,
    entries: Arc<Mutex<HashMap<ResultId, Arc<Mutex<SeriesData>>>>>,
}

impl SeriesStore {
    #[must_use]
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self {
            source,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn entry(&self, result_id: ResultId) -> Arc<Mutex<SeriesData>> {
        self.entries
            .lock()
            .await
            .entry(result_id)
            .or_default()
            .clone()
    }

    async fn existing(&self, result_id: ResultId) -> Option<Arc<Mutex<SeriesData>>> {
        self.entries.lock().await.get(&result_id).cloned()
    }

    /// Make sure every value of `result_id` within `[start, end]` is cached.
    ///
    /// Only the parts outside the already loaded window are fetched. All
    /// deltas are fetched before anything is merged, so a failure leaves the
    /// cached data untouched.
    ///
    /// # Errors
    ///
    /// Returns the data source error if any fetch fails.
    pub async fn ensure_loaded(
        &self,
        result_id: ResultId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<()> {
        if start > end {
            return Ok(());
        }

        let entry = self.entry(result_id).await;
        // Held across the fetch: one in-flight load per series.
        let mut data = entry.lock().await;

        let deltas = missing_deltas(data.loaded, start, end);
        if deltas.is_empty() {
            tracing::debug!(result_id, %start, %end, "Range already loaded");
            return Ok(());
        }

        let mut fetched = Vec::with_capacity(deltas.len());
        for delta in &deltas {
            tracing::debug!(result_id, start = %delta.start, end = %delta.end, "Fetching missing range");
            let points = self
                .source
                .result_timeseries(result_id, delta.start, delta.end)
                .await
                .inspect_err(|e| {
                    tracing::error!(error = %e, result_id, "Failed to load time series");
                })?;
            fetched.push((*delta, points));
        }

        let before = data.len();
        for (delta, points) in fetched {
            data.merge(points.into_iter().filter(|p| delta.accepts(p.timestamp)));
        }
        data.extend_bounds(start, end);

        tracing::debug!(
            result_id,
            added = data.len() - before,
            total = data.len(),
            "Merged time series"
        );
        Ok(())
    }

    /// Everything cached for a series, oldest first.
    pub async fn points(&self, result_id: ResultId) -> Vec<DataPoint> {
        match self.existing(result_id).await {
            Some(entry) => entry.lock().await.points(),
            None => Vec::new(),
        }
    }

    pub async fn loaded_bounds(&self, result_id: ResultId) -> Option<LoadedBounds> {
        match self.existing(result_id).await {
            Some(entry) => entry.lock().await.loaded(),
            None => None,
        }
    }

    /// Drop every cached series not in `keep`.
    pub async fn retain(&self, keep: &HashSet<ResultId>) {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|id, _| keep.contains(id));
        tracing::debug!(dropped = before - entries.len(), "Pruned cached series");
    }
}
