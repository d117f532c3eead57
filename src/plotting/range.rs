use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use futures::future::join_all;
use serde::Serialize;

use crate::dataloader::ResultId;
use crate::error::{AppError, AppResult};
use crate::plotting::chart::{ChartAdapter, SeriesLabel};
use crate::plotting::store::SeriesStore;

/// Global time window shown on the chart. `None` is an open end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VisibleRange {
    pub min: Option<DateTime<Utc>>,
    pub max: Option<DateTime<Utc>>,
}

impl VisibleRange {
    /// Concrete fetch window: an open start reaches back to the epoch, an open end to `now`.
    #[must_use]
    pub fn fetch_window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.min.unwrap_or(DateTime::UNIX_EPOCH), self.max.unwrap_or(now))
    }
}

/// Shortcut buttons next to the date inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickRange {
    LastMonth,
    LastYear,
    AllTime,
}

impl QuickRange {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "month" | "last_month" | "1m" => Some(Self::LastMonth),
            "year" | "last_year" | "1y" => Some(Self::LastYear),
            "all" | "all_time" => Some(Self::AllTime),
            _ => None,
        }
    }

    /// The window this shortcut selects. The end stays open so the latest data shows.
    #[must_use]
    pub fn bounds(self, now: DateTime<Utc>) -> VisibleRange {
        let min = match self {
            Self::LastMonth => Some(
                now.checked_sub_months(Months::new(1))
                    .unwrap_or(now - Duration::days(30)),
            ),
            Self::LastYear => Some(
                now.checked_sub_months(Months::new(12))
                    .unwrap_or(now - Duration::days(365)),
            ),
            Self::AllTime => None,
        };
        VisibleRange { min, max: None }
    }
}

/// Parse a date input (`YYYY-MM-DD` or `MM/DD/YYYY`); blank means an open bound.
///
/// # Errors
///
/// Returns `AppError::BadRequest` for text that is not a date.
pub fn parse_date_input(text: &str) -> AppResult<Option<DateTime<Utc>>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    ["%Y-%m-%d", "%m/%d/%Y"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Some(naive.and_utc()))
        .ok_or_else(|| AppError::BadRequest(format!("'{text}' is not a valid date")))
}

/// A plotted series the controller should refresh.
#[derive(Debug, Clone)]
pub struct PlotTarget {
    pub result_id: ResultId,
    pub slot: usize,
    pub label: SeriesLabel,
}

/// Owns the visible window and back-fills plotted series when it widens.
#[derive(Debug, Clone, Default)]
pub struct RangeController {
    visible: VisibleRange,
}

impl RangeController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn visible(&self) -> VisibleRange {
        self.visible
    }

    /// Change the visible window and redraw every target.
    ///
    /// Each target is back-filled from `min` (or the epoch) up to what it
    /// already has loaded; newer data is never fetched here. Targets are
    /// loaded concurrently, then redrawn with their full cached data. Failed
    /// targets are returned and left as they were on the chart. The window
    /// only changes once every load has finished.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` if `min` is after `max`; nothing changes.
    pub async fn set_range<C: ChartAdapter + ?Sized>(
        &mut self,
        min: Option<DateTime<Utc>>,
        max: Option<DateTime<Utc>>,
        store: &SeriesStore,
        targets: &[PlotTarget],
        chart: &mut C,
    ) -> AppResult<Vec<(ResultId, AppError)>> {
        if let (Some(lo), Some(hi)) = (min, max)
            && lo > hi
        {
            return Err(AppError::BadRequest(format!(
                "Start date {} is after end date {}",
                lo.date_naive(),
                hi.date_naive()
            )));
        }

        tracing::info!(min = ?min, max = ?max, series = targets.len(), "Visible range changed");

        let backfill_start = min.unwrap_or(DateTime::UNIX_EPOCH);
        let loads = targets.iter().map(|target| async move {
            let loaded_end = match store.loaded_bounds(target.result_id).await {
                Some(bounds) => bounds.end,
                None => max.unwrap_or_else(Utc::now),
            };
            let result = store
                .ensure_loaded(target.result_id, backfill_start, loaded_end)
                .await;
            (target, result)
        });

        let mut failures = Vec::new();
        for (target, result) in join_all(loads).await {
            if let Err(e) = result {
                failures.push((target.result_id, e));
                continue;
            }
            let points = store.points(target.result_id).await;
            if let Err(e) = chart.plot(target.slot, &target.label, &points) {
                failures.push((target.result_id, e));
            }
        }

        self.visible = VisibleRange { min, max };
        chart.set_x_domain(min, max);
        Ok(failures)
    }
}
