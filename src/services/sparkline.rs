//! Gap and staleness helpers for the site-detail sparklines.

use chrono::{DateTime, Duration, Utc};

use crate::dataloader::DataPoint;

/// Consecutive points further apart than this are drawn as separate runs.
pub const GAP_HOURS: i64 = 6;

/// Data older than this is shown as stale.
pub const EXTENT_HOURS: i64 = 72;

/// One drawable piece of a sparkline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Segment<'a> {
    /// A lone point, drawn as a dot
    Marker(&'a DataPoint),
    Line(&'a [DataPoint]),
}

/// Split ordered points into runs wherever two neighbours are more than `gap` apart.
#[must_use]
pub fn split_at_gaps(points: &[DataPoint], gap: Duration) -> Vec<&[DataPoint]> {
    if points.is_empty() {
        return Vec::new();
    }
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..points.len() {
        if points[i].timestamp - points[i - 1].timestamp > gap {
            runs.push(&points[start..i]);
            start = i;
        }
    }
    runs.push(&points[start..]);
    runs
}

/// Runs as drawable segments, single points becoming markers.
#[must_use]
pub fn segments(points: &[DataPoint], gap: Duration) -> Vec<Segment<'_>> {
    split_at_gaps(points, gap)
        .into_iter()
        .map(|run| match run {
            [single] => Segment::Marker(single),
            _ => Segment::Line(run),
        })
        .collect()
}

/// Whether the newest measurement is at least `extent` old.
#[must_use]
pub fn is_stale(last_measurement: Option<DateTime<Utc>>, now: DateTime<Utc>, extent: Duration) -> bool {
    last_measurement.is_none_or(|last| last <= now - extent)
}
