use chrono::{DateTime, Days, Months, NaiveDate, Utc};
use reqwest::Url;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use crate::dataloader::{DataPoint, ResultId};
use crate::error::{AppError, AppResult};

const CSV_VALUES_PATH: &str = "/api/csv-values/";

/// Parameters of the server-side CSV export. Missing dates are left out of the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvExportRequest {
    pub result_ids: Vec<ResultId>,
    pub min_datetime: Option<NaiveDate>,
    pub max_datetime: Option<NaiveDate>,
}

impl CsvExportRequest {
    /// Download URL, e.g. `/api/csv-values/?result_ids=1,2&max_datetime=2023-06-02`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` if `base_url` is not a valid URL.
    pub fn url(&self, base_url: &str) -> AppResult<Url> {
        let mut url = Url::parse(&format!("{}{CSV_VALUES_PATH}", base_url.trim_end_matches('/')))
            .map_err(|e| AppError::BadRequest(format!("Invalid portal URL '{base_url}': {e}")))?;

        {
            let mut query = url.query_pairs_mut();
            let ids = self
                .result_ids
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",");
            query.append_pair("result_ids", &ids);
            if let Some(max) = self.max_datetime {
                query.append_pair("max_datetime", &max.format("%Y-%m-%d").to_string());
            }
            if let Some(min) = self.min_datetime {
                query.append_pair("min_datetime", &min.format("%Y-%m-%d").to_string());
            }
        }
        Ok(url)
    }
}

/// Default `(min, max)` dates of the export dialog.
///
/// The end is the day after the latest measurement so that day is included,
/// or today when the latest measurement is unknown. The start is one month
/// before the end.
#[must_use]
pub fn default_export_dates(
    latest_measurement: Option<DateTime<Utc>>,
    today: NaiveDate,
) -> (NaiveDate, NaiveDate) {
    let max = latest_measurement
        .map(|t| t.date_naive())
        .and_then(|d| d.checked_add_days(Days::new(1)))
        .unwrap_or(today);
    let min = max.checked_sub_months(Months::new(1)).unwrap_or(max);
    (min, max)
}

/// Write cached series as a wide CSV: a `time` column followed by one column
/// per series, with blank cells where a series has no value.
///
/// # Errors
///
/// Returns `AppError::Csv` if writing fails.
pub fn write_series_csv<W: Write>(writer: W, columns: &[(String, Vec<DataPoint>)]) -> AppResult<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let mut header = vec!["time".to_string()];
    header.extend(columns.iter().map(|(name, _)| name.clone()));
    csv_writer.write_record(&header)?;

    let lookups: Vec<BTreeMap<DateTime<Utc>, Option<f64>>> = columns
        .iter()
        .map(|(_, points)| points.iter().map(|p| (p.timestamp, p.value)).collect())
        .collect();
    let times: BTreeSet<DateTime<Utc>> = lookups.iter().flat_map(|l| l.keys().copied()).collect();

    for time in &times {
        let mut row = Vec::with_capacity(columns.len() + 1);
        row.push(time.to_rfc3339());
        for lookup in &lookups {
            match lookup.get(time).copied().flatten() {
                Some(v) => row.push(v.to_string()),
                None => row.push(String::new()),
            }
        }
        csv_writer.write_record(&row)?;
    }

    csv_writer.flush()?;
    tracing::debug!(rows = times.len(), series = columns.len(), "CSV written");
    Ok(())
}
