use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Opaque key of one time series (variable at a site).
pub type ResultId = i64;

/// A single observation. Missing values are kept so the chart can break the line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
}

impl DataPoint {
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>, value: Option<f64>) -> Self {
        Self { timestamp, value }
    }
}

/// Body of the `request_data` form field sent to `/dataloader/ajax/`
#[derive(Debug, Clone, Serialize)]
pub struct AjaxRequest {
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resultid: Option<ResultId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling_feature_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

impl AjaxRequest {
    #[must_use]
    pub fn sampling_features() -> Self {
        Self::method("get_sampling_features")
    }

    #[must_use]
    pub fn sampling_feature_metadata(code: &str) -> Self {
        Self {
            sampling_feature_code: Some(code.to_string()),
            ..Self::method("get_sampling_feature_metadata")
        }
    }

    #[must_use]
    pub fn result_timeseries(id: ResultId, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            resultid: Some(id),
            start_date: Some(format_request_date(start)),
            end_date: Some(format_request_date(end)),
            ..Self::method("get_result_timeseries")
        }
    }

    fn method(method: &'static str) -> Self {
        Self {
            method,
            resultid: None,
            sampling_feature_code: None,
            start_date: None,
            end_date: None,
        }
    }
}

/// Dates go over the wire as RFC 3339 UTC with millisecond precision.
#[must_use]
pub fn format_request_date(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Series metadata as returned by `get_sampling_feature_metadata`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesMetadata {
    #[serde(rename = "resultid")]
    pub result_id: ResultId,
    #[serde(rename = "resultuuid", default)]
    pub result_uuid: Option<Uuid>,
    #[serde(rename = "samplingfeaturecode", default)]
    pub site_code: String,
    #[serde(rename = "variablecode", default)]
    pub variable_code: String,
    #[serde(rename = "unitsabbreviation", default)]
    pub units: String,
    #[serde(rename = "sampledmediumcv", default)]
    pub sampled_medium: Option<String>,
    /// Vertical offset of the sensor (depth or height)
    #[serde(rename = "zlocation", default)]
    pub z_location: Option<f64>,
    #[serde(rename = "zlocationunits", default)]
    pub z_location_units: Option<String>,
}

impl SeriesMetadata {
    /// `": 1.5 m"` when a vertical location is known, empty otherwise.
    #[must_use]
    pub fn z_location_text(&self) -> String {
        match self.z_location {
            Some(z) => format!(
                ": {z} {}",
                self.z_location_units.as_deref().unwrap_or_default()
            )
            .trim_end()
            .to_string(),
            None => String::new(),
        }
    }

    /// Two-line label shown next to the series checkbox.
    #[must_use]
    pub fn panel_label(&self) -> String {
        format!(
            "{} ({})\n{} ({}{})",
            self.variable_code,
            self.units,
            self.site_code,
            self.sampled_medium.as_deref().unwrap_or_default(),
            self.z_location_text()
        )
    }
}

/// A monitoring site as listed by `get_sampling_features`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingFeature {
    #[serde(rename = "samplingfeatureid", default)]
    pub id: Option<i64>,
    #[serde(rename = "samplingfeaturecode")]
    pub code: String,
    #[serde(rename = "samplingfeaturename", default)]
    pub name: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// A column serialized either as an array or as an index-keyed object
/// (`{"0": .., "1": ..}`), the latter being how the server dumps data frames.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Keyed<T> {
    Seq(Vec<T>),
    Map(BTreeMap<String, T>),
}

impl<T> Keyed<T> {
    /// Values in index order. Numeric keys sort numerically, others after them.
    #[must_use]
    pub fn into_values(self) -> Vec<T> {
        match self {
            Self::Seq(values) => values,
            Self::Map(map) => {
                let mut entries: Vec<(String, T)> = map.into_iter().collect();
                entries.sort_by(|(a, _), (b, _)| {
                    match (a.parse::<u64>(), b.parse::<u64>()) {
                        (Ok(x), Ok(y)) => x.cmp(&y),
                        (Ok(_), Err(_)) => std::cmp::Ordering::Less,
                        (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
                        (Err(_), Err(_)) => a.cmp(b),
                    }
                });
                entries.into_iter().map(|(_, v)| v).collect()
            }
        }
    }
}

/// Timestamps arrive as epoch milliseconds or as ISO-8601 text
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Millis(i64),
    FractionalMillis(f64),
    Text(String),
}

impl RawTimestamp {
    /// # Errors
    ///
    /// Returns `AppError::MalformedResponse` if the value is not a valid date.
    pub fn to_datetime(&self) -> AppResult<DateTime<Utc>> {
        let parsed = match self {
            Self::Millis(ms) => DateTime::from_timestamp_millis(*ms),
            #[allow(clippy::cast_possible_truncation)]
            Self::FractionalMillis(ms) => DateTime::from_timestamp_millis(ms.trunc() as i64),
            Self::Text(text) => parse_timestamp_text(text),
        };
        parsed.ok_or_else(|| AppError::MalformedResponse(format!("Invalid timestamp: {self:?}")))
    }
}

fn parse_timestamp_text(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Parallel `valuedatetime` / `datavalue` columns from `get_result_timeseries`
#[derive(Debug, Clone, Deserialize)]
pub struct TimeseriesColumns {
    pub valuedatetime: Keyed<RawTimestamp>,
    pub datavalue: Keyed<Option<f64>>,
}

/// Older server builds wrap the columns as `{result_id, data: {...}}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TimeseriesResponse {
    Wrapped {
        #[serde(default)]
        result_id: Option<serde_json::Value>,
        data: TimeseriesColumns,
    },
    Bare(TimeseriesColumns),
}

impl TimeseriesResponse {
    /// Zip the index-aligned columns into points.
    ///
    /// # Errors
    ///
    /// Returns `AppError::MalformedResponse` if the columns differ in length
    /// or a timestamp cannot be parsed.
    pub fn into_points(self) -> AppResult<Vec<DataPoint>> {
        let columns = match self {
            Self::Wrapped { data, .. } | Self::Bare(data) => data,
        };
        let times = columns.valuedatetime.into_values();
        let values = columns.datavalue.into_values();
        if times.len() != values.len() {
            return Err(AppError::MalformedResponse(format!(
                "valuedatetime has {} entries but datavalue has {}",
                times.len(),
                values.len()
            )));
        }
        times
            .iter()
            .zip(values)
            .map(|(t, v)| Ok(DataPoint::new(t.to_datetime()?, v)))
            .collect()
    }
}

/// Decode a response body, unwrapping a JSON string that itself holds JSON.
///
/// # Errors
///
/// Returns `AppError::MalformedResponse` if the body does not match `T`.
pub fn decode_body<T: DeserializeOwned>(body: &str) -> AppResult<T> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| AppError::MalformedResponse(format!("Invalid JSON: {e}")))?;
    decode_value(value)
}

/// Same as [`decode_body`] for an already parsed value.
///
/// # Errors
///
/// Returns `AppError::MalformedResponse` if the value does not match `T`.
pub fn decode_value<T: DeserializeOwned>(value: serde_json::Value) -> AppResult<T> {
    let value = match value {
        serde_json::Value::String(inner) => serde_json::from_str(&inner)
            .map_err(|e| AppError::MalformedResponse(format!("Invalid embedded JSON: {e}")))?,
        other => other,
    };
    serde_json::from_value(value)
        .map_err(|e| AppError::MalformedResponse(format!("Unexpected response shape: {e}")))
}
